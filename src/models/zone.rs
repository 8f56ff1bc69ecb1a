//! Modelo de Zone (geocerca)
//!
//! Las zonas las administra el backoffice; aquí sólo se leen. Una zona con
//! geometría incompleta no es un error, simplemente no contiene ningún punto.

use serde::{Deserialize, Serialize};
use sqlx::Type;
use uuid::Uuid;

use crate::models::location::GeoPoint;

/// Forma geométrica de la zona
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "zone_shape", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ZoneShape {
    Circle,
    Polygon,
}

/// Uso de la zona
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "zone_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Parking,
    SpeedLimit,
    NoGo,
    City,
    Custom,
}

/// Zone - mapea a la tabla zones
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub shape: ZoneShape,
    pub zone_type: ZoneKind,
    pub active: bool,
    pub center: Option<GeoPoint>,
    /// Radio en metros
    pub radius: Option<f64>,
    pub area: Option<Vec<GeoPoint>>,
}

/// Geometría validada de una zona
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneGeometry<'a> {
    Circle { center: GeoPoint, radius: f64 },
    Polygon(&'a [GeoPoint]),
}

impl Zone {
    pub fn circle(name: impl Into<String>, kind: ZoneKind, center: GeoPoint, radius: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            shape: ZoneShape::Circle,
            zone_type: kind,
            active: true,
            center: Some(center),
            radius: Some(radius),
            area: None,
        }
    }

    pub fn polygon(name: impl Into<String>, kind: ZoneKind, area: Vec<GeoPoint>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            shape: ZoneShape::Polygon,
            zone_type: kind,
            active: true,
            center: None,
            radius: None,
            area: Some(area),
        }
    }

    pub fn is_active_parking(&self) -> bool {
        self.active && self.zone_type == ZoneKind::Parking
    }

    /// Geometría utilizable, o `None` si la zona está mal formada
    pub fn geometry(&self) -> Option<ZoneGeometry<'_>> {
        match self.shape {
            ZoneShape::Circle => {
                let center = self.center?;
                let radius = self.radius.filter(|r| r.is_finite() && *r >= 0.0)?;
                Some(ZoneGeometry::Circle { center, radius })
            }
            ZoneShape::Polygon => {
                let ring = self.area.as_deref()?;
                (ring.len() >= 3).then_some(ZoneGeometry::Polygon(ring))
            }
        }
    }
}
