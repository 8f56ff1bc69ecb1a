//! Modelo de Location
//!
//! Posición actual e historial de posiciones de cada vehículo.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coordenada geográfica en grados decimales
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Posición reportada por un vehículo
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    pub fn new(lat: f64, lng: f64, timestamp: DateTime<Utc>) -> Self {
        Self { lat, lng, timestamp }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Location de un vehículo: `current` más el historial (sólo crece)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub vehicle_id: Uuid,
    pub current: Option<Position>,
    pub history: Vec<Position>,
}

impl Location {
    pub fn new(vehicle_id: Uuid) -> Self {
        Self {
            vehicle_id,
            current: None,
            history: Vec::new(),
        }
    }

    /// Registrar una posición nueva: la actual pasa al historial
    pub fn record(&mut self, position: Position) {
        if let Some(previous) = self.current.take() {
            self.history.push(previous);
        }
        self.current = Some(position);
    }

    /// Lectura del tramo del historial a partir de `start`
    pub fn history_since(&self, start: usize) -> Vec<Position> {
        self.history
            .get(start.min(self.history.len())..)
            .map(<[Position]>::to_vec)
            .unwrap_or_default()
    }
}
