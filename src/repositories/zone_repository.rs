use async_trait::async_trait;
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use super::{StoreResult, ZoneRepository};
use crate::models::{GeoPoint, Zone, ZoneKind, ZoneShape};

#[derive(Debug, FromRow)]
struct ZoneRow {
    id: Uuid,
    name: String,
    shape: ZoneShape,
    zone_type: ZoneKind,
    active: bool,
    center_lat: Option<f64>,
    center_lng: Option<f64>,
    radius: Option<f64>,
    area: Option<Json<Vec<GeoPoint>>>,
}

impl From<ZoneRow> for Zone {
    fn from(row: ZoneRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            shape: row.shape,
            zone_type: row.zone_type,
            active: row.active,
            center: row.center_lat.zip(row.center_lng).map(|(lat, lng)| GeoPoint::new(lat, lng)),
            radius: row.radius,
            area: row.area.map(|a| a.0),
        }
    }
}

pub struct PgZoneRepository {
    pool: PgPool,
}

impl PgZoneRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ZoneRepository for PgZoneRepository {
    async fn insert(&self, zone: &Zone) -> StoreResult<Zone> {
        let row = sqlx::query_as::<_, ZoneRow>(
            r#"
            INSERT INTO zones (id, name, shape, zone_type, active, center_lat, center_lng, radius, area)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(zone.id)
        .bind(&zone.name)
        .bind(zone.shape)
        .bind(zone.zone_type)
        .bind(zone.active)
        .bind(zone.center.map(|c| c.lat))
        .bind(zone.center.map(|c| c.lng))
        .bind(zone.radius)
        .bind(zone.area.as_ref().map(Json))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list_active(&self) -> StoreResult<Vec<Zone>> {
        let rows = sqlx::query_as::<_, ZoneRow>(
            "SELECT * FROM zones WHERE active = TRUE ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Zone::from).collect())
    }

    async fn list_active_parking(&self) -> StoreResult<Vec<Zone>> {
        // El orden de la consulta decide qué zona gana si se solapan
        let rows = sqlx::query_as::<_, ZoneRow>(
            "SELECT * FROM zones WHERE active = TRUE AND zone_type = 'parking' ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Zone::from).collect())
    }
}
