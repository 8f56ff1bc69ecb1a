use async_trait::async_trait;
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use super::{LocationRepository, StoreResult};
use crate::models::{Location, Position};

// Fila de la tabla locations; current e history son JSONB
#[derive(Debug, FromRow)]
struct LocationRow {
    vehicle_id: Uuid,
    current: Option<Json<Position>>,
    history: Json<Vec<Position>>,
}

impl From<LocationRow> for Location {
    fn from(row: LocationRow) -> Self {
        Self {
            vehicle_id: row.vehicle_id,
            current: row.current.map(|c| c.0),
            history: row.history.0,
        }
    }
}

pub struct PgLocationRepository {
    pool: PgPool,
}

impl PgLocationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LocationRepository for PgLocationRepository {
    async fn find(&self, vehicle_id: Uuid) -> StoreResult<Option<Location>> {
        let row = sqlx::query_as::<_, LocationRow>(
            "SELECT vehicle_id, current, history FROM locations WHERE vehicle_id = $1",
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Location::from))
    }

    async fn record_position(&self, vehicle_id: Uuid, position: &Position) -> StoreResult<Location> {
        let row = sqlx::query_as::<_, LocationRow>(
            r#"
            INSERT INTO locations (vehicle_id, current, history)
            VALUES ($1, $2, '[]'::jsonb)
            ON CONFLICT (vehicle_id) DO UPDATE SET
                history = CASE
                    WHEN locations.current IS NULL THEN locations.history
                    ELSE locations.history || jsonb_build_array(locations.current)
                END,
                current = EXCLUDED.current
            RETURNING vehicle_id, current, history
            "#,
        )
        .bind(vehicle_id)
        .bind(Json(position))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn history_len(&self, vehicle_id: Uuid) -> StoreResult<usize> {
        let len: Option<i32> = sqlx::query_scalar(
            "SELECT jsonb_array_length(history) FROM locations WHERE vehicle_id = $1",
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(len.unwrap_or(0).max(0) as usize)
    }

    async fn history_since(&self, vehicle_id: Uuid, start: usize) -> StoreResult<Vec<Position>> {
        Ok(self
            .find(vehicle_id)
            .await?
            .map(|location| location.history_since(start))
            .unwrap_or_default())
    }
}
