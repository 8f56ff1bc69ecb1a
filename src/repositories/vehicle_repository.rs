use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{StoreResult, VehicleRepository};
use crate::models::{Vehicle, VehicleUpdate};

pub struct PgVehicleRepository {
    pool: PgPool,
}

impl PgVehicleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VehicleRepository for PgVehicleRepository {
    async fn insert(&self, vehicle: &Vehicle) -> StoreResult<Vehicle> {
        let mut vehicle = vehicle.clone();
        vehicle.apply(&VehicleUpdate::default());

        let created = sqlx::query_as::<_, Vehicle>(
            r#"
            INSERT INTO vehicles (id, name, battery, lat, lon, speed_kmh, status, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(vehicle.id)
        .bind(&vehicle.name)
        .bind(vehicle.battery)
        .bind(vehicle.lat)
        .bind(vehicle.lon)
        .bind(vehicle.speed_kmh)
        .bind(vehicle.status)
        .bind(vehicle.last_seen_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Vehicle>> {
        let vehicle = sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(vehicle)
    }

    async fn list(&self) -> StoreResult<Vec<Vehicle>> {
        let vehicles = sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(vehicles)
    }

    async fn apply_update(&self, id: Uuid, update: &VehicleUpdate) -> StoreResult<Option<Vehicle>> {
        let mut tx = self.pool.begin().await?;

        // Bloquear la fila: lectura, invariante y escritura en la misma transacción
        let current = sqlx::query_as::<_, Vehicle>("SELECT * FROM vehicles WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(mut vehicle) = current else {
            return Ok(None);
        };
        vehicle.apply(update);

        let updated = sqlx::query_as::<_, Vehicle>(
            r#"
            UPDATE vehicles
            SET battery = $2, lat = $3, lon = $4, speed_kmh = $5, status = $6, last_seen_at = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(vehicle.battery)
        .bind(vehicle.lat)
        .bind(vehicle.lon)
        .bind(vehicle.speed_kmh)
        .bind(vehicle.status)
        .bind(vehicle.last_seen_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }
}
