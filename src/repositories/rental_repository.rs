use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use super::{RentalRepository, StoreError, StoreResult};
use crate::models::{Position, Rental};

#[derive(Debug, FromRow)]
struct RentalRow {
    id: Uuid,
    user_id: Uuid,
    scooter_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    start_history_index: i64,
    trip_history: Json<Vec<Position>>,
    cost: Option<i64>,
    paid: bool,
}

impl TryFrom<RentalRow> for Rental {
    type Error = StoreError;

    fn try_from(row: RentalRow) -> Result<Self, Self::Error> {
        let start_history_index = usize::try_from(row.start_history_index).map_err(|_| {
            StoreError::Corrupt(format!(
                "rental {} has negative start_history_index {}",
                row.id, row.start_history_index
            ))
        })?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            scooter_id: row.scooter_id,
            start_time: row.start_time,
            end_time: row.end_time,
            start_history_index,
            trip_history: row.trip_history.0,
            cost: row.cost,
            paid: row.paid,
        })
    }
}

const RENTAL_COLUMNS: &str = "id, user_id, scooter_id, start_time, end_time, start_history_index, trip_history, cost, paid";

pub struct PgRentalRepository {
    pool: PgPool,
}

impl PgRentalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RentalRepository for PgRentalRepository {
    async fn insert(&self, rental: &Rental) -> StoreResult<Rental> {
        let row = sqlx::query_as::<_, RentalRow>(&format!(
            r#"
            INSERT INTO rentals ({RENTAL_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {RENTAL_COLUMNS}
            "#
        ))
        .bind(rental.id)
        .bind(rental.user_id)
        .bind(rental.scooter_id)
        .bind(rental.start_time)
        .bind(rental.end_time)
        .bind(rental.start_history_index as i64)
        .bind(Json(&rental.trip_history))
        .bind(rental.cost)
        .bind(rental.paid)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Rental>> {
        let row = sqlx::query_as::<_, RentalRow>(&format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Rental::try_from).transpose()
    }

    async fn find_open_by_scooter(&self, scooter_id: Uuid) -> StoreResult<Option<Rental>> {
        let row = sqlx::query_as::<_, RentalRow>(&format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals WHERE scooter_id = $1 AND end_time IS NULL LIMIT 1"
        ))
        .bind(scooter_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Rental::try_from).transpose()
    }

    async fn list_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Rental>> {
        let rows = sqlx::query_as::<_, RentalRow>(&format!(
            "SELECT {RENTAL_COLUMNS} FROM rentals WHERE user_id = $1 ORDER BY start_time DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Rental::try_from).collect()
    }

    async fn close_if_open(&self, rental: &Rental) -> StoreResult<Option<Rental>> {
        let row = sqlx::query_as::<_, RentalRow>(&format!(
            r#"
            UPDATE rentals
            SET end_time = $2, trip_history = $3, cost = $4, paid = $5
            WHERE id = $1 AND end_time IS NULL
            RETURNING {RENTAL_COLUMNS}
            "#
        ))
        .bind(rental.id)
        .bind(rental.end_time)
        .bind(Json(&rental.trip_history))
        .bind(rental.cost)
        .bind(rental.paid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Rental::try_from).transpose()
    }

    async fn mark_paid(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE rentals SET paid = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
