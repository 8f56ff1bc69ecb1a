use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{DebitOutcome, StoreResult, UserRepository};
use crate::models::User;

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert(&self, user: &User) -> StoreResult<User> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, credit, membership_tier, membership_status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, email, credit, membership_tier, membership_status
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.credit)
        .bind(user.membership.tier)
        .bind(user.membership.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, credit, membership_tier, membership_status FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn debit(&self, id: Uuid, amount: i64) -> StoreResult<DebitOutcome> {
        let debited: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET credit = credit - $2 WHERE id = $1 AND credit >= $2 RETURNING credit",
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(credit) = debited {
            return Ok(DebitOutcome::Debited { credit });
        }

        let current: Option<i64> = sqlx::query_scalar("SELECT credit FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match current {
            Some(credit) => DebitOutcome::Insufficient { credit },
            None => DebitOutcome::UnknownUser,
        })
    }
}
