//! Box registry repository for database operations

use async_trait::async_trait;
use chrono::Utc;
use common::database::bounded;
use common::error::StoreResult;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::info;

use super::BoxStore;
use crate::models::{CommitOutcome, RentalBox};

/// Box repository
#[derive(Clone)]
pub struct BoxRepository {
    pool: PgPool,
    timeout: Duration,
}

impl BoxRepository {
    /// Create a new box repository
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl BoxStore for BoxRepository {
    async fn find_by_code(&self, box_code: &str) -> StoreResult<Option<RentalBox>> {
        let row = bounded(
            self.timeout,
            sqlx::query(
                r#"
                SELECT id, boxcode, owner, renter, rented_at
                FROM boxes
                WHERE boxcode = $1
                "#,
            )
            .bind(box_code)
            .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(|row| RentalBox {
            id: row.get("id"),
            box_code: row.get("boxcode"),
            owner: row.get("owner"),
            renter: row.get("renter"),
            rented_at: row.get("rented_at"),
        }))
    }

    async fn register(&self, rental_box: &RentalBox) -> StoreResult<bool> {
        let result = bounded(
            self.timeout,
            sqlx::query(
                r#"
                INSERT INTO boxes (id, boxcode, owner, renter, rented_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (boxcode) DO NOTHING
                "#,
            )
            .bind(rental_box.id)
            .bind(&rental_box.box_code)
            .bind(&rental_box.owner)
            .bind(&rental_box.renter)
            .bind(rental_box.rented_at)
            .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit_rental(&self, renter: &str, box_code: &str) -> StoreResult<CommitOutcome> {
        let result = bounded(
            self.timeout,
            sqlx::query(
                r#"
                UPDATE boxes
                SET renter = $1, rented_at = $2
                WHERE boxcode = $3 AND renter IS NULL
                "#,
            )
            .bind(renter)
            .bind(Utc::now())
            .bind(box_code)
            .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 1 {
            info!("Box {} rented by {}", box_code, renter);
            return Ok(CommitOutcome::Committed);
        }

        // Nothing updated: either the box is taken or it does not exist.
        match self.find_by_code(box_code).await? {
            Some(_) => Ok(CommitOutcome::AlreadyRented),
            None => Ok(CommitOutcome::NotFound),
        }
    }
}
