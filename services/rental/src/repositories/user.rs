//! User repository for database operations

use async_trait::async_trait;
use common::database::bounded;
use common::error::{StoreError, StoreResult};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::time::Duration;
use tracing::{info, warn};

use super::{InsertUserError, UserStore};
use crate::models::{NewUser, User, UserRole};

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
    timeout: Duration,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    fn map_row(row: PgRow) -> StoreResult<User> {
        let role: String = row.get("role");
        let role = role.parse::<UserRole>().map_err(StoreError::Corrupt)?;

        Ok(User {
            id: row.get("id"),
            username: row.get("username"),
            password_hash: row.get("password_hash"),
            role,
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let row = bounded(
            self.timeout,
            sqlx::query(
                r#"
                SELECT id, username, password_hash, role, created_at
                FROM users
                WHERE username = $1
                "#,
            )
            .bind(username)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.map(Self::map_row).transpose()
    }

    async fn insert(&self, new_user: NewUser) -> Result<User, InsertUserError> {
        info!("Creating new user: {}", new_user.username);

        let user = new_user.into_user();
        let result = bounded(
            self.timeout,
            sqlx::query(
                r#"
                INSERT INTO users (id, username, password_hash, role, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.created_at)
            .execute(&self.pool),
        )
        .await;

        match result {
            Ok(_) => Ok(user),
            Err(e) if e.is_unique_violation() => {
                warn!("Concurrent signup lost the race for {}", user.username);
                Err(InsertUserError::DuplicateUsername)
            }
            Err(e) => Err(InsertUserError::Store(e)),
        }
    }

    async fn health_check(&self) -> bool {
        common::database::health_check(&self.pool).await
    }
}
