//! Temperature telemetry repository

use async_trait::async_trait;
use common::database::bounded;
use common::error::StoreResult;
use sqlx::PgPool;
use std::time::Duration;

use super::TelemetryStore;
use crate::models::TemperatureReading;

#[derive(Clone)]
pub struct TelemetryRepository {
    pool: PgPool,
    timeout: Duration,
}

impl TelemetryRepository {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl TelemetryStore for TelemetryRepository {
    async fn record(&self, reading: &TemperatureReading) -> StoreResult<()> {
        bounded(
            self.timeout,
            sqlx::query(
                r#"
                INSERT INTO temperatures (boxcode, temperature, recorded_at)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(&reading.box_code)
            .bind(reading.temperature)
            .bind(reading.recorded_at)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }
}
