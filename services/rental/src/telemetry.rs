//! Temperature telemetry ingest

use chrono::{DateTime, Utc};
use common::error::StoreResult;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::{models::TemperatureReading, repositories::TelemetryStore};

#[derive(Clone)]
pub struct TelemetryIngest {
    store: Arc<dyn TelemetryStore>,
}

impl TelemetryIngest {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    /// Store one reading
    pub async fn record(
        &self,
        box_code: &str,
        temperature: f64,
        recorded_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let reading = TemperatureReading {
            box_code: box_code.to_string(),
            temperature,
            recorded_at,
        };
        self.store.record(&reading).await?;
        debug!("Recorded {:.2} for box {}", temperature, box_code);
        Ok(())
    }

    /// Record a reading stamped now, in the background
    ///
    /// Devices never see a failure; it only shows up in the log.
    pub fn submit(&self, box_code: String, temperature: f64) -> JoinHandle<()> {
        let ingest = self.clone();
        let recorded_at = Utc::now();
        tokio::spawn(async move {
            if let Err(e) = ingest.record(&box_code, temperature, recorded_at).await {
                error!("Failed to record temperature for box {}: {}", box_code, e);
            }
        })
    }
}
