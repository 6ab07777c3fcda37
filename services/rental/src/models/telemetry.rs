//! Temperature telemetry model

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single temperature report from a box
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureReading {
    pub box_code: String,
    pub temperature: f64,
    pub recorded_at: DateTime<Utc>,
}
