//! Service configuration
//!
//! Settings come from built-in defaults overridden by `BOXRENT_*`
//! environment variables, e.g. `BOXRENT_LISTEN_ADDR=127.0.0.1:9000` or
//! `BOXRENT_MQTT_HOST=broker.local`. Database and Redis connections keep
//! their own `DATABASE_*` / `REDIS_*` variables (see `common`).

use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::time::Duration;

use crate::notify::{MqttSettings, RetryPolicy};

/// Where users, boxes and telemetry live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Where the session table lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub listen_addr: String,
    pub store_backend: StoreBackend,
    pub session_backend: SessionBackend,
    /// Idle lifetime of a session, also the cookie max-age
    pub session_max_age_secs: u64,
    /// How long a claim code can be redeemed
    pub reservation_window_secs: u64,
    /// Period of the expired-entry sweep; 0 disables it
    pub sweep_interval_secs: u64,
    /// Boxes registered at startup, `CODE:owner` pairs separated by commas
    pub seed_boxes: String,
    pub qr_size: u32,
    /// Broker host; events are only logged when unset
    pub mqtt_host: Option<String>,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub mqtt_topic: String,
    pub notify_queue_size: usize,
    pub notify_max_attempts: u32,
    pub notify_backoff_ms: u64,
}

impl ServiceConfig {
    /// Load from defaults and the process environment
    pub fn load() -> Result<Self> {
        Self::build(Environment::with_prefix("BOXRENT").try_parsing(true))
            .context("Invalid BOXRENT_* configuration")
    }

    fn build(env: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("listen_addr", "0.0.0.0:8080")?
            .set_default("store_backend", "postgres")?
            .set_default("session_backend", "memory")?
            .set_default("session_max_age_secs", 1800_i64)?
            .set_default("reservation_window_secs", 60_i64)?
            .set_default("sweep_interval_secs", 60_i64)?
            .set_default("seed_boxes", "")?
            .set_default("qr_size", 240_i64)?
            .set_default("mqtt_port", 1883_i64)?
            .set_default("mqtt_client_id", "boxrent-server")?
            .set_default("mqtt_topic", "boxrent/rentals")?
            .set_default("notify_queue_size", 256_i64)?
            .set_default("notify_max_attempts", 5_i64)?
            .set_default("notify_backoff_ms", 500_i64)?
            .add_source(env)
            .build()?
            .try_deserialize()
    }

    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_secs)
    }

    pub fn reservation_window(&self) -> Duration {
        Duration::from_secs(self.reservation_window_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.notify_max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.notify_backoff_ms),
        }
    }

    pub fn mqtt_settings(&self) -> Option<MqttSettings> {
        self.mqtt_host.as_ref().map(|host| MqttSettings {
            host: host.clone(),
            port: self.mqtt_port,
            client_id: self.mqtt_client_id.clone(),
            topic: self.mqtt_topic.clone(),
        })
    }

    /// Parse `seed_boxes` into `(code, owner)` pairs
    pub fn seed_boxes(&self) -> Result<Vec<(String, String)>> {
        self.seed_boxes
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (code, owner) = entry
                    .split_once(':')
                    .with_context(|| format!("seed box '{}' is not CODE:owner", entry))?;
                Ok((code.trim().to_string(), owner.trim().to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ServiceConfig {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let env = Environment::with_prefix("BOXRENT")
            .try_parsing(true)
            .source(Some(source));
        ServiceConfig::build(env).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);

        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.store_backend, StoreBackend::Postgres);
        assert_eq!(config.session_backend, SessionBackend::Memory);
        assert_eq!(config.session_max_age(), Duration::from_secs(1800));
        assert_eq!(config.reservation_window(), Duration::from_secs(60));
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(60)));
        assert!(config.mqtt_settings().is_none());
        assert!(config.seed_boxes().unwrap().is_empty());
    }

    #[test]
    fn test_environment_overrides() {
        let config = config_from(&[
            ("BOXRENT_STORE_BACKEND", "memory"),
            ("BOXRENT_SESSION_BACKEND", "redis"),
            ("BOXRENT_SESSION_MAX_AGE_SECS", "600"),
            ("BOXRENT_SWEEP_INTERVAL_SECS", "0"),
            ("BOXRENT_MQTT_HOST", "broker.local"),
            ("BOXRENT_MQTT_TOPIC", "chomp_topic"),
        ]);

        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.session_backend, SessionBackend::Redis);
        assert_eq!(config.session_max_age(), Duration::from_secs(600));
        assert_eq!(config.sweep_interval(), None);

        let mqtt = config.mqtt_settings().unwrap();
        assert_eq!(mqtt.host, "broker.local");
        assert_eq!(mqtt.port, 1883);
        assert_eq!(mqtt.topic, "chomp_topic");
    }

    #[test]
    fn test_seed_boxes_parsing() {
        let config = config_from(&[("BOXRENT_SEED_BOXES", "B1:alice, AAs12:bob")]);

        assert_eq!(
            config.seed_boxes().unwrap(),
            vec![
                ("B1".to_string(), "alice".to_string()),
                ("AAs12".to_string(), "bob".to_string()),
            ]
        );

        let broken = config_from(&[("BOXRENT_SEED_BOXES", "B1")]);
        assert!(broken.seed_boxes().is_err());
    }
}
