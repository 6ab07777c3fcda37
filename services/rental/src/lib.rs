//! Box rental service
//!
//! Users sign up and log in, a box asks for a claim code which it shows as
//! a QR image, and the logged-in user redeems the scanned code to rent the
//! box. Boxes also report temperatures.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod password;
pub mod qr;
pub mod rental;
pub mod repositories;
pub mod reservation;
pub mod routes;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod validation;

use anyhow::{Context, Result};
use common::{
    cache::{RedisConfig, RedisPool},
    database::{self, DatabaseConfig},
    error::StoreError,
};
use std::sync::Arc;
use tracing::info;

use crate::{
    config::{ServiceConfig, SessionBackend, StoreBackend},
    models::RentalBox,
    notify::{LogSink, MqttSink, NotificationSink, Notifier},
    qr::PngQrEncoder,
    repositories::{BoxRepository, MemoryStore, TelemetryRepository, UserRepository},
    session::{MemorySessionStore, RedisSessionStore, SessionStore},
    state::{AppState, Stores},
};

/// Wire up stores, sessions and notifications as configured
pub async fn build_state(config: &ServiceConfig) -> Result<AppState> {
    let stores = match config.store_backend {
        StoreBackend::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let pool = database::init_pool(&db_config).await?;

            if database::health_check(&pool).await {
                info!("Database connection successful");
            } else {
                anyhow::bail!("Failed to connect to database");
            }

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(StoreError::from)
                .context("Failed to run database migrations")?;

            let timeout = db_config.query_timeout();
            Stores {
                users: Arc::new(UserRepository::new(pool.clone(), timeout)),
                boxes: Arc::new(BoxRepository::new(pool.clone(), timeout)),
                telemetry: Arc::new(TelemetryRepository::new(pool, timeout)),
            }
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; data is lost on restart");
            Stores::memory(MemoryStore::new())
        }
    };

    for (code, owner) in config.seed_boxes()? {
        if stores.boxes.register(&RentalBox::available(&code, &owner)).await? {
            info!("Registered box {} owned by {}", code, owner);
        }
    }

    let session_store: Arc<dyn SessionStore> = match config.session_backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
        SessionBackend::Redis => {
            let redis_config = RedisConfig::from_env()?;
            let redis_pool = RedisPool::new(&redis_config)?;
            if !redis_pool.health_check().await? {
                anyhow::bail!("Failed to connect to Redis");
            }
            info!("Redis connection successful");
            Arc::new(RedisSessionStore::new(redis_pool))
        }
    };

    let sink: Arc<dyn NotificationSink> = match config.mqtt_settings() {
        Some(settings) => {
            info!(
                "Publishing rentals to {}:{} on '{}'",
                settings.host, settings.port, settings.topic
            );
            Arc::new(MqttSink::connect(&settings))
        }
        None => {
            info!("No MQTT broker configured; rental events are only logged");
            Arc::new(LogSink)
        }
    };
    let (notifier, _worker) = Notifier::spawn(
        sink,
        config.notify_queue_size,
        config.retry_policy(),
    );

    Ok(AppState::new(
        stores,
        session_store,
        Arc::new(PngQrEncoder::new(config.qr_size)),
        notifier,
        config.session_max_age(),
        config.reservation_window(),
    ))
}
