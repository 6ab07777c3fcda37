//! Application state shared across handlers

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::{
    notify::Notifier,
    password::PasswordHasher,
    qr::QrEncoder,
    rental::RentalCoordinator,
    repositories::{BoxStore, MemoryStore, TelemetryStore, UserStore},
    reservation::ReservationTable,
    session::{SessionManager, SessionStore},
    telemetry::TelemetryIngest,
};

/// The three persistent tables, behind whichever backend was configured
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub boxes: Arc<dyn BoxStore>,
    pub telemetry: Arc<dyn TelemetryStore>,
}

impl Stores {
    /// All three tables in one in-process store
    pub fn memory(store: MemoryStore) -> Self {
        Self {
            users: Arc::new(store.clone()),
            boxes: Arc::new(store.clone()),
            telemetry: Arc::new(store),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub boxes: Arc<dyn BoxStore>,
    pub sessions: SessionManager,
    pub rentals: RentalCoordinator,
    pub telemetry: TelemetryIngest,
    pub hasher: PasswordHasher,
}

impl AppState {
    pub fn new(
        stores: Stores,
        session_store: Arc<dyn SessionStore>,
        encoder: Arc<dyn QrEncoder>,
        notifier: Notifier,
        session_max_age: Duration,
        reservation_window: Duration,
    ) -> Self {
        let sessions = SessionManager::new(session_store, stores.users.clone(), session_max_age);
        let rentals = RentalCoordinator::new(
            stores.boxes.clone(),
            sessions.clone(),
            ReservationTable::new(reservation_window),
            encoder,
            notifier,
        );

        Self {
            users: stores.users,
            boxes: stores.boxes,
            sessions,
            rentals,
            telemetry: TelemetryIngest::new(stores.telemetry),
            hasher: PasswordHasher::new(),
        }
    }

    /// Drop expired sessions and reservations once
    pub async fn sweep(&self) {
        let reservations = self.rentals.purge_expired().await;
        let sessions = match self.sessions.purge_expired().await {
            Ok(count) => count,
            Err(e) => {
                error!("Session sweep failed: {}", e);
                0
            }
        };

        if reservations > 0 || sessions > 0 {
            info!(
                "Swept {} expired reservations and {} expired sessions",
                reservations, sessions
            );
        } else {
            debug!("Sweep found nothing to expire");
        }
    }

    /// Run `sweep` every `period` until the task is aborted
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                state.sweep().await;
            }
        })
    }
}
