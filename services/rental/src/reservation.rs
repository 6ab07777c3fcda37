//! Reservation table for pending rental requests
//!
//! Each entry is keyed by the claim code embedded in a QR artifact and is
//! valid for a fixed window after creation. Expired entries are reclaimed
//! lazily when touched, and by the periodic sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default validity window of a reservation
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// A pending claim on a box
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub box_code: String,
    pub created_at: Instant,
}

impl Reservation {
    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.duration_since(self.created_at) >= window
    }
}

/// Result of looking a claim code up
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Live(Reservation),
    /// The reservation existed but its window had passed; it is gone now
    Expired,
    Missing,
}

/// Mutex-guarded map from claim code to reservation
#[derive(Debug, Clone)]
pub struct ReservationTable {
    entries: Arc<Mutex<HashMap<String, Reservation>>>,
    window: Duration,
}

impl Default for ReservationTable {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl ReservationTable {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a reservation; a colliding code is overwritten
    pub async fn insert(&self, claim_code: &str, box_code: &str) {
        let reservation = Reservation {
            box_code: box_code.to_string(),
            created_at: Instant::now(),
        };
        self.entries
            .lock()
            .await
            .insert(claim_code.to_string(), reservation);
    }

    /// Look a code up without consuming it, dropping it if expired
    pub async fn check(&self, claim_code: &str) -> Lookup {
        let mut entries = self.entries.lock().await;
        match entries.get(claim_code) {
            None => Lookup::Missing,
            Some(reservation) if reservation.is_expired(Instant::now(), self.window) => {
                entries.remove(claim_code);
                Lookup::Expired
            }
            Some(reservation) => Lookup::Live(reservation.clone()),
        }
    }

    /// Remove and return a live reservation
    ///
    /// Only one caller can take a given code; everyone else gets `None`.
    pub async fn take(&self, claim_code: &str) -> Option<Reservation> {
        let mut entries = self.entries.lock().await;
        let reservation = entries.remove(claim_code)?;
        if reservation.is_expired(Instant::now(), self.window) {
            return None;
        }
        Some(reservation)
    }

    /// Put a taken reservation back, keeping its original creation time
    pub async fn restore(&self, claim_code: &str, reservation: Reservation) {
        self.entries
            .lock()
            .await
            .entry(claim_code.to_string())
            .or_insert(reservation);
    }

    pub async fn contains(&self, claim_code: &str) -> bool {
        self.entries.lock().await.contains_key(claim_code)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Drop every expired reservation, returning how many went
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, reservation| !reservation.is_expired(now, self.window));
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_check_reports_live_then_expired() {
        let table = ReservationTable::default();
        table.insert("code", "B1").await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(matches!(table.check("code").await, Lookup::Live(r) if r.box_code == "B1"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(table.check("code").await, Lookup::Expired);
        assert_eq!(table.check("code").await, Lookup::Missing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_is_single_shot() {
        let table = ReservationTable::default();
        table.insert("code", "B1").await;

        assert!(table.take("code").await.is_some());
        assert!(table.take("code").await.is_none());
        assert_eq!(table.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_refuses_expired_and_removes_it() {
        let table = ReservationTable::default();
        table.insert("code", "B1").await;
        tokio::time::advance(DEFAULT_WINDOW).await;

        assert!(table.take("code").await.is_none());
        assert!(!table.contains("code").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_keeps_the_original_deadline() {
        let table = ReservationTable::default();
        table.insert("code", "B1").await;
        let taken = table.take("code").await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        table.restore("code", taken).await;
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(table.check("code").await, Lookup::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_keeps_fresh_entries() {
        let table = ReservationTable::default();
        table.insert("old", "B1").await;
        tokio::time::advance(Duration::from_secs(45)).await;
        table.insert("new", "B1").await;
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(table.purge_expired().await, 1);
        assert!(table.contains("new").await);
        assert!(!table.contains("old").await);
    }
}
