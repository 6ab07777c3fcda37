//! In-process store backend
//!
//! Implements every store trait on mutex-guarded maps. Used for local runs
//! without PostgreSQL and throughout the test suite.

use async_trait::async_trait;
use chrono::Utc;
use common::error::StoreResult;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{BoxStore, InsertUserError, TelemetryStore, UserStore};
use crate::models::{CommitOutcome, NewUser, RentalBox, TemperatureReading, User};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    boxes: HashMap<String, RentalBox>,
    readings: Vec<TemperatureReading>,
}

/// Shared in-memory store; clones see the same data
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with unrented boxes
    pub async fn with_boxes<'a>(boxes: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let store = Self::new();
        for (code, owner) in boxes {
            // A fresh store cannot hold duplicates worth reporting.
            let _ = store.register(&RentalBox::available(code, owner)).await;
        }
        store
    }

    /// Temperature readings recorded so far, oldest first
    pub async fn readings(&self) -> Vec<TemperatureReading> {
        self.tables.lock().await.readings.clone()
    }

    /// Remove a user, as an operator would by hand
    pub async fn delete_user(&self, username: &str) -> bool {
        self.tables.lock().await.users.remove(username).is_some()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(username).cloned())
    }

    async fn insert(&self, new_user: NewUser) -> Result<User, InsertUserError> {
        let mut tables = self.tables.lock().await;
        if tables.users.contains_key(&new_user.username) {
            return Err(InsertUserError::DuplicateUsername);
        }

        let user = new_user.into_user();
        tables.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }
}

#[async_trait]
impl BoxStore for MemoryStore {
    async fn find_by_code(&self, box_code: &str) -> StoreResult<Option<RentalBox>> {
        Ok(self.tables.lock().await.boxes.get(box_code).cloned())
    }

    async fn register(&self, rental_box: &RentalBox) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        if tables.boxes.contains_key(&rental_box.box_code) {
            return Ok(false);
        }
        tables
            .boxes
            .insert(rental_box.box_code.clone(), rental_box.clone());
        Ok(true)
    }

    async fn commit_rental(&self, renter: &str, box_code: &str) -> StoreResult<CommitOutcome> {
        let mut tables = self.tables.lock().await;
        let outcome = match tables.boxes.get_mut(box_code) {
            None => CommitOutcome::NotFound,
            Some(rental_box) if rental_box.renter.is_some() => CommitOutcome::AlreadyRented,
            Some(rental_box) => {
                rental_box.renter = Some(renter.to_string());
                rental_box.rented_at = Some(Utc::now());
                CommitOutcome::Committed
            }
        };
        Ok(outcome)
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn record(&self, reading: &TemperatureReading) -> StoreResult<()> {
        self.tables.lock().await.readings.push(reading.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::repositories::BoxLookupError;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            password_hash: "hash".to_string(),
            role: UserRole::Renter,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_username() {
        let store = MemoryStore::new();
        store.insert(new_user("bob")).await.unwrap();

        let second = store.insert(new_user("bob")).await;
        assert!(matches!(second, Err(InsertUserError::DuplicateUsername)));
    }

    #[tokio::test]
    async fn test_is_rented_distinguishes_unknown_boxes() {
        let store = MemoryStore::with_boxes([("B1", "owner")]).await;

        assert!(!store.is_rented("B1").await.unwrap());
        assert!(matches!(
            store.is_rented("nope").await,
            Err(BoxLookupError::NotFound(code)) if code == "nope"
        ));
    }

    #[tokio::test]
    async fn test_commit_rental_only_sets_an_empty_renter() {
        let store = MemoryStore::with_boxes([("B1", "owner")]).await;

        assert_eq!(
            store.commit_rental("alice", "B1").await.unwrap(),
            CommitOutcome::Committed
        );
        assert_eq!(
            store.commit_rental("carol", "B1").await.unwrap(),
            CommitOutcome::AlreadyRented
        );
        assert_eq!(
            store.commit_rental("carol", "B2").await.unwrap(),
            CommitOutcome::NotFound
        );

        let rented = store.find_by_code("B1").await.unwrap().unwrap();
        assert_eq!(rented.renter.as_deref(), Some("alice"));
        assert!(rented.rented_at.is_some());
    }

    #[tokio::test]
    async fn test_register_keeps_existing_box() {
        let store = MemoryStore::with_boxes([("B1", "owner")]).await;
        let added = store
            .register(&RentalBox::available("B1", "someone-else"))
            .await
            .unwrap();

        assert!(!added);
        assert_eq!(store.find_by_code("B1").await.unwrap().unwrap().owner, "owner");
    }
}
