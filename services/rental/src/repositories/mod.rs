//! Store adapters for users, boxes and telemetry
//!
//! Each concern is a narrow async trait so the service can run against
//! PostgreSQL in production and against the in-process store in tests and
//! local runs.

use async_trait::async_trait;
use common::error::{StoreError, StoreResult};
use thiserror::Error;

use crate::models::{CommitOutcome, NewUser, RentalBox, TemperatureReading, User};

pub mod memory;
pub mod rental_box;
pub mod telemetry;
pub mod user;

pub use memory::MemoryStore;
pub use rental_box::BoxRepository;
pub use telemetry::TelemetryRepository;
pub use user::UserRepository;

/// Failure inserting a user
#[derive(Error, Debug)]
pub enum InsertUserError {
    #[error("username already taken")]
    DuplicateUsername,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure looking up a box's rental state
#[derive(Error, Debug)]
pub enum BoxLookupError {
    #[error("unknown box '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Credential store
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a user by exact username
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Insert a user whose password is already hashed
    async fn insert(&self, new_user: NewUser) -> Result<User, InsertUserError>;

    /// Whether the backing store answers
    async fn health_check(&self) -> bool {
        true
    }
}

/// Box registry, the single source of truth for rental state
#[async_trait]
pub trait BoxStore: Send + Sync {
    /// Find a box by its code
    async fn find_by_code(&self, box_code: &str) -> StoreResult<Option<RentalBox>>;

    /// Register a box unless one with the same code exists. Returns whether it was added.
    async fn register(&self, rental_box: &RentalBox) -> StoreResult<bool>;

    /// Set the renter only if the box currently has none
    async fn commit_rental(&self, renter: &str, box_code: &str) -> StoreResult<CommitOutcome>;

    /// Whether the box is rented; unknown boxes are an error, not "free"
    async fn is_rented(&self, box_code: &str) -> Result<bool, BoxLookupError> {
        match self.find_by_code(box_code).await? {
            Some(rental_box) => Ok(rental_box.is_rented()),
            None => Err(BoxLookupError::NotFound(box_code.to_string())),
        }
    }
}

/// Telemetry sink
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn record(&self, reading: &TemperatureReading) -> StoreResult<()>;
}
