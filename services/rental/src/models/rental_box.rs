//! Rentable box model

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A physical box registered with the service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RentalBox {
    pub id: Uuid,
    pub box_code: String,
    pub owner: String,
    pub renter: Option<String>,
    pub rented_at: Option<DateTime<Utc>>,
}

impl RentalBox {
    /// A box nobody has rented yet
    pub fn available(box_code: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            box_code: box_code.into(),
            owner: owner.into(),
            renter: None,
            rented_at: None,
        }
    }

    pub fn is_rented(&self) -> bool {
        self.renter.is_some()
    }
}

/// Result of a conditional rental commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The renter was set by this call
    Committed,
    /// The box already had a renter; nothing changed
    AlreadyRented,
    /// No box with that code exists
    NotFound,
}
