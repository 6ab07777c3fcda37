//! Rental service models

pub mod rental_box;
pub mod telemetry;
pub mod user;

// Re-export for convenience
pub use rental_box::{CommitOutcome, RentalBox};
pub use telemetry::TemperatureReading;
pub use user::{NewUser, User, UserRole};
