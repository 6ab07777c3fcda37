//! Common library for the box rental backend
//!
//! This crate provides shared infrastructure used by the services in the
//! workspace: PostgreSQL connectivity, the Redis cache pool and the store
//! error type every adapter reports.

pub mod cache;
pub mod database;
pub mod error;
