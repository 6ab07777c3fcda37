//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role a user signed up with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Rents boxes
    #[default]
    Renter,
    /// Owns boxes offered for rent
    Owner,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Renter => "renter",
            UserRole::Owner => "owner",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "renter" => Ok(UserRole::Renter),
            "owner" => Ok(UserRole::Owner),
            other => Err(format!("unknown user role '{}'", other)),
        }
    }
}

/// User entity
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// New user creation payload, password already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
}

impl NewUser {
    /// Materialize the row a store will hold for this user
    pub fn into_user(self) -> User {
        User {
            id: Uuid::new_v4(),
            username: self.username,
            password_hash: self.password_hash,
            role: self.role,
            created_at: Utc::now(),
        }
    }
}
