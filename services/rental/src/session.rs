//! Session management
//!
//! Sessions map an opaque random token to a username and the time of the
//! last authenticated request. The token travels as the `session` cookie;
//! expiry is enforced both by the cookie max-age and by an elapsed-time
//! check here, so a replayed cookie past its age is rejected server side.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::cache::RedisPool;
use common::error::{StoreError, StoreResult};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::repositories::UserStore;

/// Random bytes per session token (hex encoded to twice as many chars)
const TOKEN_BYTES: usize = 32;

/// Session entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    fn started_now(username: &str) -> Self {
        Self {
            username: username.to_string(),
            last_activity: Utc::now(),
        }
    }

    /// Whether the session has been idle for at least `max_age`
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let idle = now
            .signed_duration_since(self.last_activity)
            .to_std()
            .unwrap_or(Duration::ZERO);
        idle >= max_age
    }
}

/// Backing table for sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or overwrite the session under `token`
    async fn put(&self, token: &str, session: &Session, max_age: Duration) -> StoreResult<()>;

    async fn get(&self, token: &str) -> StoreResult<Option<Session>>;

    async fn remove(&self, token: &str) -> StoreResult<()>;

    /// Move a live session's last activity to `now` in one step
    ///
    /// An expired session is removed and `None` returned. A session removed
    /// concurrently stays removed.
    async fn touch(
        &self,
        token: &str,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> StoreResult<Option<Session>>;

    /// Drop sessions idle for at least `max_age`, returning how many went
    async fn purge_expired(&self, max_age: Duration) -> StoreResult<usize>;
}

/// Process-local session table
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, token: &str, session: &Session, _max_age: Duration) -> StoreResult<()> {
        self.sessions
            .lock()
            .await
            .insert(token.to_string(), session.clone());
        Ok(())
    }

    async fn get(&self, token: &str) -> StoreResult<Option<Session>> {
        Ok(self.sessions.lock().await.get(token).cloned())
    }

    async fn remove(&self, token: &str) -> StoreResult<()> {
        self.sessions.lock().await.remove(token);
        Ok(())
    }

    async fn touch(
        &self,
        token: &str,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> StoreResult<Option<Session>> {
        let mut sessions = self.sessions.lock().await;
        let expired = match sessions.get(token) {
            Some(session) => session.is_expired(now, max_age),
            None => return Ok(None),
        };

        if expired {
            sessions.remove(token);
            return Ok(None);
        }

        Ok(sessions.get_mut(token).map(|session| {
            session.last_activity = now;
            session.clone()
        }))
    }

    async fn purge_expired(&self, max_age: Duration) -> StoreResult<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, max_age));
        Ok(before - sessions.len())
    }
}

/// Session table kept in Redis, expired by key TTL
#[derive(Clone)]
pub struct RedisSessionStore {
    redis_pool: RedisPool,
}

impl RedisSessionStore {
    pub fn new(redis_pool: RedisPool) -> Self {
        Self { redis_pool }
    }

    fn key(token: &str) -> String {
        format!("session:{}", token)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, token: &str, session: &Session, max_age: Duration) -> StoreResult<()> {
        let value =
            serde_json::to_string(session).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        // Redis rejects a zero TTL.
        let ttl = max_age.as_secs().max(1);
        self.redis_pool
            .set(&Self::key(token), &value, Some(ttl))
            .await
    }

    async fn get(&self, token: &str) -> StoreResult<Option<Session>> {
        match self.redis_pool.get(&Self::key(token)).await? {
            Some(value) => serde_json::from_str(&value)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    async fn remove(&self, token: &str) -> StoreResult<()> {
        self.redis_pool.delete(&Self::key(token)).await
    }

    async fn touch(
        &self,
        token: &str,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> StoreResult<Option<Session>> {
        let Some(session) = self.get(token).await? else {
            return Ok(None);
        };

        if session.is_expired(now, max_age) {
            self.remove(token).await?;
            return Ok(None);
        }

        let refreshed = Session {
            username: session.username,
            last_activity: now,
        };
        let value =
            serde_json::to_string(&refreshed).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        // SET XX: a key deleted since the read is not written back.
        let written = self
            .redis_pool
            .set_existing(&Self::key(token), &value, max_age.as_secs().max(1))
            .await?;
        Ok(written.then_some(refreshed))
    }

    async fn purge_expired(&self, _max_age: Duration) -> StoreResult<usize> {
        Ok(0)
    }
}

/// Session manager issuing and validating session tokens
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    max_age: Duration,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(store: Arc<dyn SessionStore>, users: Arc<dyn UserStore>, max_age: Duration) -> Self {
        Self {
            store,
            users,
            max_age,
        }
    }

    /// Cookie and server-side lifetime of an idle session
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Create a new session for a user and return its token
    pub async fn create(&self, username: &str) -> StoreResult<String> {
        let token = generate_token();
        self.store
            .put(&token, &Session::started_now(username), self.max_age)
            .await?;

        info!("Created session for user: {}", username);
        Ok(token)
    }

    /// Look up a token and slide its expiry
    ///
    /// Returns the username when the session exists and has not been idle
    /// past the max age. An expired session is dropped.
    pub async fn validate_and_refresh(&self, token: &str) -> StoreResult<Option<String>> {
        match self.store.touch(token, Utc::now(), self.max_age).await? {
            Some(session) => Ok(Some(session.username)),
            None => {
                debug!("No live session for presented token");
                Ok(None)
            }
        }
    }

    /// Resolve the user behind a session token
    ///
    /// The username cached in the session is only trusted once the user
    /// still exists in the credential store.
    pub async fn authenticate(&self, token: Option<&str>) -> StoreResult<Option<String>> {
        let Some(token) = token else {
            return Ok(None);
        };

        let Some(username) = self.validate_and_refresh(token).await? else {
            return Ok(None);
        };

        match self.users.find_by_username(&username).await? {
            Some(user) => Ok(Some(user.username)),
            None => {
                info!("Session refers to deleted user {}; dropping it", username);
                self.store.remove(token).await?;
                Ok(None)
            }
        }
    }

    /// Whether the token belongs to a live session of an existing user
    pub async fn is_authenticated(&self, token: Option<&str>) -> bool {
        match self.authenticate(token).await {
            Ok(user) => user.is_some(),
            Err(e) => {
                error!("Failed to check session: {}", e);
                false
            }
        }
    }

    /// Drop sessions idle past the max age
    pub async fn purge_expired(&self) -> StoreResult<usize> {
        self.store.purge_expired(self.max_age).await
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
