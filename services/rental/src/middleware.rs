//! Session cookie extraction and issuing

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use std::convert::Infallible;
use std::time::Duration;
use tracing::error;

use crate::{error::ApiError, state::AppState};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";

/// Read the session token from the request cookies
pub fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// Add (or re-issue) the session cookie with a fresh max-age
pub fn with_session_cookie(
    jar: CookieJar,
    token: &str,
    max_age: Duration,
) -> Result<CookieJar, ApiError> {
    let cookie = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE,
        token,
        max_age.as_secs()
    );
    let cookie = Cookie::parse(cookie).map_err(|e| {
        error!("Failed to build session cookie: {}", e);
        ApiError::InternalServerError
    })?;

    Ok(jar.add(cookie))
}

/// The caller's session, if the request carries a valid one
///
/// Extracting this refreshes the session. Store failures are logged and
/// treated as "not logged in".
#[derive(Debug, Clone, Default)]
pub struct CurrentSession {
    pub token: Option<String>,
    pub username: Option<String>,
}

impl CurrentSession {
    pub fn is_logged_in(&self) -> bool {
        self.username.is_some()
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(token) = session_token(&jar) else {
            return Ok(Self::default());
        };

        let username = match state.sessions.authenticate(Some(&token)).await {
            Ok(username) => username,
            Err(e) => {
                error!("Failed to resolve session: {}", e);
                None
            }
        };

        Ok(Self {
            token: Some(token),
            username,
        })
    }
}
