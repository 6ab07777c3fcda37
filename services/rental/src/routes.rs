//! Rental service routes

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    error::{ApiError, ApiResult},
    middleware::{CurrentSession, session_token, with_session_cookie},
    models::{NewUser, UserRole},
    qr::ArtifactFormat,
    repositories::{BoxLookupError, InsertUserError},
    rental::RentalError,
    state::AppState,
    validation::{
        validate_box_code, validate_claim_code, validate_password, validate_temperature,
        validate_username,
    },
};

/// Request for signup
#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    #[serde(default, rename = "type")]
    pub role: UserRole,
}

/// Request for user login
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Request for a box's claim code
#[derive(Deserialize)]
pub struct RentBoxRequest {
    pub code: String,
    #[serde(default)]
    pub format: ArtifactFormat,
}

/// Request carrying a single code (box code or claim code)
#[derive(Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

/// Temperature report from a box
#[derive(Deserialize)]
pub struct TemperatureRequest {
    pub code: String,
    pub temperature: f64,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub response: String,
}

#[derive(Serialize)]
pub struct IsRentedResponse {
    pub response: bool,
}

/// Create the router for the rental service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/rentbox", post(rent_box))
        .route("/isrented", post(is_rented))
        .route("/sendqr", post(send_qr))
        .route("/sendtemperature", post(send_temperature))
        .with_state(state)
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn message(text: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        response: text.to_string(),
    })
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.users.health_check().await;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database { "ok" } else { "degraded" },
            "service": "rental-service",
            "database": database,
        })),
    )
}

/// Create an account and log it in
pub async fn signup(
    State(state): State<AppState>,
    current: CurrentSession,
    jar: CookieJar,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> ApiResult<Response> {
    if current.is_logged_in() {
        return Ok(StatusCode::SEE_OTHER.into_response());
    }

    let payload = parse_body(payload)?;
    validate_username(&payload.username).map_err(ApiError::BadRequest)?;
    validate_password(&payload.password).map_err(ApiError::BadRequest)?;

    let existing = state
        .users
        .find_by_username(&payload.username)
        .await
        .map_err(|e| {
            error!("Failed to look up user {}: {}", payload.username, e);
            ApiError::InternalServerError
        })?;
    if existing.is_some() {
        return Err(ApiError::UsernameTaken);
    }

    let password_hash = state.hasher.hash(&payload.password).await.map_err(|e| {
        error!("Failed to hash password: {}", e);
        ApiError::InternalServerError
    })?;

    let new_user = NewUser {
        username: payload.username.clone(),
        password_hash,
        role: payload.role,
    };

    // Detached so a dropped connection cannot cancel the insert halfway.
    let users = state.users.clone();
    let inserted = tokio::spawn(async move { users.insert(new_user).await })
        .await
        .map_err(|e| {
            error!("Signup task failed: {}", e);
            ApiError::InternalServerError
        })?;

    let user = match inserted {
        Ok(user) => user,
        Err(InsertUserError::DuplicateUsername) => return Err(ApiError::UsernameTaken),
        Err(InsertUserError::Store(e)) => {
            error!("Failed to create user {}: {}", payload.username, e);
            return Err(ApiError::InternalServerError);
        }
    };

    let token = state.sessions.create(&user.username).await.map_err(|e| {
        error!("Failed to create session: {}", e);
        ApiError::InternalServerError
    })?;
    let jar = with_session_cookie(jar, &token, state.sessions.max_age())?;

    info!("Signed up {} as {}", user.username, user.role);
    Ok((jar, message("Signed up")).into_response())
}

/// Log in with username and password
pub async fn login(
    State(state): State<AppState>,
    current: CurrentSession,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Response> {
    if let (true, Some(token)) = (current.is_logged_in(), current.token.as_deref()) {
        let jar = with_session_cookie(jar, token, state.sessions.max_age())?;
        return Ok((jar, message("Already logged in")).into_response());
    }

    let payload = parse_body(payload)?;
    info!("Login attempt for user: {}", payload.username);

    let user = state
        .users
        .find_by_username(&payload.username)
        .await
        .map_err(|e| {
            error!("Failed to look up user {}: {}", payload.username, e);
            ApiError::InternalServerError
        })?
        .ok_or(ApiError::InvalidCredentials)?;

    let valid = state
        .hasher
        .verify(&user.password_hash, &payload.password)
        .await
        .map_err(|e| {
            error!("Failed to verify password for {}: {}", user.username, e);
            ApiError::InternalServerError
        })?;
    if !valid {
        warn!("Wrong password for user: {}", user.username);
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.sessions.create(&user.username).await.map_err(|e| {
        error!("Failed to create session: {}", e);
        ApiError::InternalServerError
    })?;
    let jar = with_session_cookie(jar, &token, state.sessions.max_age())?;

    Ok((jar, message("Logged in")).into_response())
}

/// Reserve a box and return its claim code as a QR artifact
pub async fn rent_box(
    State(state): State<AppState>,
    payload: Result<Json<RentBoxRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let payload = parse_body(payload)?;
    validate_box_code(&payload.code).map_err(ApiError::BadRequest)?;

    let ticket = state.rentals.request_rental(&payload.code).await?;
    let format = payload.format;

    let headers = [
        (header::CONTENT_TYPE, format.content_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", format.file_name()),
        ),
    ];

    Ok((headers, ticket.artifact.render(format)).into_response())
}

/// Whether a box currently has a renter
pub async fn is_rented(
    State(state): State<AppState>,
    payload: Result<Json<CodeRequest>, JsonRejection>,
) -> ApiResult<Json<IsRentedResponse>> {
    let payload = parse_body(payload)?;
    validate_box_code(&payload.code).map_err(ApiError::BadRequest)?;

    match state.boxes.is_rented(&payload.code).await {
        Ok(rented) => Ok(Json(IsRentedResponse { response: rented })),
        Err(BoxLookupError::NotFound(_)) => Err(ApiError::UnknownBox),
        Err(BoxLookupError::Store(e)) => {
            error!("Failed to read rental state of {}: {}", payload.code, e);
            Err(ApiError::InternalServerError)
        }
    }
}

/// Redeem a scanned claim code for the logged-in user
pub async fn send_qr(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<CodeRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let payload = parse_body(payload)?;
    validate_claim_code(&payload.code).map_err(|_| ApiError::InvalidOrExpiredCode)?;

    let token = session_token(&jar);

    // Detached so a dropped connection cannot cancel the commit halfway.
    let rentals = state.rentals.clone();
    let session = token.clone();
    let redeemed =
        tokio::spawn(async move { rentals.redeem(&payload.code, session.as_deref()).await })
            .await
            .map_err(|e| {
                error!("Redeem task failed: {}", e);
                ApiError::InternalServerError
            })?;

    // Every outcome past authentication has refreshed the session server side.
    let authenticated = !matches!(
        redeemed,
        Err(RentalError::Unauthenticated | RentalError::InvalidOrExpiredToken)
    );
    let jar = match token.as_deref() {
        Some(token) if authenticated => {
            with_session_cookie(jar, token, state.sessions.max_age())?
        }
        _ => jar,
    };

    match redeemed {
        Ok(redemption) => Ok((
            jar,
            message(&format!("Box {} rented", redemption.box_code)),
        )
            .into_response()),
        Err(RentalError::Unauthenticated) => {
            info!("Claim presented without a valid session");
            Err(ApiError::Unauthorized)
        }
        Err(e) => Ok((jar, ApiError::from(e)).into_response()),
    }
}

/// Accept a temperature reading from a box
///
/// Storage happens in the background; a failed write is only logged.
pub async fn send_temperature(
    State(state): State<AppState>,
    payload: Result<Json<TemperatureRequest>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let payload = parse_body(payload)?;
    validate_box_code(&payload.code).map_err(ApiError::BadRequest)?;
    validate_temperature(payload.temperature).map_err(ApiError::BadRequest)?;

    state.telemetry.submit(payload.code, payload.temperature);

    Ok(StatusCode::OK)
}
