//! Registration, login, logout and the auth guard for protected routes.
//!
//! Sessions are stateless signed tokens (see [`crate::token`]); logout works
//! by blacklisting the presented token until its natural expiry. The guard
//! checks the blacklist on every request, so revocation takes effect on the
//! very next request after logout.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{AuthResponse, BlacklistedToken, LoginRequest, RegisterRequest, User};
use crate::token;
use crate::AppState;

use super::error::{is_unique_violation, ApiError, ErrorCode};
use super::validation::{validate_email, validate_name, validate_password};
use super::MessageResponse;

/// Why a token failed verification. `Unauthenticated` deliberately covers
/// missing, malformed, expired and unknown-subject tokens alike; only
/// revocation gets its own message so the client can prompt a re-login.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not authorized to access this route")]
    Unauthenticated,
    #[error("Token has been invalidated. Please login again.")]
    TokenRevoked,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated | AuthError::TokenRevoked => {
                ApiError::unauthorized(err.to_string())
            }
            AuthError::Database(e) => e.into(),
        }
    }
}

/// The verified identity attached to a request by [`require_auth`].
/// Carries no password hash.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Not authorized to access this route"))
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Extract the bearer token from the Authorization header
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    header.strip_prefix("Bearer ").map(|t| t.to_string())
}

/// Verify a session token and resolve its subject.
///
/// Checks run in order and short-circuit: blacklist lookup, then signature
/// and expiry, then the subject must still exist in the users table. The
/// user is re-resolved on every call; nothing is cached.
pub async fn verify_token(state: &AppState, token: &str) -> Result<CurrentUser, AuthError> {
    let revoked: Option<BlacklistedToken> =
        sqlx::query_as("SELECT * FROM blacklisted_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&state.db)
            .await?;
    if revoked.is_some() {
        return Err(AuthError::TokenRevoked);
    }

    let claims = token::decode(token, &state.config.auth.jwt_secret)
        .map_err(|_| AuthError::Unauthenticated)?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(&state.db)
        .await?;

    user.map(CurrentUser::from).ok_or(AuthError::Unauthenticated)
}

/// Middleware guarding every protected route. On success the resolved
/// [`CurrentUser`] is attached to the request for downstream handlers.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Not authorized to access this route"))?;

    match verify_token(&state, &token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(err) => {
            tracing::debug!(error = %err, "Rejected request token");
            Err(err.into())
        }
    }
}

/// Register endpoint
///
/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    validate_name(&request.name).map_err(ApiError::bad_request)?;
    validate_email(&request.email).map_err(ApiError::bad_request)?;
    validate_password(&request.password).map_err(ApiError::bad_request)?;

    let name = request.name.trim().to_string();
    let email = request.email.trim().to_lowercase();

    let password_hash = hash_password(&request.password).map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        ApiError::internal("Something went wrong")
    })?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    // The UNIQUE index on email serializes concurrent registrations; the
    // loser of a race lands in the constraint-violation arm below.
    let inserted = sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&email)
    .bind(&password_hash)
    .bind(&name)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await;

    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::new(ErrorCode::Conflict, "User already exists")
                .with_status(StatusCode::BAD_REQUEST));
        }
        Err(e) => return Err(e.into()),
    }

    let token = issue_session_token(&state, &id)?;

    tracing::info!(email = %email, "New user registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            id,
            name,
            email,
            token,
        }),
    ))
}

/// Login endpoint
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = request.email.trim().to_lowercase();

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;

    // Unknown email and wrong password must be indistinguishable on the
    // wire; the two cases only diverge in the debug log.
    let user = match user {
        Some(user) => user,
        None => {
            tracing::debug!(email = %email, "Login attempt for unknown email");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    if !verify_password(&request.password, &user.password_hash) {
        tracing::debug!(email = %email, "Login attempt with wrong password");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = issue_session_token(&state, &user.id)?;

    tracing::info!(email = %email, "User logged in");

    Ok(Json(AuthResponse {
        id: user.id,
        name: user.name,
        email: user.email,
        token,
    }))
}

/// Logout endpoint. Protected, so the token has already passed the guard;
/// it is decoded again here because this is a distinct boundary call.
///
/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = bearer_token(&headers).ok_or_else(|| ApiError::bad_request("No token provided"))?;

    let claims = token::decode(&token, &state.config.auth.jwt_secret)
        .map_err(|_| ApiError::bad_request("Invalid token"))?;

    // The blacklist row expires exactly when the token would have; keeping
    // it longer could never change a verification result.
    let expires_at = chrono::DateTime::from_timestamp(claims.exp, 0)
        .ok_or_else(|| ApiError::bad_request("Invalid token"))?
        .to_rfc3339();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT OR IGNORE INTO blacklisted_tokens (token, expires_at, created_at) VALUES (?, ?, ?)",
    )
    .bind(&token)
    .bind(&expires_at)
    .bind(&now)
    .execute(&state.db)
    .await?;

    tracing::info!(user_id = %claims.sub, "Session token revoked");

    Ok(Json(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}

fn issue_session_token(state: &AppState, user_id: &str) -> Result<String, ApiError> {
    token::issue(
        user_id,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_days,
    )
    .map_err(|e| {
        tracing::error!(error = %e, "Token issuance failed");
        ApiError::internal("Something went wrong")
    })
}
