//! HTTP handlers for the esign API

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{CreateUserRequest, DbUser, User};
use crate::state::AppState;

pub mod documents;
pub mod signatures;

/// Header carrying the authenticated caller's user id
pub const USER_HEADER: &str = "x-user-id";

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// The user making the request, resolved from [`USER_HEADER`]
#[derive(Debug, Clone)]
pub struct Caller(pub User);

impl Caller {
    pub fn require_boss(&self, action: &'static str) -> Result<&User, ApiError> {
        if self.0.is_boss() {
            Ok(&self.0)
        } else {
            Err(ApiError::Forbidden(action))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        let row = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or(ApiError::Unauthorized)?;

        Ok(Caller(User::try_from(row)?))
    }
}

/// Register a user. Account management lives outside this service; this is
/// the seeding hook it uses.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let username = req.username.trim();
    let email = req.email.trim();
    if username.is_empty() || email.is_empty() {
        return Err(ApiError::InvalidRequest(
            "Username and email are required".to_string(),
        ));
    }

    let taken: Option<(String,)> =
        sqlx::query_as("SELECT id FROM users WHERE username = ? OR email = ?")
            .bind(username)
            .bind(email)
            .fetch_optional(&state.db)
            .await?;
    if taken.is_some() {
        return Err(ApiError::Conflict(
            "Username or email already registered".to_string(),
        ));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        email: email.to_string(),
        role: req.role,
        created_at: Utc::now(),
    };

    sqlx::query("INSERT INTO users (id, username, email, role, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.created_at.to_rfc3339())
        .execute(&state.db)
        .await?;

    tracing::info!("Created {} user {}", user.role.as_str(), user.id);

    Ok((StatusCode::CREATED, Json(user)))
}

/// Who am I
pub async fn current_user(caller: Caller) -> Json<User> {
    Json(caller.0)
}

/// Decode a base64 upload, accepting an optional `data:...;base64,` prefix
pub(crate) fn decode_upload(
    encoded: &str,
    what: &str,
    max_bytes: usize,
) -> Result<Vec<u8>, ApiError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };

    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid {} base64: {}", what, e)))?;

    if bytes.is_empty() {
        return Err(ApiError::InvalidRequest(format!("Empty {} upload", what)));
    }
    if bytes.len() > max_bytes {
        return Err(ApiError::InvalidRequest(format!(
            "{} upload exceeds {} bytes",
            what, max_bytes
        )));
    }

    Ok(bytes)
}

/// Remove a stored file, tolerating one that is already gone
pub(crate) async fn remove_stored_file(path: &std::path::Path) -> Result<(), ApiError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("Removing {}", path.display()))
            .into()),
    }
}
