//! Signature asset endpoints
//!
//! Assets belong to the boss. Employees may list and view them but never
//! change them.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use esign_core::{SignatureKind, StoredAsset};
use std::sync::Arc;
use uuid::Uuid;

use super::{decode_upload, Caller};
use crate::error::ApiError;
use crate::models::{DbSignature, DbUser, SignatureResponse, UploadSignatureRequest};
use crate::state::AppState;

/// Upload, normalize and store a new signature asset
pub async fn upload_signature(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<UploadSignatureRequest>,
) -> Result<(StatusCode, Json<SignatureResponse>), ApiError> {
    let owner = caller.require_boss("Only the boss can upload signatures")?;
    let raw = decode_upload(&req.image_base64, "image", state.config.max_upload_bytes)?;

    let store = state.assets.clone();
    let stored: StoredAsset = tokio::task::spawn_blocking(move || store.create(&raw))
        .await
        .map_err(anyhow::Error::new)??;

    let row = DbSignature {
        id: Uuid::new_v4().to_string(),
        user_id: owner.id.clone(),
        file_name: stored.file_name.clone(),
        kind: req.kind.as_str().to_string(),
        display_name: req.display_name.filter(|n| !n.trim().is_empty()),
        width: i64::from(stored.width),
        height: i64::from(stored.height),
        is_active: false,
        is_default: false,
        created_at: Utc::now(),
    };

    if let Err(e) = insert_signature(&state, &row, req.kind).await {
        // Keep no PNG without a record
        if let Err(cleanup) = state.assets.remove(&stored.file_name) {
            tracing::warn!("Could not remove orphaned asset {}: {}", stored.file_name, cleanup);
        }
        return Err(e);
    }

    tracing::info!(
        "Stored {} asset {} ({}x{})",
        row.kind,
        row.id,
        row.width,
        row.height
    );

    Ok((StatusCode::CREATED, Json(row.try_into()?)))
}

async fn insert_signature(
    state: &AppState,
    row: &DbSignature,
    kind: SignatureKind,
) -> Result<(), ApiError> {
    let mut tx = state.db.begin().await?;

    // A fresh signature or company stamp retires the previous one
    if matches!(kind, SignatureKind::Signature | SignatureKind::Company) {
        sqlx::query("UPDATE signatures SET is_active = 0 WHERE user_id = ? AND kind = ?")
            .bind(&row.user_id)
            .bind(&row.kind)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO signatures (id, user_id, file_name, kind, display_name, width, height, is_active, is_default, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&row.id)
    .bind(&row.user_id)
    .bind(&row.file_name)
    .bind(&row.kind)
    .bind(&row.display_name)
    .bind(row.width)
    .bind(row.height)
    .bind(row.is_active)
    .bind(row.is_default)
    .bind(row.created_at.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// List the boss's assets, newest first
pub async fn list_signatures(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<SignatureResponse>>, ApiError> {
    let Some(owner_id) = asset_owner(&state, &caller).await? else {
        return Ok(Json(Vec::new()));
    };

    let rows = sqlx::query_as::<_, DbSignature>(
        "SELECT * FROM signatures WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(&owner_id)
    .fetch_all(&state.db)
    .await?;

    let signatures = rows
        .into_iter()
        .map(SignatureResponse::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(signatures))
}

/// The active asset of one kind
pub async fn get_active_signature(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(kind): Path<String>,
) -> Result<Json<SignatureResponse>, ApiError> {
    let kind: SignatureKind = kind.parse().map_err(ApiError::InvalidRequest)?;
    let owner_id = asset_owner(&state, &caller)
        .await?
        .ok_or(ApiError::NotFound("Active signature"))?;

    let row = sqlx::query_as::<_, DbSignature>(
        r#"
        SELECT * FROM signatures
        WHERE user_id = ? AND kind = ? AND is_active = 1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(&owner_id)
    .bind(kind.as_str())
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("Active signature"))?;

    Ok(Json(row.try_into()?))
}

/// Make this asset the active one of its kind
pub async fn activate_signature(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<SignatureResponse>, ApiError> {
    let row = owned_signature(&state, &caller, &id).await?;

    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE signatures SET is_active = 0 WHERE user_id = ? AND kind = ?")
        .bind(&row.user_id)
        .bind(&row.kind)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE signatures SET is_active = 1 WHERE id = ?")
        .bind(&row.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!("Activated {} asset {}", row.kind, row.id);

    Ok(Json(
        DbSignature {
            is_active: true,
            ..row
        }
        .try_into()?,
    ))
}

/// Mark this asset as the default of its kind
pub async fn set_default_signature(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<SignatureResponse>, ApiError> {
    let row = owned_signature(&state, &caller, &id).await?;

    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE signatures SET is_default = 0 WHERE user_id = ? AND kind = ?")
        .bind(&row.user_id)
        .bind(&row.kind)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE signatures SET is_default = 1 WHERE id = ?")
        .bind(&row.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Json(
        DbSignature {
            is_default: true,
            ..row
        }
        .try_into()?,
    ))
}

pub async fn unset_default_signature(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<SignatureResponse>, ApiError> {
    let row = owned_signature(&state, &caller, &id).await?;

    sqlx::query("UPDATE signatures SET is_default = 0 WHERE id = ?")
        .bind(&row.id)
        .execute(&state.db)
        .await?;

    Ok(Json(
        DbSignature {
            is_default: false,
            ..row
        }
        .try_into()?,
    ))
}

/// Delete an asset: the PNG first, then its record
pub async fn delete_signature(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let row = owned_signature(&state, &caller, &id).await?;

    state.assets.remove(&row.file_name)?;
    sqlx::query("DELETE FROM signatures WHERE id = ?")
        .bind(&row.id)
        .execute(&state.db)
        .await?;

    tracing::info!("Deleted {} asset {}", row.kind, row.id);

    Ok(StatusCode::NO_CONTENT)
}

/// Serve the normalized PNG
pub async fn get_signature_image(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = asset_owner(&state, &caller).await?;
    let row = find_signature(&state, &id).await?;
    if owner_id.as_deref() != Some(row.user_id.as_str()) {
        return Err(ApiError::NotFound("Signature"));
    }

    let bytes = match tokio::fs::read(state.assets.path_of(&row.file_name)).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Asset file missing for signature {}", row.id);
            return Err(ApiError::NotFound("Signature image"));
        }
        Err(e) => return Err(anyhow::Error::new(e).into()),
    };

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

/// Whose assets the caller sees: their own if boss, otherwise the boss's
async fn asset_owner(state: &AppState, caller: &Caller) -> Result<Option<String>, ApiError> {
    if caller.0.is_boss() {
        return Ok(Some(caller.0.id.clone()));
    }

    let boss = sqlx::query_as::<_, DbUser>(
        "SELECT * FROM users WHERE role = 'boss' ORDER BY created_at LIMIT 1",
    )
    .fetch_optional(&state.db)
    .await?;

    Ok(boss.map(|b| b.id))
}

async fn find_signature(state: &AppState, id: &str) -> Result<DbSignature, ApiError> {
    sqlx::query_as::<_, DbSignature>("SELECT * FROM signatures WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Signature"))
}

/// A signature the caller may modify
async fn owned_signature(
    state: &AppState,
    caller: &Caller,
    id: &str,
) -> Result<DbSignature, ApiError> {
    let owner = caller.require_boss("Only the boss can manage signatures")?;
    let row = find_signature(state, id).await?;
    if row.user_id != owner.id {
        return Err(ApiError::Forbidden("Signature belongs to another user"));
    }
    Ok(row)
}
