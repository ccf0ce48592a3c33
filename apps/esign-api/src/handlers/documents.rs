//! Document upload, placement and signing endpoints

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use esign_core::{
    probe_aspect_ratio, stamp_file, AssetSource, PlacementRequest, SignatureKind, SignedDocument,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use super::{decode_upload, remove_stored_file, Caller};
use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;

/// Upload a PDF awaiting signature
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<UploadDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
    let original_filename = req.original_filename.trim().to_string();
    if original_filename.is_empty() {
        return Err(ApiError::InvalidRequest("File name is required".to_string()));
    }

    let pdf_data = decode_upload(&req.pdf_base64, "PDF", state.config.max_upload_bytes)?;

    // Only documents the stamper can open are accepted
    let (pdf_data, page_count) = tokio::task::spawn_blocking(move || {
        esign_core::page_count(&pdf_data).map(|pages| (pdf_data, pages))
    })
    .await
    .map_err(anyhow::Error::new)??;

    let id = Uuid::new_v4().to_string();
    let file_name = format!("{}.pdf", Uuid::new_v4().simple());
    let path = state.document_path(&file_name);
    tokio::fs::write(&path, &pdf_data)
        .await
        .map_err(|e| anyhow::Error::new(e).context(format!("Writing {}", path.display())))?;

    let row = DbDocument {
        id,
        original_filename,
        file_name,
        page_count: i64::from(page_count),
        uploaded_by: caller.0.id.clone(),
        client: req.client,
        work: req.work,
        document_type: req.document_type,
        comment: req.comment,
        status: DocumentStatus::Pending.as_str().to_string(),
        placements_json: None,
        signed_file_name: None,
        signed_by: None,
        signing_method: None,
        created_at: Utc::now(),
        signed_at: None,
    };

    let inserted = sqlx::query(
        r#"
        INSERT INTO documents (id, original_filename, file_name, page_count, uploaded_by, client, work, document_type, comment, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&row.id)
    .bind(&row.original_filename)
    .bind(&row.file_name)
    .bind(row.page_count)
    .bind(&row.uploaded_by)
    .bind(&row.client)
    .bind(&row.work)
    .bind(&row.document_type)
    .bind(&row.comment)
    .bind(&row.status)
    .bind(row.created_at.to_rfc3339())
    .execute(&state.db)
    .await;

    if let Err(e) = inserted {
        remove_stored_file(&path).await.ok();
        return Err(e.into());
    }

    tracing::info!(
        "Uploaded document {} ({} pages) by {}",
        row.id,
        page_count,
        row.uploaded_by
    );

    Ok((StatusCode::CREATED, Json(row.try_into()?)))
}

/// Dashboard: pending and signed documents visible to the caller
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<DashboardResponse>, ApiError> {
    let user = &caller.0;

    let (pending, signed) = if user.is_boss() {
        let pending = sqlx::query_as::<_, DbDocument>(
            "SELECT * FROM documents WHERE status != 'signed' ORDER BY created_at DESC",
        )
        .fetch_all(&state.db)
        .await?;
        let signed = sqlx::query_as::<_, DbDocument>(
            "SELECT * FROM documents WHERE status = 'signed' AND signed_by = ? ORDER BY signed_at DESC",
        )
        .bind(&user.id)
        .fetch_all(&state.db)
        .await?;
        (pending, signed)
    } else {
        let pending = sqlx::query_as::<_, DbDocument>(
            "SELECT * FROM documents WHERE status != 'signed' AND uploaded_by = ? ORDER BY created_at DESC",
        )
        .bind(&user.id)
        .fetch_all(&state.db)
        .await?;
        let signed = sqlx::query_as::<_, DbDocument>(
            "SELECT * FROM documents WHERE status = 'signed' AND uploaded_by = ? ORDER BY signed_at DESC",
        )
        .bind(&user.id)
        .fetch_all(&state.db)
        .await?;
        (pending, signed)
    };

    Ok(Json(DashboardResponse {
        pending: to_responses(pending)?,
        signed: to_responses(signed)?,
    }))
}

fn to_responses(rows: Vec<DbDocument>) -> Result<Vec<DocumentResponse>, ApiError> {
    Ok(rows
        .into_iter()
        .map(DocumentResponse::try_from)
        .collect::<Result<Vec<_>, _>>()?)
}

/// Download the document: the signed artifact once signed, the upload before
pub async fn get_document_file(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let doc = visible_document(&state, &caller, &id).await?;

    let (file_name, download_name) = match (&doc.status()?, &doc.signed_file_name) {
        (DocumentStatus::Signed, Some(signed)) => {
            (signed.clone(), format!("signed_{}", doc.original_filename))
        }
        _ => (doc.file_name.clone(), doc.original_filename.clone()),
    };

    let bytes = match tokio::fs::read(state.document_path(&file_name)).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("File {} missing for document {}", file_name, doc.id);
            return Err(ApiError::NotFound("Document file"));
        }
        Err(e) => return Err(anyhow::Error::new(e).into()),
    };

    let disposition = format!(
        "inline; filename=\"{}\"",
        download_name.replace(|c: char| c == '"' || c == '\\' || c.is_control(), "_")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// Save the placements used later by auto-signing
pub async fn save_placements(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<SavePlacementsRequest>,
) -> Result<Json<PlacementsResponse>, ApiError> {
    let doc = find_document(&state, &id).await?;
    if doc.uploaded_by != caller.0.id {
        return Err(ApiError::Forbidden(
            "Only the uploader can place signatures on a document",
        ));
    }
    if doc.status()? != DocumentStatus::Pending {
        return Err(ApiError::InvalidRequest(
            "Placements can only be changed while the document is pending".to_string(),
        ));
    }

    validate_placements(&req.positions, doc.page_count)?;

    let json = serde_json::to_string(&req.positions).map_err(anyhow::Error::new)?;
    sqlx::query("UPDATE documents SET placements_json = ? WHERE id = ? AND status = 'pending'")
        .bind(&json)
        .bind(&doc.id)
        .execute(&state.db)
        .await?;

    tracing::info!("Saved {} placements on document {}", req.positions.len(), doc.id);

    Ok(Json(PlacementsResponse {
        positions: req.positions,
    }))
}

pub async fn get_placements(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<PlacementsResponse>, ApiError> {
    let doc = visible_document(&state, &caller, &id).await?;
    Ok(Json(PlacementsResponse {
        positions: doc.placements()?.unwrap_or_default(),
    }))
}

fn validate_placements(positions: &[PlacementRequest], page_count: i64) -> Result<(), ApiError> {
    for (index, p) in positions.iter().enumerate() {
        if !(p.x.is_finite() && p.y.is_finite()) {
            return Err(ApiError::InvalidRequest(format!(
                "Placement {} has a non-numeric position",
                index
            )));
        }
        let bad_size = [p.width, p.height]
            .into_iter()
            .flatten()
            .any(|v| !v.is_finite() || v <= 0.0);
        if bad_size {
            return Err(ApiError::InvalidRequest(format!(
                "Placement {} has a non-positive size",
                index
            )));
        }
        if i64::from(p.page) >= page_count {
            return Err(ApiError::InvalidRequest(format!(
                "Placement {} is on page {} but the document has {} pages",
                index, p.page, page_count
            )));
        }
    }
    Ok(())
}

/// Stamp the boss's assets onto a pending document
pub async fn sign_document(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<SignDocumentRequest>,
) -> Result<Json<SignResponse>, ApiError> {
    let boss = caller.require_boss("Only the boss can sign documents")?;
    let doc = find_document(&state, &id).await?;
    if doc.status()? != DocumentStatus::Pending {
        return Err(ApiError::Conflict(format!(
            "Document is {}, not pending",
            doc.status
        )));
    }

    let placements = resolve_placements(&doc, &req)?;

    let owned = sqlx::query_as::<_, DbSignature>("SELECT * FROM signatures WHERE user_id = ?")
        .bind(&boss.id)
        .fetch_all(&state.db)
        .await?;
    let assets: Vec<(String, PathBuf, Option<f64>)> = owned
        .iter()
        .map(|sig| {
            (
                sig.id.clone(),
                state.assets.path_of(&sig.file_name),
                sig.aspect_ratio(),
            )
        })
        .collect();

    // Only one signing job per document at a time
    let claimed =
        sqlx::query("UPDATE documents SET status = 'signing' WHERE id = ? AND status = 'pending'")
            .bind(&doc.id)
            .execute(&state.db)
            .await?
            .rows_affected();
    if claimed != 1 {
        return Err(ApiError::Conflict(
            "Document is already being signed".to_string(),
        ));
    }

    let source = state.document_path(&doc.file_name);
    let output_dir = state.config.documents_dir();
    let options = state.config.stamp;
    let job = tokio::task::spawn_blocking(move || {
        // Rows without stored dimensions fall back to the image header
        let lookup: HashMap<String, AssetSource> = assets
            .into_iter()
            .map(|(id, path, ratio)| {
                let ratio = ratio.or_else(|| probe_aspect_ratio(&path));
                (id, AssetSource::new(path, ratio))
            })
            .collect();
        stamp_file(&source, &output_dir, &placements, &lookup, &options)
    })
    .await;

    let signed: SignedDocument = match job {
        Ok(Ok(signed)) => signed,
        Ok(Err(e)) => {
            release_document(&state, &doc.id).await;
            return Err(e.into());
        }
        Err(e) => {
            release_document(&state, &doc.id).await;
            return Err(anyhow::Error::new(e).context("Signing task failed").into());
        }
    };

    let recorded = sqlx::query(
        r#"
        UPDATE documents
        SET status = 'signed', signed_file_name = ?, signed_by = ?, signed_at = ?, signing_method = ?
        WHERE id = ? AND status = 'signing'
        "#,
    )
    .bind(&signed.artifact.file_name)
    .bind(&boss.id)
    .bind(Utc::now().to_rfc3339())
    .bind(req.signing_method.as_str())
    .bind(&doc.id)
    .execute(&state.db)
    .await;

    if let Err(e) = recorded {
        remove_stored_file(&signed.artifact.path).await.ok();
        release_document(&state, &doc.id).await;
        return Err(e.into());
    }

    let report = signed.report;
    tracing::info!(
        "Signed document {} as {} ({} applied, {} skipped)",
        doc.id,
        signed.artifact.file_name,
        report.applied.len(),
        report.skipped.len()
    );

    Ok(Json(SignResponse {
        success: true,
        message: format!(
            "Document signed with {} of {} placements",
            report.applied.len(),
            report.applied.len() + report.skipped.len()
        ),
        document_id: doc.id,
        signed_file_name: signed.artifact.file_name,
        applied: report.applied.len(),
        skipped: report
            .skipped
            .into_iter()
            .map(|s| SkippedPlacement {
                index: s.index,
                page: s.page,
                reason: s.reason.to_string(),
            })
            .collect(),
    }))
}

/// Placements for this job, with asset ids filled in for auto mode.
///
/// Auto mode without saved placements signs with the request's positions,
/// the same as manual mode.
fn resolve_placements(
    doc: &DbDocument,
    req: &SignDocumentRequest,
) -> Result<Vec<PlacementRequest>, ApiError> {
    let saved = match req.signing_method {
        SigningMethod::Auto => doc.placements()?.filter(|p| !p.is_empty()),
        SigningMethod::Manual => None,
    };

    let Some(saved) = saved else {
        return match &req.positions {
            Some(positions) if !positions.is_empty() => {
                validate_placements(positions, doc.page_count)?;
                Ok(positions.clone())
            }
            _ => Err(ApiError::InvalidRequest(
                "Signing needs saved placements or at least one position".to_string(),
            )),
        };
    };

    let all_chosen = [
        SignatureKind::Signature,
        SignatureKind::Initial,
        SignatureKind::Company,
    ]
    .into_iter()
    .all(|kind| req.asset_for(kind).is_some());
    if !all_chosen {
        return Err(ApiError::InvalidRequest(
            "Auto-signing needs a signature, initial and company id".to_string(),
        ));
    }

    Ok(saved
        .into_iter()
        .map(|mut p| {
            p.asset_id = req.asset_for(p.kind).map(str::to_string);
            p
        })
        .collect())
}

/// Return a document to `pending` after a failed signing attempt
async fn release_document(state: &AppState, id: &str) {
    let reverted =
        sqlx::query("UPDATE documents SET status = 'pending' WHERE id = ? AND status = 'signing'")
            .bind(id)
            .execute(&state.db)
            .await;
    if let Err(e) = reverted {
        tracing::error!("Could not release document {} after failed signing: {}", id, e);
    }
}

/// Delete a document with its original and signed files
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let doc = visible_document(&state, &caller, &id).await?;
    if doc.status()? == DocumentStatus::Signing {
        return Err(ApiError::Conflict(
            "Document is being signed".to_string(),
        ));
    }

    remove_stored_file(&state.document_path(&doc.file_name)).await?;
    if let Some(signed) = &doc.signed_file_name {
        remove_stored_file(&state.document_path(signed)).await?;
    }

    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(&doc.id)
        .execute(&state.db)
        .await?;

    tracing::info!("Deleted document {}", doc.id);

    Ok(StatusCode::NO_CONTENT)
}

async fn find_document(state: &AppState, id: &str) -> Result<DbDocument, ApiError> {
    sqlx::query_as::<_, DbDocument>("SELECT * FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Document"))
}

/// A document the caller may read: the boss sees all, others their uploads
async fn visible_document(
    state: &AppState,
    caller: &Caller,
    id: &str,
) -> Result<DbDocument, ApiError> {
    let doc = find_document(state, id).await?;
    if !caller.0.is_boss() && doc.uploaded_by != caller.0.id {
        return Err(ApiError::Forbidden("Not your document"));
    }
    Ok(doc)
}
