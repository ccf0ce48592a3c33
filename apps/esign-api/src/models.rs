//! Data models for the esign API

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use esign_core::{PlacementRequest, SignatureKind};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Caller role. Only a boss owns signature assets and signs documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Boss,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Boss => "boss",
            Role::Employee => "employee",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boss" => Ok(Role::Boss),
            "employee" => Ok(Role::Employee),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Document lifecycle. `Signing` marks a document with a stamping job in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Signing,
    Signed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Signing => "signing",
            DocumentStatus::Signed => "signed",
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "signing" => Ok(DocumentStatus::Signing),
            "signed" => Ok(DocumentStatus::Signed),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningMethod {
    Auto,
    #[default]
    Manual,
}

impl SigningMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningMethod::Auto => "auto",
            SigningMethod::Manual => "manual",
        }
    }
}

// ============================================================
// Database rows
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_boss(&self) -> bool {
        self.role == Role::Boss
    }
}

impl TryFrom<DbUser> for User {
    type Error = anyhow::Error;

    fn try_from(row: DbUser) -> Result<Self, Self::Error> {
        Ok(User {
            role: row.role.parse().map_err(anyhow::Error::msg)?,
            id: row.id,
            username: row.username,
            email: row.email,
            created_at: row.created_at,
        })
    }
}

/// A stored, normalized signature asset
#[derive(Debug, Clone, FromRow)]
pub struct DbSignature {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub kind: String,
    pub display_name: Option<String>,
    pub width: i64,
    pub height: i64,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl DbSignature {
    pub fn kind(&self) -> anyhow::Result<SignatureKind> {
        self.kind
            .parse()
            .map_err(|e: String| anyhow!("signature {}: {}", self.id, e))
    }

    /// Width over height of the stored PNG, when known
    pub fn aspect_ratio(&self) -> Option<f64> {
        (self.width > 0 && self.height > 0).then(|| self.width as f64 / self.height as f64)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDocument {
    pub id: String,
    pub original_filename: String,
    pub file_name: String,
    pub page_count: i64,
    pub uploaded_by: String,
    pub client: Option<String>,
    pub work: Option<String>,
    pub document_type: Option<String>,
    pub comment: Option<String>,
    pub status: String,
    pub placements_json: Option<String>,
    pub signed_file_name: Option<String>,
    pub signed_by: Option<String>,
    pub signing_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub signed_at: Option<DateTime<Utc>>,
}

impl DbDocument {
    pub fn status(&self) -> anyhow::Result<DocumentStatus> {
        self.status
            .parse()
            .map_err(|e: String| anyhow!("document {}: {}", self.id, e))
    }

    pub fn placements(&self) -> anyhow::Result<Option<Vec<PlacementRequest>>> {
        self.placements_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| anyhow!("document {} placements: {}", self.id, e))
    }
}

// ============================================================
// Requests
// ============================================================

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UploadSignatureRequest {
    #[serde(default, alias = "type")]
    pub kind: SignatureKind,
    pub display_name: Option<String>,
    pub image_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadDocumentRequest {
    #[serde(alias = "originalFilename")]
    pub original_filename: String,
    pub pdf_base64: String,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub work: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SavePlacementsRequest {
    pub positions: Vec<PlacementRequest>,
}

#[derive(Debug, Deserialize)]
pub struct SignDocumentRequest {
    #[serde(default, alias = "signingMethod")]
    pub signing_method: SigningMethod,
    #[serde(default)]
    pub positions: Option<Vec<PlacementRequest>>,
    #[serde(default, alias = "signatureId")]
    pub signature_id: Option<String>,
    #[serde(default, alias = "initialId")]
    pub initial_id: Option<String>,
    #[serde(default, alias = "companyId")]
    pub company_id: Option<String>,
}

impl SignDocumentRequest {
    /// The asset the caller chose for `kind` in auto mode
    pub fn asset_for(&self, kind: SignatureKind) -> Option<&str> {
        match kind {
            SignatureKind::Signature => self.signature_id.as_deref(),
            SignatureKind::Initial => self.initial_id.as_deref(),
            SignatureKind::Company => self.company_id.as_deref(),
        }
    }
}

// ============================================================
// Responses
// ============================================================

#[derive(Debug, Serialize)]
pub struct SignatureResponse {
    pub id: String,
    pub kind: SignatureKind,
    pub display_name: Option<String>,
    pub width: i64,
    pub height: i64,
    pub aspect_ratio: Option<f64>,
    pub is_active: bool,
    pub is_default: bool,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbSignature> for SignatureResponse {
    type Error = anyhow::Error;

    fn try_from(row: DbSignature) -> Result<Self, Self::Error> {
        Ok(SignatureResponse {
            kind: row.kind()?,
            aspect_ratio: row.aspect_ratio(),
            image_url: format!("/api/signatures/{}/image", row.id),
            id: row.id,
            display_name: row.display_name,
            width: row.width,
            height: row.height,
            is_active: row.is_active,
            is_default: row.is_default,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub original_filename: String,
    pub page_count: i64,
    pub uploaded_by: String,
    pub client: Option<String>,
    pub work: Option<String>,
    pub document_type: Option<String>,
    pub comment: Option<String>,
    pub status: DocumentStatus,
    pub has_placements: bool,
    pub signed_file_name: Option<String>,
    pub signed_by: Option<String>,
    pub signing_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub signed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbDocument> for DocumentResponse {
    type Error = anyhow::Error;

    fn try_from(row: DbDocument) -> Result<Self, Self::Error> {
        Ok(DocumentResponse {
            status: row.status()?,
            has_placements: row.placements_json.is_some(),
            id: row.id,
            original_filename: row.original_filename,
            page_count: row.page_count,
            uploaded_by: row.uploaded_by,
            client: row.client,
            work: row.work,
            document_type: row.document_type,
            comment: row.comment,
            signed_file_name: row.signed_file_name,
            signed_by: row.signed_by,
            signing_method: row.signing_method,
            created_at: row.created_at,
            signed_at: row.signed_at,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub pending: Vec<DocumentResponse>,
    pub signed: Vec<DocumentResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlacementsResponse {
    pub positions: Vec<PlacementRequest>,
}

#[derive(Debug, Serialize)]
pub struct SkippedPlacement {
    pub index: usize,
    pub page: u32,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct SignResponse {
    pub success: bool,
    pub message: String,
    pub document_id: String,
    pub signed_file_name: String,
    pub applied: usize,
    pub skipped: Vec<SkippedPlacement>,
}
