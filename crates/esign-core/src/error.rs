use thiserror::Error;

#[derive(Error, Debug)]
pub enum StampError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to read source PDF: {0}")]
    SourceDocument(String),

    #[error("Failed to write signed PDF: {0}")]
    OutputWrite(String),

    #[error("Signature asset storage failed: {0}")]
    Asset(String),
}

/// Why a placement was left out of a stamping job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingAssetId,
    UnknownAsset(String),
    PageOutOfRange { page_count: u32 },
    UnreadableAsset(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingAssetId => write!(f, "no asset id"),
            SkipReason::UnknownAsset(id) => write!(f, "unknown asset {}", id),
            SkipReason::PageOutOfRange { page_count } => {
                write!(f, "page out of range (document has {} pages)", page_count)
            }
            SkipReason::UnreadableAsset(msg) => write!(f, "unreadable asset: {}", msg),
        }
    }
}

/// Non-fatal: the placement is skipped and the job continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Placement {index} on page {page} skipped: {reason}")]
pub struct UnresolvedPlacement {
    /// Position of the placement in the request list
    pub index: usize,
    /// Zero-based page index as requested
    pub page: u32,
    pub reason: SkipReason,
}
