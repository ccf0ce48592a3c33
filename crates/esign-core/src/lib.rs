//! Signature stamping for the esign service
//!
//! Two steps, used independently:
//! - `normalize`: turn an uploaded signature image into a transparent,
//!   tightly cropped PNG asset (once per upload)
//! - `stamp`: draw assets onto a source PDF at the requested placements and
//!   produce a new PDF (once per signing)
//!
//! The engine never resolves "which signature to use"; callers pass a
//! ready-made [`AssetLookup`].

pub mod error;
pub mod geometry;
pub mod normalize;
pub mod output;
pub mod placement;
pub mod stamp;

pub use error::{SkipReason, StampError, UnresolvedPlacement};
pub use geometry::{DrawRect, SignatureKind};
pub use normalize::{aspect_ratio, normalize, probe_aspect_ratio, AssetStore, StoredAsset};
pub use output::{write_signed_pdf, SignedArtifact};
pub use placement::{AppliedPlacement, AssetLookup, AssetSource, PlacementRequest, StampOptions};
pub use stamp::{stamp_document, stamp_file, SignedDocument, StampReport, StampedPdf};

/// Parse PDF bytes and return page count
pub fn page_count(bytes: &[u8]) -> Result<u32, StampError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| StampError::SourceDocument(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count_rejects_non_pdf() {
        assert!(matches!(
            page_count(b"hello"),
            Err(StampError::SourceDocument(_))
        ));
    }

    #[test]
    fn test_placement_list_deserializes() {
        let json = r#"[
            {"page":0,"x":10,"y":20,"type":"signature","signatureId":"a"},
            {"page":2,"x":30,"y":40,"width":60,"height":25,"type":"company"}
        ]"#;
        let placements: Vec<PlacementRequest> = serde_json::from_str(json).unwrap();
        assert_eq!(placements.len(), 2);
        assert_eq!(placements[1].kind, SignatureKind::Company);
        assert_eq!(placements[1].asset_id, None);
    }
}
