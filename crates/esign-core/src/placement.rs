//! Placement requests and asset lookup
//!
//! A placement is one requested stamp: page, position, size, kind and the
//! asset to draw there. Assets are resolved through an [`AssetLookup`] the
//! caller fills in before the job runs.

use crate::geometry::{DrawRect, SignatureKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::PathBuf;

/// Fallbacks used when a placement or asset does not carry its own values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StampOptions {
    pub default_box_width: f64,
    pub default_box_height: f64,
    /// Aspect ratio assumed when the lookup cannot report one (150:50)
    pub fallback_aspect_ratio: f64,
}

impl Default for StampOptions {
    fn default() -> Self {
        Self {
            default_box_width: 150.0,
            default_box_height: 50.0,
            fallback_aspect_ratio: 3.0,
        }
    }
}

/// One requested stamp location.
///
/// `y` is measured from the top of the page, the way the placement editor
/// reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRequest {
    /// Zero-based page index
    pub page: u32,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default, alias = "type")]
    pub kind: SignatureKind,
    #[serde(default, alias = "signatureId")]
    pub asset_id: Option<String>,
}

impl PlacementRequest {
    pub fn new(page: u32, x: f64, y: f64, kind: SignatureKind) -> Self {
        Self {
            page,
            x,
            y,
            width: None,
            height: None,
            kind,
            asset_id: None,
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_asset(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }

    /// Requested box size, before the kind's clamp. A missing, non-finite or
    /// non-positive dimension falls back to the default box.
    pub fn box_size(&self, options: &StampOptions) -> (f64, f64) {
        let usable = |v: Option<f64>| v.filter(|v| v.is_finite() && *v > 0.0);
        (
            usable(self.width).unwrap_or(options.default_box_width),
            usable(self.height).unwrap_or(options.default_box_height),
        )
    }
}

/// Where a resolved asset lives and its stored aspect ratio.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSource {
    pub path: PathBuf,
    pub aspect_ratio: Option<f64>,
}

impl AssetSource {
    pub fn new(path: impl Into<PathBuf>, aspect_ratio: Option<f64>) -> Self {
        Self {
            path: path.into(),
            aspect_ratio,
        }
    }
}

/// Resolves an asset id to its bitmap.
///
/// Implementations must not care about active/default flags; any asset the
/// caller chose to expose is drawable.
pub trait AssetLookup {
    fn resolve(&self, asset_id: &str) -> Option<&AssetSource>;
}

impl<S: BuildHasher> AssetLookup for HashMap<String, AssetSource, S> {
    fn resolve(&self, asset_id: &str) -> Option<&AssetSource> {
        self.get(asset_id)
    }
}

/// A placement that made it onto the page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedPlacement {
    pub index: usize,
    pub page: u32,
    pub kind: SignatureKind,
    pub asset_id: String,
    /// Drawn rectangle in bottom-origin page space
    pub rect: DrawRect,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deserializes_editor_payload() {
        let json = r#"{"page":1,"x":100,"y":200,"type":"initial","signatureId":"abc"}"#;
        let placement: PlacementRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            placement,
            PlacementRequest::new(1, 100.0, 200.0, SignatureKind::Initial).with_asset("abc")
        );
    }

    #[test]
    fn test_kind_defaults_to_signature_when_absent() {
        let json = r#"{"page":0,"x":1.5,"y":2.5,"width":120,"height":40}"#;
        let placement: PlacementRequest = serde_json::from_str(json).unwrap();
        assert_eq!(placement.kind, SignatureKind::Signature);
        assert_eq!(placement.asset_id, None);
        assert_eq!(placement.box_size(&StampOptions::default()), (120.0, 40.0));
    }

    #[test]
    fn test_missing_size_uses_fallback_box() {
        let placement = PlacementRequest::new(0, 0.0, 0.0, SignatureKind::Company);
        assert_eq!(placement.box_size(&StampOptions::default()), (150.0, 50.0));
    }

    #[test]
    fn test_unusable_size_uses_fallback_box() {
        let options = StampOptions::default();
        let negative = PlacementRequest::new(0, 0.0, 0.0, SignatureKind::Signature)
            .with_size(-150.0, -50.0);
        assert_eq!(negative.box_size(&options), (150.0, 50.0));

        let mixed = PlacementRequest::new(0, 0.0, 0.0, SignatureKind::Signature)
            .with_size(f64::NAN, 30.0);
        assert_eq!(mixed.box_size(&options), (150.0, 30.0));

        let zero = PlacementRequest::new(0, 0.0, 0.0, SignatureKind::Signature)
            .with_size(0.0, f64::INFINITY);
        assert_eq!(zero.box_size(&options), (150.0, 50.0));
    }

    #[test]
    fn test_hashmap_lookup() {
        let mut assets = HashMap::new();
        assets.insert(
            "sig-1".to_string(),
            AssetSource::new("/tmp/sig-1.png", Some(2.5)),
        );
        assert_eq!(assets.resolve("sig-1").unwrap().aspect_ratio, Some(2.5));
        assert!(assets.resolve("sig-2").is_none());
    }
}
