//! Property-based tests for the esign API wire formats
//!
//! Tests the placement payloads and generated names the API exchanges with
//! clients, using proptest.

use esign_core::output::signed_file_name;
use esign_core::{PlacementRequest, SignatureKind, StampOptions};
use proptest::prelude::*;

// ============================================================
// Strategies
// ============================================================

fn kind_name() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("signature"), Just("initial"), Just("company")]
}

/// Strings that are not a placement kind
fn bogus_kind() -> impl Strategy<Value = String> {
    "[a-z]{1,12}".prop_filter("Must not be a real kind", |s| {
        !matches!(s.as_str(), "signature" | "initial" | "company")
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ============================================================
    // Placement payload tests
    // ============================================================

    #[test]
    fn placement_without_kind_is_a_signature(
        page in 0u32..500,
        x in 0.0f64..1000.0,
        y in 0.0f64..1000.0
    ) {
        let json = format!(r#"{{"page":{},"x":{},"y":{}}}"#, page, x, y);
        let placement: PlacementRequest = serde_json::from_str(&json).unwrap();

        prop_assert_eq!(placement.kind, SignatureKind::Signature);
        prop_assert_eq!(placement.page, page);
        prop_assert!(placement.asset_id.is_none());
    }

    #[test]
    fn editor_type_field_selects_kind(kind in kind_name()) {
        let json = format!(r#"{{"page":0,"x":1,"y":2,"type":"{}"}}"#, kind);
        let placement: PlacementRequest = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(placement.kind.as_str(), kind);
    }

    #[test]
    fn unknown_kinds_are_rejected(kind in bogus_kind()) {
        let json = format!(r#"{{"page":0,"x":1,"y":2,"type":"{}"}}"#, kind);
        prop_assert!(serde_json::from_str::<PlacementRequest>(&json).is_err());
        prop_assert!(kind.parse::<SignatureKind>().is_err());
    }

    #[test]
    fn placements_without_size_use_default_box(
        width in 10.0f64..400.0,
        height in 10.0f64..200.0
    ) {
        let options = StampOptions {
            default_box_width: width,
            default_box_height: height,
            ..StampOptions::default()
        };
        let placement = PlacementRequest::new(0, 0.0, 0.0, SignatureKind::Signature);
        prop_assert_eq!(placement.box_size(&options), (width, height));
    }

    #[test]
    fn missing_page_is_rejected(x in 0.0f64..1000.0, y in 0.0f64..1000.0) {
        let json = format!(r#"{{"x":{},"y":{}}}"#, x, y);
        prop_assert!(serde_json::from_str::<PlacementRequest>(&json).is_err());
    }
}

// ============================================================
// Unit Tests (non-property)
// ============================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_signed_file_names_are_opaque_tokens() {
        let pattern = regex::Regex::new(r"^signed_[0-9a-f]{32}\.pdf$").unwrap();
        for _ in 0..20 {
            let name = signed_file_name();
            assert!(pattern.is_match(&name), "unexpected name {}", name);
        }
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in [
            SignatureKind::Signature,
            SignatureKind::Initial,
            SignatureKind::Company,
        ] {
            assert_eq!(kind.as_str().parse::<SignatureKind>(), Ok(kind));
        }
    }
}
