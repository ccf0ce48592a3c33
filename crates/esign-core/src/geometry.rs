//! Placement geometry
//!
//! Turns a requested box (top-origin editor space) into the rectangle an
//! asset is actually drawn at (bottom-origin PDF space).

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Classification of a signature asset and of the placements that draw it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureKind {
    #[default]
    Signature,
    Initial,
    Company,
}

impl SignatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureKind::Signature => "signature",
            SignatureKind::Initial => "initial",
            SignatureKind::Company => "company",
        }
    }

    /// Largest box (width, height) in points a placement of this kind may use.
    pub fn max_box(&self) -> Option<(f64, f64)> {
        match self {
            SignatureKind::Signature => None,
            SignatureKind::Initial => Some((80.0, 35.0)),
            SignatureKind::Company => Some((200.0, 60.0)),
        }
    }

    /// Apply the kind's maximum box to a requested size
    pub fn clamp_box(&self, width: f64, height: f64) -> (f64, f64) {
        match self.max_box() {
            Some((max_w, max_h)) => (width.min(max_w), height.min(max_h)),
            None => (width, height),
        }
    }
}

impl std::fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signature" => Ok(SignatureKind::Signature),
            "initial" => Ok(SignatureKind::Initial),
            "company" => Ok(SignatureKind::Company),
            other => Err(format!("Unknown signature kind: {}", other)),
        }
    }
}

/// A rectangle in PDF points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Size an asset is drawn at inside a (clamped) box.
///
/// Initials keep their native pixel size unless the box is smaller; the
/// other kinds are fitted to the box with their aspect ratio preserved.
pub fn fit_to_box(
    kind: SignatureKind,
    box_width: f64,
    box_height: f64,
    aspect_ratio: f64,
    native: (u32, u32),
) -> (f64, f64) {
    match kind {
        SignatureKind::Initial => {
            let (img_w, img_h) = (native.0 as f64, native.1 as f64);
            if img_w <= 0.0 || img_h <= 0.0 {
                return (box_width, box_height);
            }
            let scale = (box_width / img_w).min(box_height / img_h).min(1.0);
            (img_w * scale, img_h * scale)
        }
        SignatureKind::Signature | SignatureKind::Company => {
            let box_aspect = if box_height > 0.0 {
                box_width / box_height
            } else {
                1.0
            };
            if aspect_ratio > box_aspect {
                (box_width, box_width / aspect_ratio)
            } else {
                (box_height * aspect_ratio, box_height)
            }
        }
    }
}

/// Compute the final drawing rectangle for one placement.
///
/// `x`/`y` is the top-left corner of the requested box with `y` measured from
/// the top of the page; the result is centered in the clamped box and
/// expressed in bottom-origin page space.
pub fn placement_rect(
    kind: SignatureKind,
    x: f64,
    y: f64,
    requested: (f64, f64),
    page_height: f64,
    aspect_ratio: f64,
    native: (u32, u32),
) -> DrawRect {
    // A negative box would flip the drawing
    let non_negative = |v: f64| if v.is_finite() { v.max(0.0) } else { 0.0 };
    let (box_w, box_h) = kind.clamp_box(non_negative(requested.0), non_negative(requested.1));
    let (width, height) = fit_to_box(kind, box_w, box_h, aspect_ratio, native);

    let x_offset = (box_w - width) / 2.0;
    let y_offset = (box_h - height) / 2.0;

    DrawRect {
        x: x + x_offset,
        y: page_height - y - box_h + y_offset,
        width,
        height,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn fitted_kind() -> impl Strategy<Value = SignatureKind> {
        prop_oneof![Just(SignatureKind::Signature), Just(SignatureKind::Company)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn fitted_kinds_preserve_aspect_ratio(
            kind in fitted_kind(),
            box_w in 1.0f64..600.0,
            box_h in 1.0f64..300.0,
            aspect in 0.05f64..20.0,
        ) {
            let (bw, bh) = kind.clamp_box(box_w, box_h);
            let (w, h) = fit_to_box(kind, bw, bh, aspect, (100, 100));
            prop_assert!(((w / h) - aspect).abs() / aspect < 1e-9);
            prop_assert!(w <= bw + 1e-9);
            prop_assert!(h <= bh + 1e-9);
        }

        #[test]
        fn initials_never_exceed_native_size(
            box_w in 1.0f64..500.0,
            box_h in 1.0f64..500.0,
            img_w in 1u32..400,
            img_h in 1u32..400,
        ) {
            let (bw, bh) = SignatureKind::Initial.clamp_box(box_w, box_h);
            let (w, h) = fit_to_box(SignatureKind::Initial, bw, bh, 1.0, (img_w, img_h));
            prop_assert!(w <= img_w as f64 + 1e-9);
            prop_assert!(h <= img_h as f64 + 1e-9);
            prop_assert!(w <= bw + 1e-9);
            prop_assert!(h <= bh + 1e-9);
        }

        #[test]
        fn drawn_rect_stays_centered_in_box(
            kind in fitted_kind(),
            x in 0.0f64..500.0,
            y in 0.0f64..700.0,
            box_w in 1.0f64..200.0,
            box_h in 1.0f64..60.0,
            aspect in 0.1f64..10.0,
        ) {
            let (bw, bh) = kind.clamp_box(box_w, box_h);
            let rect = placement_rect(kind, x, y, (box_w, box_h), 792.0, aspect, (10, 10));
            let left = rect.x - x;
            let right = (x + bw) - (rect.x + rect.width);
            let bottom = rect.y - (792.0 - y - bh);
            let top = (792.0 - y) - (rect.y + rect.height);
            prop_assert!((left - right).abs() < 1e-6);
            prop_assert!((top - bottom).abs() < 1e-6);
        }
    }
}
