//! Stamp signature assets onto PDF pages
//!
//! Each page that has placements gets one overlay Form XObject sized to its
//! MediaBox. The overlay draws the asset images (RGB data plus an alpha soft
//! mask) and is painted after the page's original content, which is wrapped
//! in `q`/`Q` so its graphics state cannot leak into the overlay. Original
//! content streams are never rewritten; pages without placements are not
//! touched at all.

use crate::error::{SkipReason, StampError, UnresolvedPlacement};
use crate::geometry::{placement_rect, DrawRect};
use crate::output::{write_signed_pdf, SignedArtifact};
use crate::placement::{AppliedPlacement, AssetLookup, PlacementRequest, StampOptions};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// US Letter, used when a page tree carries no MediaBox at all
const LETTER_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Page tree depth beyond which attribute inheritance is abandoned
const MAX_TREE_DEPTH: usize = 64;

/// What happened to each placement of a job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StampReport {
    pub applied: Vec<AppliedPlacement>,
    pub skipped: Vec<UnresolvedPlacement>,
}

/// Output of [`stamp_document`].
#[derive(Debug, Clone)]
pub struct StampedPdf {
    pub bytes: Vec<u8>,
    pub report: StampReport,
}

/// Output of [`stamp_file`].
#[derive(Debug, Clone)]
pub struct SignedDocument {
    pub artifact: SignedArtifact,
    pub report: StampReport,
}

/// A placement whose asset id resolved, waiting to be drawn.
struct Resolved<'a> {
    index: usize,
    request: &'a PlacementRequest,
    asset_id: &'a str,
    path: PathBuf,
    aspect_ratio: f64,
}

/// An asset embedded in the output document.
#[derive(Clone, Copy)]
struct EmbeddedImage {
    id: ObjectId,
    width: u32,
    height: u32,
}

/// Read a PDF from disk, stamp it, and write the result under a fresh name in
/// `output_dir`. The source file is only read.
///
/// The engine holds no locks. Callers that may sign the same document from
/// two requests at once must serialize those calls themselves.
pub fn stamp_file(
    source: &Path,
    output_dir: &Path,
    placements: &[PlacementRequest],
    lookup: &impl AssetLookup,
    options: &StampOptions,
) -> Result<SignedDocument, StampError> {
    let bytes = std::fs::read(source)
        .map_err(|e| StampError::SourceDocument(format!("{}: {}", source.display(), e)))?;

    let stamped = stamp_document(&bytes, placements, lookup, options)?;
    let artifact = write_signed_pdf(output_dir, &stamped.bytes)?;

    info!(
        source = %source.display(),
        output = %artifact.file_name,
        applied = stamped.report.applied.len(),
        skipped = stamped.report.skipped.len(),
        "Signed document written"
    );

    Ok(SignedDocument {
        artifact,
        report: stamped.report,
    })
}

/// Stamp every resolvable placement onto a copy of `pdf_bytes`.
pub fn stamp_document(
    pdf_bytes: &[u8],
    placements: &[PlacementRequest],
    lookup: &impl AssetLookup,
    options: &StampOptions,
) -> Result<StampedPdf, StampError> {
    let mut doc =
        Document::load_mem(pdf_bytes).map_err(|e| StampError::SourceDocument(e.to_string()))?;

    let pages = doc.get_pages();
    let page_count = pages.len() as u32;
    let mut report = StampReport::default();

    // Resolve assets and group by page
    let mut by_page: BTreeMap<u32, Vec<Resolved>> = BTreeMap::new();
    for (index, request) in placements.iter().enumerate() {
        match resolve(index, request, lookup, page_count, options) {
            Ok(resolved) => by_page.entry(request.page).or_default().push(resolved),
            Err(skip) => {
                warn!("{}", skip);
                report.skipped.push(skip);
            }
        }
    }

    let mut embedded: HashMap<String, Result<EmbeddedImage, String>> = HashMap::new();

    for (page_index, group) in by_page {
        // get_pages() is keyed by 1-based page number
        let Some(&page_id) = pages.get(&(page_index + 1)) else {
            continue;
        };
        let [mb_x0, mb_y0, mb_x1, mb_y1] = media_box(&doc, page_id);
        let page_width = (mb_x1 - mb_x0).abs();
        let page_height = (mb_y1 - mb_y0).abs();

        let mut draws: Vec<(String, DrawRect)> = Vec::new();
        let mut images = Dictionary::new();

        for placement in group {
            let image = embedded
                .entry(placement.asset_id.to_string())
                .or_insert_with(|| embed_asset(&mut doc, &placement.path))
                .clone();

            let image = match image {
                Ok(image) => image,
                Err(msg) => {
                    let skip = UnresolvedPlacement {
                        index: placement.index,
                        page: page_index,
                        reason: SkipReason::UnreadableAsset(msg),
                    };
                    warn!("{}", skip);
                    report.skipped.push(skip);
                    continue;
                }
            };

            let request = placement.request;
            let rect = placement_rect(
                request.kind,
                request.x,
                request.y,
                request.box_size(options),
                page_height,
                placement.aspect_ratio,
                (image.width, image.height),
            );
            debug!(
                page = page_index,
                kind = %request.kind,
                x = rect.x,
                y = rect.y,
                width = rect.width,
                height = rect.height,
                "Placing asset"
            );

            let name = format!("Sig{}", image.id.0);
            images.set(name.as_bytes().to_vec(), Object::Reference(image.id));
            draws.push((name, rect));
            report.applied.push(AppliedPlacement {
                index: placement.index,
                page: page_index,
                kind: request.kind,
                asset_id: placement.asset_id.to_string(),
                rect,
            });
        }

        if draws.is_empty() {
            continue;
        }

        let overlay_id = build_overlay(
            &mut doc,
            [mb_x0.min(mb_x1), mb_y0.min(mb_y1)],
            (page_width, page_height),
            images,
            &draws,
        )?;
        merge_overlay(&mut doc, page_id, overlay_id)?;
    }

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| StampError::OutputWrite(e.to_string()))?;

    Ok(StampedPdf {
        bytes: output,
        report,
    })
}

fn resolve<'a>(
    index: usize,
    request: &'a PlacementRequest,
    lookup: &impl AssetLookup,
    page_count: u32,
    options: &StampOptions,
) -> Result<Resolved<'a>, UnresolvedPlacement> {
    let skip = |reason| UnresolvedPlacement {
        index,
        page: request.page,
        reason,
    };

    let asset_id = match request.asset_id.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => return Err(skip(SkipReason::MissingAssetId)),
    };
    let source = lookup
        .resolve(asset_id)
        .ok_or_else(|| skip(SkipReason::UnknownAsset(asset_id.to_string())))?;
    if request.page >= page_count {
        return Err(skip(SkipReason::PageOutOfRange { page_count }));
    }

    let aspect_ratio = source
        .aspect_ratio
        .filter(|a| a.is_finite() && *a > 0.0)
        .unwrap_or(options.fallback_aspect_ratio);

    Ok(Resolved {
        index,
        request,
        asset_id,
        path: source.path.clone(),
        aspect_ratio,
    })
}

/// Decode an asset and add it to the document as an image XObject with an
/// alpha soft mask.
fn embed_asset(doc: &mut Document, path: &Path) -> Result<EmbeddedImage, String> {
    let img = image::open(path)
        .map_err(|e| format!("{}: {}", path.display(), e))?
        .to_rgba8();
    let (width, height) = img.dimensions();

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in img.pixels() {
        let [r, g, b, a] = pixel.0;
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    let rgb = deflate(&rgb).map_err(|e| e.to_string())?;
    let alpha = deflate(&alpha).map_err(|e| e.to_string())?;

    let smask_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        alpha,
    ));
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
            "SMask" => Object::Reference(smask_id),
        },
        rgb,
    ));

    Ok(EmbeddedImage {
        id: image_id,
        width,
        height,
    })
}

fn deflate(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Build the page-sized overlay: one Form XObject drawing every placement.
fn build_overlay(
    doc: &mut Document,
    origin: [f64; 2],
    size: (f64, f64),
    images: Dictionary,
    draws: &[(String, DrawRect)],
) -> Result<ObjectId, StampError> {
    let mut operations = Vec::with_capacity(draws.len() * 3);
    for (name, rect) in draws {
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new(
            "cm",
            vec![
                Object::Real(rect.width as f32),
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(rect.height as f32),
                Object::Real(rect.x as f32),
                Object::Real(rect.y as f32),
            ],
        ));
        operations.push(Operation::new(
            "Do",
            vec![Object::Name(name.as_bytes().to_vec())],
        ));
        operations.push(Operation::new("Q", vec![]));
    }
    let content = Content { operations }
        .encode()
        .map_err(|e| StampError::OutputWrite(format!("Failed to encode overlay: {}", e)))?;

    let overlay = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(size.0 as f32),
                Object::Real(size.1 as f32),
            ],
            "Matrix" => vec![
                Object::Integer(1),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(1),
                Object::Real(origin[0] as f32),
                Object::Real(origin[1] as f32),
            ],
            "Resources" => dictionary! {
                "XObject" => images,
            },
        },
        content,
    );

    Ok(doc.add_object(overlay))
}

/// Paint the overlay on top of the page's existing content.
fn merge_overlay(
    doc: &mut Document,
    page_id: ObjectId,
    overlay_id: ObjectId,
) -> Result<(), StampError> {
    let (resources, overlay_name, existing) =
        page_resources_and_contents(doc, page_id, overlay_id)?;

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let paint = format!("Q\nq\n/{} Do\nQ\n", overlay_name);
    let paint_id = doc.add_object(Stream::new(Dictionary::new(), paint.into_bytes()));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(paint_id));

    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|e| StampError::SourceDocument(e.to_string()))?;
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Array(contents));

    Ok(())
}

/// Effective resources of the page with the overlay registered, plus the
/// page's current content stream references.
///
/// The resources are copied onto the page so inherited or shared
/// dictionaries used by other pages stay untouched.
fn page_resources_and_contents(
    doc: &Document,
    page_id: ObjectId,
    overlay_id: ObjectId,
) -> Result<(Dictionary, String, Vec<Object>), StampError> {
    let mut resources = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|obj| obj.as_dict().ok().cloned())
        .unwrap_or_else(Dictionary::new);
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .map(|obj| resolve_object(doc, obj))
        .and_then(|obj| obj.as_dict().ok().cloned())
        .unwrap_or_else(Dictionary::new);

    let mut suffix = 0u32;
    let overlay_name = loop {
        let candidate = format!("SigOverlay{}", suffix);
        if !xobjects.has(candidate.as_bytes()) {
            break candidate;
        }
        suffix += 1;
    };
    xobjects.set(overlay_name.as_bytes().to_vec(), Object::Reference(overlay_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| StampError::SourceDocument(e.to_string()))?;
    let existing = match page.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        _ => Vec::new(),
    };

    Ok((resources, overlay_name, existing))
}

/// MediaBox as [x0, y0, x1, y1], following inheritance through the page tree
fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let parsed = inherited_attribute(doc, page_id, b"MediaBox").and_then(|obj| {
        let items = obj.as_array().ok()?;
        if items.len() != 4 {
            return None;
        }
        let mut values = [0.0; 4];
        for (slot, item) in values.iter_mut().zip(items) {
            *slot = as_number(resolve_object(doc, item))?;
        }
        Some(values)
    });

    parsed.unwrap_or_else(|| {
        warn!(?page_id, "Page has no usable MediaBox, assuming US Letter");
        LETTER_MEDIA_BOX
    })
}

/// Look up a page attribute on the page or its ancestors, dereferenced
fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve_object(doc, value));
        }
        current = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

fn resolve_object<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    let mut current = obj;
    for _ in 0..MAX_TREE_DEPTH {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

fn as_number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(v) => Some(*v as f64),
        Object::Real(v) => Some(*v as f64),
        _ => None,
    }
}
