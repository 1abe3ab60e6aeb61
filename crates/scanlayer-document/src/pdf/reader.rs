// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — open a source document and inspect its pages (geometry,
// rotation, extractable text, metadata, outline) using the `lopdf` crate.

use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};
use scanlayer_core::PageSize;
use scanlayer_core::error::{Result, ScanlayerError};
use tracing::{debug, info, instrument, warn};

use super::outline::{self, OutlineEntry};

/// Guard against malformed page trees whose /Parent chain loops.
const MAX_TREE_DEPTH: usize = 64;

/// US Letter, used when a page tree carries no /MediaBox at all.
const FALLBACK_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Geometry of one source page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageInfo {
    /// 0-based position in the document.
    pub index: usize,
    /// 1-based page number (lopdf keys pages this way).
    pub number: u32,
    pub object_id: ObjectId,
    /// Normalised `[x0, y0, x1, y1]` with `x0 <= x1`, `y0 <= y1`.
    pub media_box: [f64; 4],
    /// Clockwise display rotation, one of 0, 90, 180, 270.
    pub rotation: i64,
    /// Size as displayed, i.e. after applying `rotation`.
    pub size: PageSize,
}

impl PageInfo {
    pub fn is_rotated(&self) -> bool {
        self.rotation != 0
    }
}

/// A source PDF held open for the duration of one pipeline invocation.
///
/// Wraps `lopdf::Document` and exposes only read operations; nothing in the
/// pipeline mutates the source.
pub struct SourceDocument {
    /// The underlying lopdf document.
    document: Document,
    /// Source path, if opened from a file (needed by file-based renderers).
    source_path: Option<PathBuf>,
    /// Page object ids in document order.
    page_ids: Vec<ObjectId>,
}

impl SourceDocument {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let document = Document::load(path_ref).map_err(|err| {
            ScanlayerError::PdfError(format!("failed to open {}: {}", path_ref.display(), err))
        })?;

        Ok(Self::from_document(document, Some(path_ref.to_path_buf())))
    }

    /// Create a source document from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            ScanlayerError::PdfError(format!("failed to load PDF from memory: {}", err))
        })?;
        Ok(Self::from_document(document, None))
    }

    /// Wrap an already-parsed document.
    pub fn from_document(document: Document, source_path: Option<PathBuf>) -> Self {
        // lopdf pages are keyed by 1-indexed page number, already in order.
        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        debug!(pages = page_ids.len(), "PDF loaded");
        Self {
            document,
            source_path,
            page_ids,
        }
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Return the source path if the document was opened via [`SourceDocument::open`].
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Borrow the underlying lopdf document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Geometry of the page at `index` (0-based).
    pub fn page(&self, index: usize) -> Result<PageInfo> {
        let object_id = *self.page_ids.get(index).ok_or_else(|| {
            ScanlayerError::PdfError(format!(
                "page index {} out of range (document has {} pages)",
                index,
                self.page_ids.len()
            ))
        })?;

        let media_box = match inherited_attribute(&self.document, object_id, b"MediaBox") {
            Some(obj) => rectangle(&self.document, obj).ok_or_else(|| {
                ScanlayerError::PdfError(format!("page {} has a malformed /MediaBox", index + 1))
            })?,
            None => {
                warn!(page = index + 1, "Page has no /MediaBox, assuming US Letter");
                FALLBACK_MEDIA_BOX
            }
        };

        let raw_rotation = inherited_attribute(&self.document, object_id, b"Rotate")
            .and_then(|obj| number(&self.document, obj))
            .unwrap_or(0.0) as i64;
        let rotation = normalise_rotation(raw_rotation);
        if rotation != raw_rotation.rem_euclid(360) {
            warn!(page = index + 1, raw_rotation, "Rotation is not a multiple of 90, ignoring");
        }

        let width = media_box[2] - media_box[0];
        let height = media_box[3] - media_box[1];
        let size = if rotation % 180 == 0 {
            PageSize::new(width, height)
        } else {
            PageSize::new(height, width)
        };
        if !size.is_valid() {
            return Err(ScanlayerError::PdfError(format!(
                "page {} has an empty media box {:?}",
                index + 1,
                media_box
            )));
        }

        Ok(PageInfo {
            index,
            number: index as u32 + 1,
            object_id,
            media_box,
            rotation,
            size,
        })
    }

    /// Extractable text of the page at `index` (0-based).
    pub fn page_text(&self, index: usize) -> Result<String> {
        let number = index as u32 + 1;
        self.document.extract_text(&[number]).map_err(|err| {
            ScanlayerError::PdfError(format!("text extraction failed on page {}: {}", number, err))
        })
    }

    /// The document information dictionary (/Info), if any.
    pub fn metadata(&self) -> Option<&Dictionary> {
        let info = self.document.trailer.get(b"Info").ok()?;
        self.document
            .dereference(info)
            .ok()
            .and_then(|(_, obj)| obj.as_dict().ok())
    }

    /// Flattened table of contents.
    pub fn outline(&self) -> Vec<OutlineEntry> {
        outline::read_outline(&self.document, &self.page_ids)
    }

    /// Serialise the document, for renderers that need a file of their own.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut copy = self.document.clone();
        let mut output = Vec::new();
        copy.save_to(&mut output).map_err(|err| {
            ScanlayerError::PdfError(format!("failed to serialise source PDF: {}", err))
        })?;
        Ok(output)
    }
}

// -- Helpers ------------------------------------------------------------------

/// Look up a page attribute, following /Parent for inheritable keys
/// (/MediaBox, /Rotate, /Resources, /CropBox).
pub(crate) fn inherited_attribute<'a>(
    document: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return document.dereference(value).ok().map(|(_, obj)| obj);
        }
        let parent_id = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = document.get_dictionary(parent_id).ok()?;
    }
    None
}

/// Read a numeric object, following a reference if needed.
pub(crate) fn number(document: &Document, object: &Object) -> Option<f64> {
    match document.dereference(object).ok()?.1 {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(*value as f64),
        _ => None,
    }
}

/// Parse a PDF rectangle into normalised `[x0, y0, x1, y1]`.
pub(crate) fn rectangle(document: &Document, object: &Object) -> Option<[f64; 4]> {
    let array = document.dereference(object).ok()?.1.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let mut values = [0.0f64; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = number(document, item)?;
    }
    Some([
        values[0].min(values[2]),
        values[1].min(values[3]),
        values[0].max(values[2]),
        values[1].max(values[3]),
    ])
}

/// Map any /Rotate value onto 0, 90, 180 or 270. Values that are not a
/// multiple of 90 are invalid PDF and treated as 0.
fn normalise_rotation(raw: i64) -> i64 {
    let rotation = raw.rem_euclid(360);
    if rotation % 90 == 0 { rotation } else { 0 }
}
