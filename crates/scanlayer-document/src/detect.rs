// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Searchability detector — decides whether a PDF already carries enough
// extractable text that OCR would add nothing.

use std::path::Path;

use scanlayer_core::{DetectionMode, SEARCHABLE_TEXT_THRESHOLD};
use tracing::{debug, instrument, warn};

use crate::pdf::reader::SourceDocument;

/// True when `text`, trimmed, is longer than the searchability threshold.
pub fn text_is_searchable(text: &str) -> bool {
    text.trim().chars().count() > SEARCHABLE_TEXT_THRESHOLD
}

/// Open `path` and decide. Any failure to open or read counts as not
/// searchable, so a broken file is still offered to OCR.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn is_searchable(path: impl AsRef<Path>, mode: DetectionMode) -> bool {
    match SourceDocument::open(path.as_ref()) {
        Ok(document) => is_document_searchable(&document, mode),
        Err(err) => {
            warn!(%err, "Could not inspect PDF, treating as not searchable");
            false
        }
    }
}

/// Decide for an already-open document.
///
/// Text is accumulated page by page. In [`DetectionMode::EarlyStop`] reading
/// stops once the threshold is crossed; the verdict is the same either way.
pub fn is_document_searchable(document: &SourceDocument, mode: DetectionMode) -> bool {
    let mut text = String::new();
    for index in 0..document.page_count() {
        match document.page_text(index) {
            Ok(page_text) => text.push_str(&page_text),
            Err(err) => {
                warn!(%err, page = index + 1, "Text extraction failed, treating as not searchable");
                return false;
            }
        }
        if mode == DetectionMode::EarlyStop && text_is_searchable(&text) {
            debug!(pages_read = index + 1, "Searchable text found");
            return true;
        }
    }
    let searchable = text_is_searchable(&text);
    debug!(searchable, chars = text.trim().chars().count(), "Detection complete");
    searchable
}
