// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — reading source documents, assembling output documents, and
// carrying the table of contents across.

pub mod outline;
pub mod reader;
pub mod writer;

pub use outline::OutlineEntry;
pub use reader::{PageInfo, SourceDocument};
pub use writer::OutputDocument;

use lopdf::Object;

/// A PDF real number. lopdf stores reals at reduced precision, which is ample
/// for page coordinates.
pub(crate) fn real(value: f64) -> Object {
    Object::Real(value as _)
}
