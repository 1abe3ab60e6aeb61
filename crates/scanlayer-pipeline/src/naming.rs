// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output file naming.

use std::path::{Path, PathBuf};

/// True for a `.pdf` extension in any case.
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Whether a file name marks a previous run's output.
pub fn is_processed_name(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(suffix))
}

/// `<dir>/<stem><suffix>.pdf` beside the input.
pub fn output_path_for(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    input.with_file_name(format!("{}{}.pdf", stem, suffix))
}

/// Per-page file for split mode: `<stem>_pNN.pdf` next to the merged name.
///
/// Page numbers are 1-based and zero-padded to two digits, or wider when the
/// document has 100 pages or more so names still sort in page order.
pub fn split_page_path(merged_output: &Path, page_number: u32, page_count: usize) -> PathBuf {
    let width = page_count.to_string().len().max(2);
    let stem = merged_output
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    merged_output.with_file_name(format!("{}_p{:0width$}.pdf", stem, page_number, width = width))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_sits_beside_input() {
        assert_eq!(
            output_path_for(Path::new("/scans/invoice.pdf"), "_searchable"),
            PathBuf::from("/scans/invoice_searchable.pdf")
        );
        assert_eq!(
            output_path_for(Path::new("Brief.PDF"), "_searchable"),
            PathBuf::from("Brief_searchable.pdf")
        );
    }

    #[test]
    fn split_names_are_zero_padded() {
        let merged = Path::new("/scans/invoice_searchable.pdf");
        assert_eq!(
            split_page_path(merged, 1, 5),
            PathBuf::from("/scans/invoice_searchable_p01.pdf")
        );
        assert_eq!(
            split_page_path(merged, 12, 12),
            PathBuf::from("/scans/invoice_searchable_p12.pdf")
        );
    }

    #[test]
    fn split_names_widen_for_long_documents() {
        let merged = Path::new("book_searchable.pdf");
        assert_eq!(split_page_path(merged, 7, 250), PathBuf::from("book_searchable_p007.pdf"));
    }

    #[test]
    fn pdf_detection_ignores_case() {
        assert!(is_pdf(Path::new("a.pdf")));
        assert!(is_pdf(Path::new("a.PdF")));
        assert!(!is_pdf(Path::new("a.pdf.txt")));
        assert!(!is_pdf(Path::new("pdf")));
    }

    #[test]
    fn processed_names_are_recognised() {
        assert!(is_processed_name(Path::new("x_searchable.pdf"), "_searchable"));
        assert!(is_processed_name(Path::new("x_searchable_p03.pdf"), "_searchable"));
        assert!(!is_processed_name(Path::new("searchable-notes.pdf"), "_searchable"));
    }
}
