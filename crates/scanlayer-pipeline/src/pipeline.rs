// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document pipeline — one source PDF in, one searchable PDF (or one file per
// page) out. Pages are processed strictly in order: rasterize, recognise,
// compose, append.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_core::{DocumentReport, OutputMode, PipelineConfig};
use scanlayer_document::pdf::OutlineEntry;
use scanlayer_document::raster::PdftoppmRenderer;
use scanlayer_document::ocr::TesseractEngine;
use scanlayer_document::{
    ComposedPage, OcrInvoker, OutputDocument, PageCompositor, PageRasterizer, Rasterize, Recognize,
    SourceDocument,
};
use tracing::{debug, error, info, instrument, warn};

use crate::naming::split_page_path;

/// The configured per-document pipeline. Shared read-only by batch workers.
pub struct Pipeline {
    config: PipelineConfig,
    language: String,
    rasterizer: Arc<dyn Rasterize>,
    invoker: OcrInvoker,
    compositor: PageCompositor,
}

impl Pipeline {
    /// Assemble a pipeline from explicit engines.
    pub fn new(
        config: PipelineConfig,
        language: impl Into<String>,
        rasterizer: Arc<dyn Rasterize>,
        recognizer: Arc<dyn Recognize>,
    ) -> Result<Self> {
        config.validate()?;
        let language = language.into();
        if language.trim().is_empty() {
            return Err(ScanlayerError::Config("OCR language must not be empty".into()));
        }
        Ok(Self {
            invoker: OcrInvoker::new(recognizer, config.fallback_language.clone()),
            compositor: PageCompositor::from_config(&config),
            config,
            language,
            rasterizer,
        })
    }

    /// Locate `tesseract` and `pdftoppm` and pick the OCR language.
    ///
    /// A missing binary is an environment error, reported before any
    /// document is touched.
    #[instrument(skip_all)]
    pub fn with_system_engines(config: PipelineConfig) -> Result<Self> {
        let tesseract = TesseractEngine::locate(config.tesseract_cmd.as_deref())?;
        let renderer = PdftoppmRenderer::locate(config.pdftoppm_cmd.as_deref())?;
        info!(
            tesseract = %tesseract.command().display(),
            pdftoppm = %renderer.command().display(),
            "OCR engines located"
        );
        let language = match &config.language {
            Some(language) => language.clone(),
            None => tesseract.best_language(),
        };
        let rasterizer = PageRasterizer::new(Arc::new(renderer), config.use_embedded_images);
        Self::new(config, language, Arc::new(rasterizer), Arc::new(tesseract))
    }

    /// Like [`Pipeline::with_system_engines`] but recognising with the
    /// in-process `ocrs` models found in `model_dir` (or the default cache).
    #[cfg(feature = "ocr")]
    #[instrument(skip_all)]
    pub fn with_ocrs_engine(config: PipelineConfig, model_dir: Option<&Path>) -> Result<Self> {
        use scanlayer_document::OcrsEngine;
        use scanlayer_document::ocr::ocrs_engine::OcrsModels;

        let models = model_dir.map(OcrsModels::from_dir).unwrap_or_default();
        let engine = OcrsEngine::new(models)?;
        let renderer = PdftoppmRenderer::locate(config.pdftoppm_cmd.as_deref())?;
        let rasterizer = PageRasterizer::new(Arc::new(renderer), config.use_embedded_images);
        let language = config.effective_language().to_string();
        Self::new(config, language, Arc::new(rasterizer), Arc::new(engine))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The OCR language hint used for every page.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Run the pipeline over `input`, writing `output` (merged) or the
    /// per-page files derived from it (split).
    ///
    /// Never panics and never returns an error: failures are captured in the
    /// report, and no output file is left behind for a failed document.
    #[instrument(skip(self), fields(input = %input.display()))]
    pub fn process_document(&self, input: &Path, output: &Path) -> DocumentReport {
        let started = Instant::now();
        let mut report = DocumentReport::started(input);

        let result = match self.config.output_mode {
            OutputMode::Merged => self.run_merged(input, output, &mut report),
            OutputMode::Split => self.run_split(input, output, &mut report),
        };

        report.elapsed = started.elapsed();
        match result {
            Ok(outputs) => {
                info!(
                    pages = report.pages,
                    outputs = outputs.len(),
                    fallback_pages = ?report.fallback_pages,
                    skipped_spans = report.skipped_spans,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Document processed"
                );
                report.success = true;
                report.outputs = outputs;
            }
            Err(err) => {
                error!(%err, class = ?err.class(), "Document failed");
                report.error = Some(err.to_string());
            }
        }
        report
    }

    fn open(&self, input: &Path, report: &mut DocumentReport) -> Result<SourceDocument> {
        let source = SourceDocument::open(input)?;
        if source.page_count() == 0 {
            return Err(ScanlayerError::PdfError("document has no pages".into()));
        }
        report.pages = source.page_count();
        Ok(source)
    }

    fn run_merged(&self, input: &Path, output: &Path, report: &mut DocumentReport) -> Result<Vec<PathBuf>> {
        let source = self.open(input, report)?;
        let mut document = OutputDocument::new();
        for index in 0..source.page_count() {
            let page = self.process_page(&source, index, report)?;
            document.add_page(page)?;
        }
        document.copy_metadata(&source);
        document.copy_outline(&source.outline())?;
        document.save(output)?;
        Ok(vec![output.to_path_buf()])
    }

    fn run_split(&self, input: &Path, output: &Path, report: &mut DocumentReport) -> Result<Vec<PathBuf>> {
        let source = self.open(input, report)?;
        let outline = source.outline();
        let mut written = Vec::with_capacity(source.page_count());

        let result = (|| -> Result<()> {
            for index in 0..source.page_count() {
                let page = self.process_page(&source, index, report)?;
                let mut document = OutputDocument::new();
                document.add_page(page)?;
                document.copy_metadata(&source);
                document.copy_outline(&page_outline(&outline, index))?;

                let path = split_page_path(output, index as u32 + 1, source.page_count());
                document.save(&path)?;
                debug!(path = %path.display(), "Page file written");
                written.push(path);
            }
            Ok(())
        })();

        if let Err(err) = result {
            for path in &written {
                if let Err(remove_err) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), %remove_err, "Could not remove partial page file");
                }
            }
            return Err(err);
        }
        Ok(written)
    }

    #[instrument(skip(self, source, report), fields(page = index + 1))]
    fn process_page(&self, source: &SourceDocument, index: usize, report: &mut DocumentReport) -> Result<ComposedPage> {
        let page = source.page(index)?;
        let raster = self.rasterizer.rasterize(source, &page, self.config.ocr_dpi)?;
        let recognition = self.invoker.invoke(
            &raster,
            &self.language,
            self.compositor.strategy().ocr_format(),
        )?;
        if recognition.fell_back {
            report.fallback_pages.push(page.number);
        }
        let composed = self.compositor.compose(&page, raster, recognition.result)?;
        report.skipped_spans += composed.skipped_spans();
        debug!(language = %recognition.language, "Page composed");
        Ok(composed)
    }
}

/// Outline entries targeting one page, re-pointed at page 0 of its own file.
fn page_outline(entries: &[OutlineEntry], index: usize) -> Vec<OutlineEntry> {
    entries
        .iter()
        .filter(|entry| entry.page_index == Some(index))
        .map(|entry| OutlineEntry::new(1, entry.title.clone(), Some(0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanlayer_core::CompositionStrategy;
    use scanlayer_document::detect::is_searchable;
    use scanlayer_core::{DetectionMode, PageSize};
    use scanlayer_document::testing::{FakeRasterizer, PageFixture, PdfFixture, ScriptedRecognizer};

    fn config(strategy: CompositionStrategy, mode: OutputMode) -> PipelineConfig {
        PipelineConfig {
            ocr_dpi: 72,
            strategy,
            output_mode: mode,
            ..PipelineConfig::default()
        }
    }

    fn pipeline(config: PipelineConfig, recognizer: Arc<ScriptedRecognizer>) -> Pipeline {
        let rasterizer: Arc<dyn Rasterize> = Arc::new(FakeRasterizer::default());
        Pipeline::new(config, "eng+deu", rasterizer, recognizer).unwrap()
    }

    fn scanned_pdf(dir: &Path, name: &str, pages: usize) -> PathBuf {
        let path = dir.join(name);
        let mut fixture = PdfFixture::new().title("Scan");
        for _ in 0..pages {
            fixture = fixture.page(PageFixture::blank(595.0, 842.0).image(60, 85));
        }
        fixture.write_to(&path);
        path
    }

    #[test]
    fn a4_scan_becomes_searchable_at_the_same_size() {
        let dir = tempfile::tempdir().unwrap();
        let input = scanned_pdf(dir.path(), "scan.pdf", 1);
        let output = dir.path().join("scan_searchable.pdf");
        assert!(!is_searchable(&input, DetectionMode::EarlyStop));

        let recognizer = Arc::new(
            ScriptedRecognizer::default().with_text("Kontoauszug Nummer 17 vom 3. Maerz, Seite eins von eins"),
        );
        let pipeline = pipeline(
            config(CompositionStrategy::RecomposeOptimized, OutputMode::Merged),
            recognizer,
        );
        let report = pipeline.process_document(&input, &output);

        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.outputs, vec![output.clone()]);
        assert_eq!(report.pages, 1);
        assert_eq!(report.skipped_spans, 0);

        let result = SourceDocument::open(&output).unwrap();
        assert_eq!(result.page_count(), 1);
        assert_eq!(result.page(0).unwrap().size, PageSize::new(595.0, 842.0));
        assert!(result.page_text(0).unwrap().contains("Kontoauszug"));
        assert!(is_searchable(&output, DetectionMode::EarlyStop));
    }

    #[test]
    fn output_size_does_not_depend_on_dpi() {
        let dir = tempfile::tempdir().unwrap();
        let input = scanned_pdf(dir.path(), "scan.pdf", 1);

        for strategy in [CompositionStrategy::PassThrough, CompositionStrategy::RecomposeOptimized] {
            for dpi in [72, 150, 300] {
                let output = dir.path().join(format!("scan_{:?}_{}.pdf", strategy, dpi));
                let pipeline = pipeline(
                    PipelineConfig {
                        ocr_dpi: dpi,
                        ..config(strategy, OutputMode::Merged)
                    },
                    Arc::new(ScriptedRecognizer::default()),
                );
                let report = pipeline.process_document(&input, &output);
                assert!(report.success, "{:?} @ {} dpi: {:?}", strategy, dpi, report.error);

                let result = SourceDocument::open(&output).unwrap();
                assert_eq!(
                    result.page(0).unwrap().size,
                    PageSize::new(595.0, 842.0),
                    "{:?} @ {} dpi",
                    strategy,
                    dpi
                );
                assert!(result.page_text(0).unwrap().contains(ScriptedRecognizer::DEFAULT_TEXT));
            }
        }
    }

    #[test]
    fn fallback_applies_only_to_the_failing_page() {
        let dir = tempfile::tempdir().unwrap();
        let input = scanned_pdf(dir.path(), "three.pdf", 3);
        let output = dir.path().join("three_searchable.pdf");

        // Calls: page 1 -> 0, page 2 -> 1 (fails) and 2 (fallback), page 3 -> 3.
        let recognizer = Arc::new(ScriptedRecognizer::default().language_failure_on_calls([1]));
        let pipeline = pipeline(
            config(CompositionStrategy::RecomposeOptimized, OutputMode::Merged),
            recognizer.clone(),
        );
        let report = pipeline.process_document(&input, &output);

        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.fallback_pages, vec![2]);
        assert_eq!(recognizer.languages(), vec!["eng+deu", "eng+deu", "eng", "eng+deu"]);
        assert_eq!(SourceDocument::open(&output).unwrap().page_count(), 3);
    }

    #[test]
    fn failed_fallback_fails_the_document_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = scanned_pdf(dir.path(), "bad.pdf", 2);
        let output = dir.path().join("bad_searchable.pdf");

        let recognizer = Arc::new(ScriptedRecognizer::default().language_failure_on_calls([1, 2]));
        let pipeline = pipeline(
            config(CompositionStrategy::RecomposeOptimized, OutputMode::Merged),
            recognizer.clone(),
        );
        let report = pipeline.process_document(&input, &output);

        assert!(!report.success);
        assert!(report.error.is_some());
        assert!(report.outputs.is_empty());
        assert!(!output.exists());
        assert_eq!(recognizer.calls(), 3);
    }

    #[test]
    fn split_mode_writes_one_file_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let input = scanned_pdf(dir.path(), "invoice.pdf", 5);
        let output = dir.path().join("invoice_searchable.pdf");

        let pipeline = pipeline(
            config(CompositionStrategy::RecomposeOptimized, OutputMode::Split),
            Arc::new(ScriptedRecognizer::default()),
        );
        let report = pipeline.process_document(&input, &output);

        assert!(report.success, "{:?}", report.error);
        let names: Vec<String> = report
            .outputs
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "invoice_searchable_p01.pdf",
                "invoice_searchable_p02.pdf",
                "invoice_searchable_p03.pdf",
                "invoice_searchable_p04.pdf",
                "invoice_searchable_p05.pdf",
            ]
        );
        for path in &report.outputs {
            assert_eq!(SourceDocument::open(path).unwrap().page_count(), 1);
        }
        assert!(!output.exists());
    }

    #[test]
    fn split_failure_removes_written_pages() {
        let dir = tempfile::tempdir().unwrap();
        let input = scanned_pdf(dir.path(), "doc.pdf", 3);
        let output = dir.path().join("doc_searchable.pdf");

        let recognizer = Arc::new(ScriptedRecognizer::default().engine_failure_on_calls([2]));
        let pipeline = pipeline(
            config(CompositionStrategy::RecomposeOptimized, OutputMode::Split),
            recognizer,
        );
        let report = pipeline.process_document(&input, &output);

        assert!(!report.success);
        assert!(!dir.path().join("doc_searchable_p01.pdf").exists());
        assert!(!dir.path().join("doc_searchable_p02.pdf").exists());
    }

    #[test]
    fn pass_through_keeps_page_size() {
        let dir = tempfile::tempdir().unwrap();
        let input = scanned_pdf(dir.path(), "pt.pdf", 2);
        let output = dir.path().join("pt_searchable.pdf");

        let pipeline = pipeline(
            config(CompositionStrategy::PassThrough, OutputMode::Merged),
            Arc::new(ScriptedRecognizer::default()),
        );
        let report = pipeline.process_document(&input, &output);

        assert!(report.success, "{:?}", report.error);
        let result = SourceDocument::open(&output).unwrap();
        assert_eq!(result.page_count(), 2);
        for index in 0..2 {
            let size = result.page(index).unwrap().size;
            assert!((size.width - 595.0).abs() < 0.01 && (size.height - 842.0).abs() < 0.01);
        }
        assert!(result.page_text(1).unwrap().contains(ScriptedRecognizer::DEFAULT_TEXT));
    }

    #[test]
    fn metadata_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let input = scanned_pdf(dir.path(), "meta.pdf", 1);
        let output = dir.path().join("meta_searchable.pdf");

        let pipeline = pipeline(
            config(CompositionStrategy::RecomposeOptimized, OutputMode::Merged),
            Arc::new(ScriptedRecognizer::default()),
        );
        assert!(pipeline.process_document(&input, &output).success);

        let result = SourceDocument::open(&output).unwrap();
        let title = result.metadata().unwrap().get(b"Title").unwrap();
        assert_eq!(title.as_str().unwrap(), b"Scan");
    }

    #[test]
    fn unreadable_input_is_a_document_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.pdf");
        std::fs::write(&input, b"definitely not a pdf").unwrap();

        let pipeline = pipeline(PipelineConfig::default(), Arc::new(ScriptedRecognizer::default()));
        let report = pipeline.process_document(&input, &dir.path().join("broken_searchable.pdf"));
        assert!(!report.success);
        assert!(report.error.unwrap().contains("PDF"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PipelineConfig {
            ocr_dpi: 5,
            ..PipelineConfig::default()
        };
        let rasterizer: Arc<dyn Rasterize> = Arc::new(FakeRasterizer::default());
        let result = Pipeline::new(config, "eng", rasterizer, Arc::new(ScriptedRecognizer::default()));
        assert!(matches!(result, Err(ScanlayerError::Config(_))));
    }

    #[test]
    fn split_outline_points_at_the_only_page() {
        let entries = vec![
            OutlineEntry::new(1, "Intro", Some(0)),
            OutlineEntry::new(2, "Detail", Some(1)),
            OutlineEntry::new(1, "Loose", None),
        ];
        assert_eq!(page_outline(&entries, 1), vec![OutlineEntry::new(1, "Detail", Some(0))]);
        assert!(page_outline(&entries, 4).is_empty());
    }
}
