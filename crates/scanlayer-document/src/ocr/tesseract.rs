// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tesseract engine — drives the `tesseract` CLI. PDF output becomes a one-page
// searchable PDF for pass-through composition; TSV output is parsed into word
// spans for recomposition.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_core::{DEFAULT_OCR_LANGUAGE, OcrFormat, OcrResult};
use tracing::{debug, info, instrument, warn};

use super::Recognize;
use super::tsv::parse_tsv;
use crate::engine::find_executable;
use crate::raster::RasterImage;

#[cfg(windows)]
const INSTALL_LOCATIONS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];
#[cfg(not(windows))]
const INSTALL_LOCATIONS: &[&str] = &["/usr/bin/tesseract", "/usr/local/bin/tesseract", "/opt/homebrew/bin/tesseract"];

/// stderr fragments tesseract prints when a traineddata file is missing.
const LANGUAGE_ERROR_MARKERS: &[&str] = &[
    "Failed loading language",
    "Error opening data file",
    "Could not initialize tesseract",
];

/// The `tesseract` command-line engine.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    command: PathBuf,
}

impl TesseractEngine {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Find `tesseract` at `explicit`, on `PATH`, or in a usual install location.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        find_executable("tesseract", explicit, INSTALL_LOCATIONS).map(Self::new)
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Installed language packs, as listed by `tesseract --list-langs`.
    pub fn available_languages(&self) -> Result<Vec<String>> {
        let output = self.run(Command::new(&self.command).arg("--list-langs"))?;
        if !output.status.success() {
            return Err(ScanlayerError::OcrError(format!(
                "tesseract --list-langs failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        // Some builds print the list on stderr.
        let listing = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).to_string()
        } else {
            String::from_utf8_lossy(&output.stdout).to_string()
        };
        Ok(parse_language_list(&listing))
    }

    /// The language to use when none is configured: German and English
    /// together when both are installed, else whichever is there, else the
    /// default.
    #[instrument(skip(self))]
    pub fn best_language(&self) -> String {
        match self.available_languages() {
            Ok(languages) => {
                let chosen = best_language(&languages);
                info!(language = %chosen, "Selected OCR language");
                chosen
            }
            Err(err) => {
                warn!(%err, "Could not list OCR languages, using default");
                DEFAULT_OCR_LANGUAGE.to_string()
            }
        }
    }

    fn run(&self, command: &mut Command) -> Result<Output> {
        command.output().map_err(|err| {
            ScanlayerError::EngineUnavailable(format!(
                "failed to run {}: {}",
                self.command.display(),
                err
            ))
        })
    }

    /// Map a failed run onto a language error or a plain OCR error.
    fn failure(&self, language: &str, output: &Output) -> ScanlayerError {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if LANGUAGE_ERROR_MARKERS.iter().any(|marker| stderr.contains(marker)) {
            ScanlayerError::OcrLanguageUnsupported {
                language: language.to_string(),
                detail: stderr,
            }
        } else {
            ScanlayerError::OcrError(format!("tesseract exited with {}: {}", output.status, stderr))
        }
    }
}

impl Recognize for TesseractEngine {
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height(), dpi = image.dpi()))]
    fn recognize(&self, image: &RasterImage, language: &str, format: OcrFormat) -> Result<OcrResult> {
        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join("page.png");
        std::fs::write(&input, image.to_png_bytes()?)?;

        let mut command = Command::new(&self.command);
        command
            .arg(&input)
            // One tesseract per worker; keep it from spawning its own thread pool.
            .env("OMP_THREAD_LIMIT", "1");

        match format {
            OcrFormat::Pdf => {
                let outbase = workdir.path().join("page");
                command
                    .arg(&outbase)
                    .args(["-l", language, "--dpi"])
                    .arg(image.dpi().to_string())
                    .arg("pdf");
                let output = self.run(&mut command)?;
                if !output.status.success() {
                    return Err(self.failure(language, &output));
                }
                let pdf = std::fs::read(outbase.with_extension("pdf")).map_err(|err| {
                    ScanlayerError::OcrError(format!("tesseract wrote no PDF: {}", err))
                })?;
                debug!(bytes = pdf.len(), "OCR page PDF produced");
                Ok(OcrResult::Pdf(pdf))
            }
            OcrFormat::Spans => {
                command
                    .arg("stdout")
                    .args(["-l", language, "--dpi"])
                    .arg(image.dpi().to_string())
                    .arg("tsv");
                let output = self.run(&mut command)?;
                if !output.status.success() {
                    return Err(self.failure(language, &output));
                }
                let spans = parse_tsv(&String::from_utf8_lossy(&output.stdout));
                debug!(spans = spans.len(), "OCR spans produced");
                Ok(OcrResult::Spans(spans))
            }
        }
    }
}

/// Skip the "List of available languages ..." header line.
fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Prefer `eng+deu`, then `deu`, then the default.
pub fn best_language(available: &[String]) -> String {
    let has = |code: &str| available.iter().any(|lang| lang == code);
    if has("deu") && has("eng") {
        "eng+deu".to_string()
    } else if has("deu") {
        "deu".to_string()
    } else {
        DEFAULT_OCR_LANGUAGE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::ExitStatus;

    fn langs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|code| code.to_string()).collect()
    }

    #[test]
    fn language_list_skips_header() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\ndeu\neng\nosd\n";
        assert_eq!(parse_language_list(listing), langs(&["deu", "eng", "osd"]));
    }

    #[test]
    fn best_language_prefers_combined() {
        assert_eq!(best_language(&langs(&["eng", "deu", "osd"])), "eng+deu");
        assert_eq!(best_language(&langs(&["deu"])), "deu");
        assert_eq!(best_language(&langs(&["eng", "fra"])), "eng");
        assert_eq!(best_language(&[]), "eng");
    }

    #[cfg(unix)]
    fn failed_output(stderr: &str) -> Output {
        use std::os::unix::process::ExitStatusExt;
        Output {
            status: ExitStatus::from_raw(1 << 8),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[cfg(unix)]
    #[test]
    fn missing_traineddata_is_a_language_error() {
        let engine = TesseractEngine::new("tesseract");
        let output = failed_output(
            "Error opening data file /usr/share/tessdata/deu.traineddata\n\
             Failed loading language 'deu'\n\
             Tesseract couldn't load any languages!\n\
             Could not initialize tesseract.",
        );
        let err = engine.failure("deu", &output);
        assert!(err.is_language_error());
    }

    #[cfg(unix)]
    #[test]
    fn other_failures_are_plain_ocr_errors() {
        let engine = TesseractEngine::new("tesseract");
        let err = engine.failure("eng", &failed_output("Image file page.png cannot be read!"));
        assert!(matches!(err, ScanlayerError::OcrError(_)));
    }

    #[test]
    fn missing_binary_is_environment_error() {
        let engine = TesseractEngine::new("/nonexistent/tesseract");
        let image = RasterImage::rendered(image::RgbImage::new(4, 4), 72);
        let err = engine.recognize(&image, "eng", OcrFormat::Spans).unwrap_err();
        assert!(matches!(err, ScanlayerError::EngineUnavailable(_)));
    }
}
