// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Full-page rendering through poppler's `pdftoppm`. Rendering honours /Rotate,
// so the PNG it writes is already upright.

use std::path::{Path, PathBuf};
use std::process::Command;

use scanlayer_core::error::{Result, ScanlayerError};
use tracing::{debug, instrument};

use super::{RasterImage, Rasterize};
use crate::engine::find_executable;
use crate::image::processor::ImageProcessor;
use crate::pdf::reader::{PageInfo, SourceDocument};

#[cfg(windows)]
const INSTALL_LOCATIONS: &[&str] = &[
    r"C:\Program Files\poppler\Library\bin\pdftoppm.exe",
    r"C:\Program Files\poppler\bin\pdftoppm.exe",
];
#[cfg(not(windows))]
const INSTALL_LOCATIONS: &[&str] = &["/usr/bin/pdftoppm", "/usr/local/bin/pdftoppm", "/opt/homebrew/bin/pdftoppm"];

/// Renders pages with an external `pdftoppm` binary.
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    command: PathBuf,
}

impl PdftoppmRenderer {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Find `pdftoppm` at `explicit`, on `PATH`, or in a usual install location.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        find_executable("pdftoppm", explicit, INSTALL_LOCATIONS).map(Self::new)
    }

    pub fn command(&self) -> &Path {
        &self.command
    }
}

impl Rasterize for PdftoppmRenderer {
    #[instrument(skip_all, fields(page = page.number, dpi))]
    fn rasterize(&self, document: &SourceDocument, page: &PageInfo, dpi: u32) -> Result<RasterImage> {
        let workdir = tempfile::tempdir()?;

        // In-memory documents get a file of their own first.
        let input = match document.source_path() {
            Some(path) => path.to_path_buf(),
            None => {
                let path = workdir.path().join("source.pdf");
                std::fs::write(&path, document.to_bytes()?)?;
                path
            }
        };
        let prefix = workdir.path().join("page");

        let page_arg = page.number.to_string();
        let output = Command::new(&self.command)
            .arg("-r")
            .arg(dpi.to_string())
            .args(["-f", &page_arg, "-l", &page_arg])
            .args(["-singlefile", "-png"])
            .arg(&input)
            .arg(&prefix)
            .output()
            .map_err(|err| {
                ScanlayerError::EngineUnavailable(format!(
                    "failed to run {}: {}",
                    self.command.display(),
                    err
                ))
            })?;

        if !output.status.success() {
            return Err(ScanlayerError::RasterError(format!(
                "pdftoppm failed on page {} ({}): {}",
                page.number,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let png = std::fs::read(prefix.with_extension("png")).map_err(|err| {
            ScanlayerError::RasterError(format!(
                "pdftoppm produced no image for page {}: {}",
                page.number, err
            ))
        })?;
        let image = ImageProcessor::from_bytes(&png)?.into_rgb8();
        debug!(width = image.width(), height = image.height(), "Page rendered");

        Ok(RasterImage::rendered(image, dpi))
    }
}
