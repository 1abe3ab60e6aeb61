// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Locating external engine binaries (tesseract, pdftoppm).

use std::path::{Path, PathBuf};

use scanlayer_core::error::{Result, ScanlayerError};
use tracing::{debug, info};

/// Resolve an engine binary.
///
/// An explicit path must exist. Otherwise `name` is searched on `PATH`, then
/// in `fallbacks` (well-known install locations).
pub fn find_executable(name: &str, explicit: Option<&Path>, fallbacks: &[&str]) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            info!(engine = name, path = %path.display(), "Using configured engine");
            return Ok(path.to_path_buf());
        }
        return Err(ScanlayerError::EngineUnavailable(format!(
            "{} not found at configured path {}",
            name,
            path.display()
        )));
    }

    if let Some(found) = search_path(name) {
        info!(engine = name, path = %found.display(), "Engine found on PATH");
        return Ok(found);
    }

    for candidate in fallbacks {
        let path = Path::new(candidate);
        if path.is_file() {
            info!(engine = name, path = %path.display(), "Engine found in install location");
            return Ok(path.to_path_buf());
        }
    }

    Err(ScanlayerError::EngineUnavailable(format!(
        "{} is not installed or not on PATH",
        name
    )))
}

/// Look `name` up on `PATH` the way a shell would (PATHEXT on Windows, the
/// executable bit elsewhere).
fn search_path(name: &str) -> Option<PathBuf> {
    match which::which(name) {
        Ok(path) => Some(path),
        Err(err) => {
            debug!(engine = name, %err, "Engine not on PATH");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_must_exist() {
        let err = find_executable("tesseract", Some(Path::new("/nonexistent/tesseract")), &[])
            .unwrap_err();
        assert!(matches!(err, ScanlayerError::EngineUnavailable(_)));
    }

    #[test]
    fn explicit_existing_file_is_used() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let found = find_executable("anything", Some(file.path()), &[]).unwrap();
        assert_eq!(found, file.path());
    }

    #[test]
    fn fallback_location_is_used() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let fallback = file.path().to_string_lossy().to_string();
        let found =
            find_executable("scanlayer-no-such-binary-xyz", None, &[fallback.as_str()]).unwrap();
        assert_eq!(found, file.path());
    }

    #[test]
    fn path_lookup_ignores_missing_names() {
        assert!(search_path("scanlayer-no-such-binary-xyz").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn path_lookup_finds_a_shell() {
        let found = search_path("sh").unwrap();
        assert!(found.is_absolute());
    }

    #[test]
    fn missing_binary_is_environment_error() {
        let err = find_executable("scanlayer-no-such-binary-xyz", None, &[]).unwrap_err();
        assert!(matches!(err, ScanlayerError::EngineUnavailable(_)));
    }
}
