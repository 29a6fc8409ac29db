//! # soffice-locate
//!
//! Find the LibreOffice `soffice` binary used for headless document
//! conversion, so callers don't have to hard-code an install location per
//! platform.
//!
//! ## How it works
//!
//! On first call to [`locate`]:
//!
//! 1. Uses `SOFFICE_PATH` if it is set and points to an existing file.
//! 2. Falls back to the platform install location ([`default_path`]).
//! 3. Searches every directory on `PATH` for `soffice` / `libreoffice`.
//!
//! The result is cached for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use soffice_locate::{default_path, locate};
//!
//! let engine = locate().map(|p| p.to_path_buf()).unwrap_or_else(|_| default_path());
//! println!("converting with {}", engine.display());
//! ```
//!
//! ## Platform defaults
//!
//! | OS      | Path                                                  |
//! |---------|-------------------------------------------------------|
//! | Linux   | `/usr/bin/soffice`                                    |
//! | macOS   | `/Applications/LibreOffice.app/Contents/MacOS/soffice` |
//! | Windows | `C:\Program Files\LibreOffice\program\soffice.exe`    |

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable that overrides every other lookup.
pub const ENV_VAR: &str = "SOFFICE_PATH";

/// Binary names tried, in order, when searching `PATH`.
#[cfg(windows)]
const CANDIDATE_NAMES: &[&str] = &["soffice.exe", "soffice.com"];
#[cfg(not(windows))]
const CANDIDATE_NAMES: &[&str] = &["soffice", "libreoffice"];

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by soffice-locate.
#[derive(Error, Debug, Clone)]
pub enum LocateError {
    /// Nothing usable was found at any of the searched locations.
    #[error(
        "LibreOffice not found (searched: {})\n\
Install LibreOffice or set SOFFICE_PATH=/path/to/soffice.",
        .searched.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
    )]
    NotFound { searched: Vec<PathBuf> },
}

// ── Platform defaults ────────────────────────────────────────────────────────

/// The conventional install location of `soffice` on this platform.
///
/// Always returns a path, whether or not anything exists there; use it as a
/// configuration default when [`locate`] fails.
pub fn default_path() -> PathBuf {
    match std::env::consts::OS {
        "windows" => PathBuf::from(r"C:\Program Files\LibreOffice\program\soffice.exe"),
        "macos" => PathBuf::from("/Applications/LibreOffice.app/Contents/MacOS/soffice"),
        _ => PathBuf::from("/usr/bin/soffice"),
    }
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<Result<PathBuf, LocateError>> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Locate `soffice`, caching the outcome for the rest of the process.
pub fn locate() -> Result<&'static Path, LocateError> {
    RESOLVED_PATH
        .get_or_init(|| {
            resolve_with(
                std::env::var_os(ENV_VAR).map(PathBuf::from),
                default_path(),
                std::env::var_os("PATH"),
            )
        })
        .as_ref()
        .map(PathBuf::as_path)
        .map_err(Clone::clone)
}

/// Returns `true` when [`locate`] finds an engine.
pub fn is_available() -> bool {
    locate().is_ok()
}

/// Resolve without touching the process-wide cache or environment.
///
/// `env_override` wins when it names an existing file; a missing override is
/// skipped rather than treated as fatal, so a stale variable still lets the
/// platform default work.
pub fn resolve_with(
    env_override: Option<PathBuf>,
    default: PathBuf,
    path_var: Option<OsString>,
) -> Result<PathBuf, LocateError> {
    let mut searched = Vec::new();

    if let Some(p) = env_override {
        if p.is_file() {
            return Ok(p);
        }
        searched.push(p);
    }

    if default.is_file() {
        return Ok(default);
    }
    searched.push(default);

    if let Some(path_var) = path_var {
        for dir in std::env::split_paths(&path_var) {
            for name in CANDIDATE_NAMES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
        searched.push(PathBuf::from(format!("$PATH ({})", CANDIDATE_NAMES.join(", "))));
    }

    Err(LocateError::NotFound { searched })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
