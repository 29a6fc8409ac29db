//! Error types for the proposal-pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`RenderError`]: **Fatal**: the request cannot produce a PDF at all
//!   (bad template id, unreadable template, engine failure). Returned as
//!   `Err(RenderError)` from the top-level `generate*` functions.
//!
//! * [`FieldViolation`]: **Per-field**: one submitted value failed its
//!   format check. Violations are collected for every field first and then
//!   surfaced together inside [`RenderError::Validation`], so the caller can
//!   fix all of them in one round trip.
//!
//! Every [`RenderError`] maps to an [`ErrorKind`] and an HTTP status. The
//! `Display` text is meant for operator logs and may include paths and
//! engine diagnostics; [`RenderError::public_message`] is the text that is
//! safe to hand back to the caller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the proposal-pdf library.
#[derive(Debug, Error)]
pub enum RenderError {
    // ── Request errors ────────────────────────────────────────────────────
    /// Template id contains characters outside `[A-Za-z0-9-]`.
    ///
    /// The offending id is deliberately not stored.
    #[error("Invalid template id")]
    InvalidTemplateId,

    /// Template id is well-formed but not in the catalog.
    #[error("Unknown template '{id}'")]
    UnknownTemplate { id: String },

    /// One or more field values failed their format check.
    #[error("Invalid data: {}", join_violations(.violations))]
    Validation { violations: Vec<FieldViolation> },

    // ── Template errors ───────────────────────────────────────────────────
    /// Catalog entry exists but its file is not on disk.
    #[error("Template file for '{id}' not found at '{path}'")]
    MissingTemplateFile { id: String, path: PathBuf },

    /// The template could not be read from disk.
    #[error("Failed to read template '{path}': {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive unreadable, content part missing, or unsupported extension.
    #[error("Template format error: {detail}")]
    TemplateFormat { detail: String },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The rendering engine failed, timed out, or produced no PDF.
    #[error("Conversion failed: {detail}{}", fmt_diagnostics(.diagnostics))]
    Conversion {
        detail: String,
        diagnostics: Option<String>,
    },

    /// Could not prepare the working directory or input file.
    #[error("Working directory error at '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write the final PDF to its destination.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or catalog validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RenderError {
    pub(crate) fn format(detail: impl Into<String>) -> Self {
        RenderError::TemplateFormat {
            detail: detail.into(),
        }
    }

    pub(crate) fn conversion(detail: impl Into<String>, diagnostics: Option<String>) -> Self {
        RenderError::Conversion {
            detail: detail.into(),
            diagnostics: diagnostics.filter(|d| !d.trim().is_empty()),
        }
    }

    /// The caller-visible category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::InvalidTemplateId => ErrorKind::InvalidTemplateId,
            RenderError::UnknownTemplate { .. } => ErrorKind::UnknownTemplate,
            RenderError::Validation { .. } => ErrorKind::Validation,
            RenderError::MissingTemplateFile { .. } => ErrorKind::MissingTemplateFile,
            RenderError::TemplateRead { .. } | RenderError::TemplateFormat { .. } => {
                ErrorKind::TemplateFormat
            }
            RenderError::Conversion { .. } | RenderError::Workspace { .. } => {
                ErrorKind::Conversion
            }
            RenderError::OutputWriteFailed { .. }
            | RenderError::InvalidConfig(_)
            | RenderError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status for this error at the service boundary.
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Message that is safe to return to the caller.
    ///
    /// Request errors are specific; server-side failures are generic so
    /// paths and engine output stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            RenderError::InvalidTemplateId => "Invalid template id".to_string(),
            RenderError::UnknownTemplate { .. } => "Proposal template not found".to_string(),
            RenderError::Validation { .. } => self.to_string(),
            RenderError::MissingTemplateFile { .. } => "Template file not found".to_string(),
            RenderError::TemplateRead { .. } | RenderError::TemplateFormat { .. } => {
                "Error generating proposal: the template could not be processed".to_string()
            }
            RenderError::Conversion { .. } | RenderError::Workspace { .. } => {
                "Error generating proposal: PDF conversion failed".to_string()
            }
            RenderError::OutputWriteFailed { .. }
            | RenderError::InvalidConfig(_)
            | RenderError::Internal(_) => "Error generating proposal".to_string(),
        }
    }
}

/// Caller-visible error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTemplateId,
    UnknownTemplate,
    MissingTemplateFile,
    Validation,
    TemplateFormat,
    Conversion,
    Internal,
}

impl ErrorKind {
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidTemplateId | ErrorKind::UnknownTemplate | ErrorKind::Validation => {
                400
            }
            ErrorKind::MissingTemplateFile => 404,
            ErrorKind::TemplateFormat | ErrorKind::Conversion | ErrorKind::Internal => 500,
        }
    }
}

/// A format problem with one submitted field.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{label}: {problem}")]
pub struct FieldViolation {
    /// Placeholder key of the field.
    pub key: String,
    /// Human-readable label, used in the message.
    pub label: String,
    pub problem: ViolationKind,
}

/// What was wrong with a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    InvalidDate,
    InvalidCurrency,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::InvalidDate => f.write_str("invalid date format"),
            ViolationKind::InvalidCurrency => f.write_str("invalid currency format"),
        }
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn fmt_diagnostics(diagnostics: &Option<String>) -> String {
    match diagnostics {
        Some(d) => format!("\nEngine output: {}", d.trim()),
        None => String::new(),
    }
}
