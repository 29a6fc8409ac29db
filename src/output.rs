//! Results returned by the rendering entry points.

use crate::pipeline::template::DocumentKind;
use serde::{Deserialize, Serialize};

/// A finished proposal PDF.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    /// Complete PDF bytes, starting with `%PDF`.
    pub pdf: Vec<u8>,
    /// Suggested attachment file name, e.g. `proposta_123-2024_Maria_05-03-2024.pdf`.
    pub filename: String,
    pub template_id: String,
    pub stats: RenderStats,
}

/// A filled office document that was not converted.
#[derive(Debug, Clone)]
pub struct FilledDocument {
    pub bytes: Vec<u8>,
    pub kind: DocumentKind,
    /// Attachment-style name with the document's own extension.
    pub filename: String,
    pub template_id: String,
}

/// Timing and size figures for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderStats {
    /// Declared fields of the template.
    pub field_count: usize,
    /// Fields set from the reference date.
    pub auto_filled: usize,
    /// Fields computed from formulas.
    pub derived: usize,
    pub template_bytes: usize,
    pub filled_bytes: usize,
    pub pdf_bytes: usize,
    pub validate_duration_ms: u64,
    pub fill_duration_ms: u64,
    pub convert_duration_ms: u64,
    pub total_duration_ms: u64,
}
