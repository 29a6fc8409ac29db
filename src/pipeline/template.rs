//! Template access and the filler abstraction.
//!
//! Two seams live here:
//!
//! * [`TemplateSource`] is how the pipeline touches template storage. The
//!   default [`FsTemplateSource`] reads from disk on every call; tests swap
//!   in a recording source to prove which requests reach storage at all.
//! * [`Filler`] substitutes placeholders in one document kind. The kind is
//!   picked from the template file extension by [`DocumentKind::from_path`]
//!   and [`filler_for`] returns the matching implementation.

use crate::error::RenderError;
use crate::pipeline::{docx::DocxFiller, odt::OdtFiller};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tracing::debug;

/// Sanitised placeholder values keyed by field key.
pub type FieldMap = BTreeMap<String, String>;

/// Office document flavour of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// OpenDocument text (`.odt`).
    Odt,
    /// Office Open XML word processing (`.docx`).
    Docx,
}

impl DocumentKind {
    /// Select the kind from the file extension, ignoring case.
    pub fn from_path(path: &Path) -> Result<Self, RenderError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("odt") => Ok(DocumentKind::Odt),
            Some("docx") => Ok(DocumentKind::Docx),
            _ => Err(RenderError::format(format!(
                "unsupported template type '{}' (expected .odt or .docx)",
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            ))),
        }
    }

    /// Lowercase file extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            DocumentKind::Odt => "odt",
            DocumentKind::Docx => "docx",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentKind::Odt => "application/vnd.oasis.opendocument.text",
            DocumentKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

/// Substitutes `{{KEY}}` placeholders in one document kind.
///
/// Implementations are pure: the same template bytes and the same field map
/// always produce the same output bytes. Keys missing from `fields` render
/// as empty text.
pub trait Filler: Send + Sync {
    fn kind(&self) -> DocumentKind;

    fn fill(&self, template: &[u8], fields: &FieldMap) -> Result<Vec<u8>, RenderError>;
}

/// The filler for `kind`.
pub fn filler_for(kind: DocumentKind) -> Box<dyn Filler> {
    match kind {
        DocumentKind::Odt => Box::new(OdtFiller),
        DocumentKind::Docx => Box::new(DocxFiller),
    }
}

/// Read access to template storage.
pub trait TemplateSource: Send + Sync {
    /// Whether a template file is present at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Full contents of the template at `path`.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads templates from the local filesystem, fresh on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsTemplateSource;

impl TemplateSource for FsTemplateSource {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let bytes = std::fs::read(path)?;
        debug!("Read template {} ({} bytes)", path.display(), bytes.len());
        Ok(bytes)
    }
}
