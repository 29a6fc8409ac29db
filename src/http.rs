//! Response shapes for an HTTP front end.
//!
//! The crate does not run a server. These types describe what a handler
//! sends back so every front end (and the CLI's `--json` mode) agrees on
//! the wire format.

use crate::catalog::{Catalog, FieldSpec};
use crate::error::RenderError;
use crate::output::RenderedDocument;
use serde::{Deserialize, Serialize};

/// JSON body for a failed request: `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl From<&RenderError> for ErrorBody {
    fn from(e: &RenderError) -> Self {
        Self {
            success: false,
            error: e.public_message(),
        }
    }
}

/// Status code and body for a failed request.
pub fn error_response(e: &RenderError) -> (u16, ErrorBody) {
    (e.status_code(), ErrorBody::from(e))
}

/// Response headers for a generated PDF, in sending order.
///
/// The document is personal data, so every cache layer is told not to keep
/// it.
pub fn pdf_headers(doc: &RenderedDocument) -> Vec<(&'static str, String)> {
    vec![
        ("Content-Type", "application/pdf".to_string()),
        (
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", doc.filename),
        ),
        ("Content-Length", doc.pdf.len().to_string()),
        (
            "Cache-Control",
            "no-store, no-cache, must-revalidate, proxy-revalidate".to_string(),
        ),
        ("Pragma", "no-cache".to_string()),
        ("Expires", "0".to_string()),
        ("Surrogate-Control", "no-store".to_string()),
    ]
}

/// One entry of the template listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub file: String,
    pub fields: Vec<FieldSpec>,
}

/// `{"success": true, "templates": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateListing {
    pub success: bool,
    pub templates: Vec<TemplateSummary>,
}

impl From<&Catalog> for TemplateListing {
    fn from(catalog: &Catalog) -> Self {
        Self {
            success: true,
            templates: catalog
                .iter()
                .map(|t| TemplateSummary {
                    id: t.id.clone(),
                    name: t.id.clone(),
                    file: t.file.clone(),
                    fields: t.fields.clone(),
                })
                .collect(),
        }
    }
}
