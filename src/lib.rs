//! # proposal-pdf
//!
//! Fill ODT/DOCX proposal templates with form data and convert them to PDF
//! with headless LibreOffice.
//!
//! ## Pipeline Overview
//!
//! ```text
//! RenderRequest { templateId, formData }
//!  │
//!  ├─ 1. Validate  id allow-list, catalog lookup, sanitise + check every field
//!  ├─ 2. Derive    blank auto-fill dates, calculated amounts
//!  ├─ 3. Fill      read template fresh, substitute {{KEY}} (spawn_blocking)
//!  ├─ 4. Convert   soffice --headless --convert-to pdf, with timeout + cleanup
//!  └─ 5. Output    PDF bytes + attachment file name + stats
//! ```
//!
//! Untrusted input never reaches the filesystem before step 1 passes: the
//! template id must match `^[A-Za-z0-9-]+$` and name a catalog entry, and
//! template paths come from the catalog only.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use proposal_pdf::{generate, Catalog, RenderConfig, RenderRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RenderConfig::builder().templates_dir("templates").build()?;
//!     let request = RenderRequest::new("RPBANK")
//!         .field("AC", "Maria")
//!         .field("VALORPROPOSTA", "R$ 1.000,00")
//!         .field("TAXAINTERMEDIACAO", "R$ 0,00");
//!     let doc = generate(&request, &Catalog::builtin(), &config).await?;
//!     std::fs::write(&doc.filename, &doc.pdf)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `proposal-pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! proposal-pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod catalog;
pub mod config;
pub mod currency;
pub mod error;
pub mod generate;
pub mod http;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod request;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use catalog::{
    is_valid_template_id, Catalog, FieldKind, FieldSpec, FileNameFields, Formula,
    TemplateDescriptor,
};
pub use config::{RenderConfig, RenderConfigBuilder};
pub use error::{ErrorKind, FieldViolation, RenderError, ViolationKind};
pub use generate::{fill_only, generate, generate_sync, generate_to_file};
pub use http::{ErrorBody, TemplateListing, TemplateSummary};
pub use output::{FilledDocument, RenderStats, RenderedDocument};
pub use pipeline::template::{DocumentKind, FieldMap, Filler, FsTemplateSource, TemplateSource};
pub use progress::{NoopProgressCallback, ProgressCallback, RenderProgressCallback, Stage};
pub use request::RenderRequest;
