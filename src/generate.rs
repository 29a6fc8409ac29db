//! Request-level entry points: validate, fill, convert.
//!
//! A request either yields a complete document or an error; nothing
//! partial is ever returned. Checks that need no I/O (id syntax, catalog
//! lookup, field validation) all run before the template is touched, and
//! the template is only read once they pass.

use crate::catalog::{is_valid_template_id, Catalog, TemplateDescriptor};
use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::output::{FilledDocument, RenderStats, RenderedDocument};
use crate::pipeline::template::{filler_for, DocumentKind, FieldMap};
use crate::pipeline::{derive, naming, sanitize, soffice};
use crate::progress::Stage;
use crate::request::RenderRequest;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Fill a template and convert it to PDF.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// - [`RenderError::InvalidTemplateId`], [`RenderError::UnknownTemplate`],
///   [`RenderError::Validation`] before any file is read
/// - [`RenderError::MissingTemplateFile`], [`RenderError::TemplateRead`],
///   [`RenderError::TemplateFormat`] while filling
/// - [`RenderError::Conversion`], [`RenderError::Workspace`] from the engine
///
/// # Example
/// ```rust,no_run
/// use proposal_pdf::{generate, Catalog, RenderConfig, RenderRequest};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let request = RenderRequest::new("SD-RESOLV")
///     .field("AC", "Maria")
///     .field("VALORPROPOSTA", "R$ 1.000,00")
///     .field("VALORINTERMEDIACAO", "R$ 200,00");
/// let doc = generate(&request, &Catalog::builtin(), &RenderConfig::default()).await?;
/// std::fs::write(&doc.filename, &doc.pdf)?;
/// # Ok(())
/// # }
/// ```
pub async fn generate(
    request: &RenderRequest,
    catalog: &Catalog,
    config: &RenderConfig,
) -> Result<RenderedDocument, RenderError> {
    let total_start = Instant::now();
    let filled = prepare(request, catalog, config).await?;
    let mut stats = filled.stats;

    // ── Convert ──────────────────────────────────────────────────────────
    stage_start(config, Stage::Convert);
    let convert_start = Instant::now();
    let pdf = report(
        config,
        Stage::Convert,
        soffice::convert_to_pdf(&filled.bytes, filled.kind, config).await,
    )?;
    stats.convert_duration_ms = convert_start.elapsed().as_millis() as u64;
    stage_complete(config, Stage::Convert, convert_start);

    stats.pdf_bytes = pdf.len();
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    let filename = naming::attachment_filename(filled.template, &filled.fields, "pdf", Utc::now());
    info!(
        "Generated '{}' from template '{}' in {}ms ({} bytes)",
        filename, filled.template.id, stats.total_duration_ms, stats.pdf_bytes
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_render_complete(pdf.len());
    }

    Ok(RenderedDocument {
        pdf,
        filename,
        template_id: filled.template.id.clone(),
        stats,
    })
}

/// Fill a template without converting it.
///
/// Runs the same validation as [`generate`] and returns the filled ODT or
/// DOCX. Does not need LibreOffice.
pub async fn fill_only(
    request: &RenderRequest,
    catalog: &Catalog,
    config: &RenderConfig,
) -> Result<FilledDocument, RenderError> {
    let filled = prepare(request, catalog, config).await?;
    let filename = naming::attachment_filename(
        filled.template,
        &filled.fields,
        filled.kind.extension(),
        Utc::now(),
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_render_complete(filled.bytes.len());
    }
    Ok(FilledDocument {
        bytes: filled.bytes,
        kind: filled.kind,
        filename,
        template_id: filled.template.id.clone(),
    })
}

/// Generate a PDF and write it to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn generate_to_file(
    request: &RenderRequest,
    catalog: &Catalog,
    output_path: impl AsRef<Path>,
    config: &RenderConfig,
) -> Result<RenderStats, RenderError> {
    let doc = generate(request, catalog, config).await?;
    write_atomic(output_path.as_ref(), &doc.pdf).await?;
    Ok(doc.stats)
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    request: &RenderRequest,
    catalog: &Catalog,
    config: &RenderConfig,
) -> Result<RenderedDocument, RenderError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RenderError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate(request, catalog, config))
}

/// Write `bytes` next to `path` and rename into place.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RenderError> {
    let write_err = |e: std::io::Error| RenderError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Validated, filled and ready for conversion.
struct Prepared<'a> {
    template: &'a TemplateDescriptor,
    fields: FieldMap,
    kind: DocumentKind,
    bytes: Vec<u8>,
    stats: RenderStats,
}

async fn prepare<'a>(
    request: &RenderRequest,
    catalog: &'a Catalog,
    config: &RenderConfig,
) -> Result<Prepared<'a>, RenderError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_render_start(&request.template_id);
    }

    // ── Validate ─────────────────────────────────────────────────────────
    stage_start(config, Stage::Validate);
    let validate_start = Instant::now();
    let (template, fields, auto_filled, derived) =
        report(config, Stage::Validate, validate(request, catalog, config))?;
    stage_complete(config, Stage::Validate, validate_start);

    // ── Fill ─────────────────────────────────────────────────────────────
    stage_start(config, Stage::Fill);
    let fill_start = Instant::now();
    let (kind, template_bytes, bytes) =
        report(config, Stage::Fill, fill(template, &fields, config).await)?;
    stage_complete(config, Stage::Fill, fill_start);

    let stats = RenderStats {
        field_count: template.fields.len(),
        auto_filled,
        derived,
        template_bytes,
        filled_bytes: bytes.len(),
        validate_duration_ms: (fill_start - validate_start).as_millis() as u64,
        fill_duration_ms: fill_start.elapsed().as_millis() as u64,
        ..RenderStats::default()
    };

    Ok(Prepared {
        template,
        fields,
        kind,
        bytes,
        stats,
    })
}

fn validate<'a>(
    request: &RenderRequest,
    catalog: &'a Catalog,
    config: &RenderConfig,
) -> Result<(&'a TemplateDescriptor, FieldMap, usize, usize), RenderError> {
    // The id is not logged until it has passed the allow-list.
    if !is_valid_template_id(&request.template_id) {
        warn!("Rejected request with malformed template id");
        return Err(RenderError::InvalidTemplateId);
    }

    let template = catalog
        .get(&request.template_id)
        .ok_or_else(|| RenderError::UnknownTemplate {
            id: request.template_id.clone(),
        })?;
    info!(
        "Rendering template '{}' ({} submitted field(s))",
        template.id,
        request.form_data.len()
    );

    let mut fields = sanitize::sanitize_fields(template, &request.form_data, config.max_field_chars)?;

    let auto_filled = if config.auto_fill_dates {
        derive::auto_fill_dates(template, &mut fields, config.today())
    } else {
        0
    };
    let derived = if config.derive_calculated {
        derive::derive_calculated(template, &mut fields)
    } else {
        0
    };

    Ok((template, fields, auto_filled, derived))
}

/// Read the template fresh and fill it on a blocking thread.
///
/// Returns the kind, the template size and the filled bytes.
async fn fill(
    template: &TemplateDescriptor,
    fields: &FieldMap,
    config: &RenderConfig,
) -> Result<(DocumentKind, usize, Vec<u8>), RenderError> {
    let path = template.path_in(&config.templates_dir);
    let source = Arc::clone(&config.template_source);
    let id = template.id.clone();
    let fields = fields.clone();

    tokio::task::spawn_blocking(move || {
        if !source.exists(&path) {
            return Err(RenderError::MissingTemplateFile { id, path });
        }
        let kind = DocumentKind::from_path(&path)?;
        let bytes = source
            .read(&path)
            .map_err(|e| RenderError::TemplateRead {
                path: path.clone(),
                source: e,
            })?;
        let filled = filler_for(kind).fill(&bytes, &fields)?;
        debug!(
            "Filled {} ({} → {} bytes)",
            path.display(),
            bytes.len(),
            filled.len()
        );
        Ok((kind, bytes.len(), filled))
    })
    .await
    .map_err(|e| RenderError::Internal(format!("fill task failed: {e}")))?
}

fn report<T>(config: &RenderConfig, stage: Stage, result: Result<T, RenderError>) -> Result<T, RenderError> {
    if let Err(ref e) = result {
        debug!("Stage {} failed: {}", stage, e);
        if let Some(ref cb) = config.progress_callback {
            cb.on_stage_error(stage, &e.public_message());
        }
    }
    result
}

fn stage_start(config: &RenderConfig, stage: Stage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(stage);
    }
}

fn stage_complete(config: &RenderConfig, stage: Stage, started: Instant) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(stage, started.elapsed());
    }
}
