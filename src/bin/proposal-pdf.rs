//! CLI binary for proposal-pdf.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `RenderConfig` / `RenderRequest` and writes the results.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use proposal_pdf::{
    fill_only, generate, generate_to_file, Catalog, ErrorBody, ProgressCallback, RenderConfig,
    RenderError, RenderProgressCallback, RenderRequest, Stage, TemplateListing,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one spinner line for the running stage and a
/// log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

fn stage_message(stage: Stage) -> &'static str {
    match stage {
        Stage::Validate => "checking form data…",
        Stage::Fill => "filling template…",
        Stage::Convert => "converting with LibreOffice…",
    }
}

impl RenderProgressCallback for CliProgressCallback {
    fn on_render_start(&self, template_id: &str) {
        self.bar.set_prefix(template_id.to_string());
    }

    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(stage_message(stage));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed: Duration) {
        self.bar.println(format!(
            "  {} {:<9} {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{:.2}s", elapsed.as_secs_f64())),
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        self.bar.println(format!("  {} {:<9} {}", red("✗"), stage.to_string(), red(error)));
        self.bar.finish_and_clear();
    }

    fn on_render_complete(&self, _output_len: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # List the available templates and their fields
  proposal-pdf templates

  # Generate a PDF (file name derived from the case number, name and date)
  proposal-pdf generate -t SD-RESOLV -f AC="Maria Souza" -f PROCESSONUMERO=0001234-56.2024 \
      -f VALORPROPOSTA="R$ 1.000,00" -f VALORINTERMEDIACAO="R$ 200,00"

  # Read values from a JSON file ({"formData": {...}} or a flat object)
  proposal-pdf generate -t RPBANK --data proposal.json -o out/proposta.pdf

  # Only fill the template, no LibreOffice needed
  proposal-pdf fill -t RPBANK --data proposal.json -o filled.odt

  # Machine-readable output and errors
  proposal-pdf --json generate -t RPBANK --data proposal.json

ENVIRONMENT VARIABLES:
  SOFFICE_PATH             LibreOffice executable (default: platform path, then PATH)
  PROPOSAL_TEMPLATES_DIR   Directory holding the template files
  PROPOSAL_CATALOG         JSON catalog replacing the built-in templates
  PROPOSAL_WORK_DIR        Working directory for conversions
  PROPOSAL_TIMEOUT         Conversion timeout in seconds
  RUST_LOG                 Log filter (overrides -v / -q)
"#;

/// Fill ODT/DOCX proposal templates and convert them to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "proposal-pdf",
    version,
    about = "Fill ODT/DOCX proposal templates and convert them to PDF",
    long_about = "Fill ODT/DOCX proposal templates with form values and convert them to PDF \
with headless LibreOffice. Values are sanitised and validated before they reach the \
document; calculated amounts and dates are filled in automatically.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the template files.
    #[arg(long, global = true, env = "PROPOSAL_TEMPLATES_DIR", default_value = "templates")]
    templates_dir: PathBuf,

    /// JSON catalog file (default: built-in RPBANK and SD-RESOLV).
    #[arg(long, global = true, env = "PROPOSAL_CATALOG")]
    catalog: Option<PathBuf>,

    /// LibreOffice `soffice` executable.
    #[arg(long, global = true, env = "SOFFICE_PATH")]
    soffice: Option<PathBuf>,

    /// Working directory for conversion files.
    #[arg(long, global = true, env = "PROPOSAL_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Conversion timeout in seconds.
    #[arg(long, global = true, env = "PROPOSAL_TIMEOUT", default_value_t = 60,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Share the user's LibreOffice profile instead of a fresh one per
    /// conversion. Jobs may then be handed to an already running instance.
    #[arg(long, global = true, env = "PROPOSAL_SHARED_PROFILE")]
    shared_profile: bool,

    /// Output JSON (results and errors) on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "PROPOSAL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill a template and convert it to PDF.
    Generate(RenderArgs),
    /// Fill a template and write the ODT/DOCX without converting.
    Fill(RenderArgs),
    /// List the templates in the catalog.
    Templates,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Template id, e.g. RPBANK or SD-RESOLV.
    #[arg(short, long)]
    template: String,

    /// Field value; repeatable. Overrides values from --data.
    #[arg(short = 'f', long = "field", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    fields: Vec<(String, String)>,

    /// JSON file with field values.
    #[arg(long, value_name = "FILE")]
    data: Option<PathBuf>,

    /// Output file (default: the generated attachment name in the current directory).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Date for auto-filled date fields, dd/mm/yyyy (default: today).
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    reference_date: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; the
    // spinner provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli, show_progress).await {
        Ok(()) => Ok(()),
        Err(e) if cli.json => {
            let body = match e.downcast_ref::<RenderError>() {
                Some(render_err) => ErrorBody::from(render_err),
                None => ErrorBody {
                    success: false,
                    error: format!("{e:#}"),
                },
            };
            println!("{}", serde_json::to_string_pretty(&body)?);
            std::process::exit(1);
        }
        Err(e) => Err(e),
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    let catalog = match &cli.catalog {
        Some(path) => Catalog::from_path(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?,
        None => Catalog::builtin(),
    };

    match &cli.command {
        Command::Templates => {
            print_templates(&catalog, cli.json)?;
            Ok(())
        }
        Command::Generate(args) => {
            let request = build_request(args)?;
            let config = build_config(cli, args, show_progress)?;

            let (path, stats) = match &args.output {
                Some(path) => {
                    let stats = generate_to_file(&request, &catalog, path, &config)
                        .await
                        .context("Generation failed")?;
                    (path.clone(), stats)
                }
                None => {
                    let doc = generate(&request, &catalog, &config)
                        .await
                        .context("Generation failed")?;
                    let path = PathBuf::from(&doc.filename);
                    write_output(&path, &doc.pdf).await?;
                    (path, doc.stats)
                }
            };

            if cli.json {
                let summary = serde_json::json!({
                    "success": true,
                    "file": path,
                    "stats": stats,
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else if !cli.quiet {
                eprintln!(
                    "{}  {} bytes  {}ms  →  {}",
                    green("✔"),
                    stats.pdf_bytes,
                    stats.total_duration_ms,
                    bold(&path.display().to_string()),
                );
                if stats.derived + stats.auto_filled > 0 {
                    eprintln!(
                        "   {}",
                        dim(&format!(
                            "{} calculated, {} auto-filled field(s)",
                            stats.derived, stats.auto_filled
                        ))
                    );
                }
            }
            Ok(())
        }
        Command::Fill(args) => {
            let request = build_request(args)?;
            let config = build_config(cli, args, show_progress)?;
            let doc = fill_only(&request, &catalog, &config)
                .await
                .context("Filling failed")?;

            let path = args
                .output
                .clone()
                .unwrap_or_else(|| PathBuf::from(&doc.filename));
            write_output(&path, &doc.bytes).await?;

            if cli.json {
                let summary = serde_json::json!({
                    "success": true,
                    "file": path,
                    "kind": doc.kind,
                    "bytes": doc.bytes.len(),
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else if !cli.quiet {
                eprintln!(
                    "{}  {} bytes  →  {}",
                    green("✔"),
                    doc.bytes.len(),
                    bold(&path.display().to_string()),
                );
            }
            Ok(())
        }
    }
}

/// Map CLI args to `RenderConfig`.
fn build_config(cli: &Cli, args: &RenderArgs, show_progress: bool) -> Result<RenderConfig> {
    let mut builder = RenderConfig::builder()
        .templates_dir(&cli.templates_dir)
        .conversion_timeout(Duration::from_secs(cli.timeout))
        .isolated_profile(!cli.shared_profile);

    if let Some(ref path) = cli.soffice {
        builder = builder.soffice_path(path);
    }
    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(date) = args.reference_date {
        builder = builder.reference_date(date);
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Combine `--data` and `-f` values into a request.
fn build_request(args: &RenderArgs) -> Result<RenderRequest> {
    let mut request = RenderRequest::new(&args.template);

    if let Some(ref path) = args.data {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut value: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;
        let form = if value.get("formData").is_some() {
            value["formData"].take()
        } else {
            value
        };
        let parsed: RenderRequest = serde_json::from_value(serde_json::json!({
            "templateId": args.template,
            "formData": form,
        }))
        .with_context(|| format!("Invalid form data in {}", path.display()))?;
        request.form_data = parsed.form_data;
    }

    Ok(request.fields(args.fields.iter().cloned()))
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn print_templates(catalog: &Catalog, json: bool) -> Result<()> {
    if json {
        let listing = TemplateListing::from(catalog);
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for t in catalog.iter() {
        println!("{}  {}", bold(&t.id), dim(&t.file));
        if let Some(ref d) = t.description {
            println!("  {}", d);
        }
        for f in &t.fields {
            let mut flags = Vec::new();
            if f.calculated {
                flags.push("calculated");
            }
            if f.auto_fill {
                flags.push("auto-fill");
            }
            let kind = serde_json::to_value(f.kind)?;
            println!(
                "  {:<20} {:<14} {}{}",
                f.key,
                kind.as_str().unwrap_or_default(),
                f.label,
                if flags.is_empty() {
                    String::new()
                } else {
                    dim(&format!("  ({})", flags.join(", ")))
                }
            );
        }
        println!();
    }
    Ok(())
}

/// Parse `KEY=VALUE`.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

/// Parse `dd/mm/yyyy` or `yyyy-mm-dd`.
fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| format!("expected dd/mm/yyyy, got '{s}'"))
}
