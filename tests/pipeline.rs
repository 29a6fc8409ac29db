//! Integration tests for the fill-and-convert pipeline.
//!
//! Templates are built in memory with `zip`. LibreOffice is replaced by a
//! small shell script run through `/bin/sh` that understands the same
//! `--outdir <dir> <input>` arguments and writes a stub PDF, so these tests
//! run anywhere a POSIX shell exists. Real conversions live in `e2e.rs`.

#![cfg(unix)]

use proposal_pdf::pipeline::archive::read_part;
use proposal_pdf::{
    fill_only, generate, generate_to_file, Catalog, ErrorKind, FsTemplateSource, RenderConfig,
    RenderConfigBuilder, RenderError, RenderProgressCallback, RenderRequest, Stage,
    TemplateSource,
};
use chrono::NaiveDate;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

// ── Fixtures ─────────────────────────────────────────────────────────────────

const ODT_MIMETYPE: &str = "application/vnd.oasis.opendocument.text";

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-styles xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0"><office:styles/></office:document-styles>"#;

const SD_RESOLV_CONTENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0"><office:body><office:text>
<text:p>Data: {{DATA}}</text:p>
<text:p>A/C: {{ AC }}</text:p>
<text:p>Processo: {{PROCESSONUMERO}}</text:p>
<text:p>Liquido: {{VALORLIQUIDO}}</text:p>
<text:p>Proposta: {{VALORPROPOSTA}}</text:p>
<text:p>Intermediacao: {{VALORINTERMEDIACAO}}</text:p>
<text:p>Total: {{TOTAL}}</text:p>
</office:text></office:body></office:document-content>"#;

const RPBANK_CONTENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0"><office:body><office:text>
<text:p>{{DATA}} {{AC}} {{REQUERENTE}} {{NUMEROPROCESSO}}</text:p>
<text:p>Total: {{TOTAL}}</text:p>
<text:p>Intermediacao: {{INTERMEDIACAO}}</text:p>
<text:p>Parceria: {{PARCERIA}}</text:p>
<text:p>Escritorio: {{ESCRITORIO}}</text:p>
</office:text></office:body></office:document-content>"#;

const DOCX_DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t xml:space="preserve">Prezado(a) </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>{{</w:t></w:r><w:r><w:t>AC</w:t></w:r><w:r><w:t>}}</w:t></w:r><w:r><w:t>,</w:t></w:r></w:p>
<w:p><w:r><w:t>Total: {{TOTAL}}</w:t></w:r></w:p>
<w:p><w:r><w:t>{{ NAO_DECLARADO }}</w:t></w:r></w:p>
</w:body></w:document>"#;

const DOCX_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:hdr xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:p><w:r><w:t>Processo {{PROCESSONUMERO}}</w:t></w:r></w:p></w:hdr>"#;

fn zip_package(entries: &[(&str, &str, CompressionMethod)]) -> Vec<u8> {
    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body, method) in entries {
        w.start_file(*name, SimpleFileOptions::default().compression_method(*method))
            .unwrap();
        w.write_all(body.as_bytes()).unwrap();
    }
    w.finish().unwrap().into_inner()
}

fn odt(content: &str) -> Vec<u8> {
    zip_package(&[
        ("mimetype", ODT_MIMETYPE, CompressionMethod::Stored),
        (
            "META-INF/manifest.xml",
            r#"<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0"/>"#,
            CompressionMethod::Deflated,
        ),
        ("content.xml", content, CompressionMethod::Deflated),
        ("styles.xml", STYLES_XML, CompressionMethod::Deflated),
    ])
}

fn docx() -> Vec<u8> {
    zip_package(&[
        (
            "[Content_Types].xml",
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#,
            CompressionMethod::Deflated,
        ),
        ("word/document.xml", DOCX_DOCUMENT, CompressionMethod::Deflated),
        ("word/header1.xml", DOCX_HEADER, CompressionMethod::Deflated),
        ("word/styles.xml", "<w:styles/>", CompressionMethod::Deflated),
    ])
}

/// Built-in catalog plus a DOCX variant of SD-RESOLV and a template with an
/// unsupported extension.
fn test_catalog() -> Catalog {
    let builtin = Catalog::builtin();
    let mut templates: Vec<_> = builtin.iter().cloned().collect();

    let mut word = builtin.get("SD-RESOLV").unwrap().clone();
    word.id = "SD-DOCX".into();
    word.file = "proposta.docx".into();
    templates.push(word);

    let mut legacy = builtin.get("SD-RESOLV").unwrap().clone();
    legacy.id = "LEGACY".into();
    legacy.file = "proposta.doc".into();
    templates.push(legacy);

    Catalog::new(templates).unwrap()
}

// ── Fake engine ──────────────────────────────────────────────────────────────

/// Records its arguments, keeps a copy of the input and writes
/// `<outdir>/<stem>.pdf`, mimicking `soffice --convert-to pdf`.
const ENGINE_OK: &str = r#"
printf '%s\n' "$@" > "@CAPTURE@/args.txt"
outdir=""
input=""
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    -*) shift ;;
    *) input="$1"; shift ;;
  esac
done
name=$(basename "$input")
cp "$input" "@CAPTURE@/$name"
printf '%%PDF-1.4\n%% stub\n' > "$outdir/${name%.*}.pdf"
"#;

const ENGINE_FAIL: &str = r#"
echo "Error: source file could not be loaded" >&2
exit 1
"#;

const ENGINE_SILENT: &str = "exit 0\n";

const ENGINE_NOT_PDF: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    -*) shift ;;
    *) input="$1"; shift ;;
  esac
done
name=$(basename "$input")
echo "not a pdf" > "$outdir/${name%.*}.pdf"
"#;

const ENGINE_HANG: &str = "exec sleep 30\n";

/// Hands the job to a background worker that writes the PDF late, the way
/// the soffice launcher forks soffice.bin.
const ENGINE_FORKED_WORKER: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    -*) shift ;;
    *) input="$1"; shift ;;
  esac
done
name=$(basename "$input")
( sleep 1; printf '%%PDF-1.4\n' > "$outdir/${name%.*}.pdf" ) &
wait
"#;

struct Env {
    _dir: TempDir,
    templates: PathBuf,
    work: PathBuf,
    capture: PathBuf,
    root: PathBuf,
}

impl Env {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let templates = root.join("templates");
        let capture = root.join("capture");
        std::fs::create_dir_all(&templates).unwrap();
        std::fs::create_dir_all(&capture).unwrap();
        std::fs::write(templates.join("MODELOA.ODT"), odt(SD_RESOLV_CONTENT)).unwrap();
        std::fs::write(templates.join("modeloB.odt"), odt(RPBANK_CONTENT)).unwrap();
        std::fs::write(templates.join("proposta.docx"), docx()).unwrap();
        std::fs::write(templates.join("proposta.doc"), b"binary").unwrap();
        Self {
            _dir: dir,
            work: root.join("work"),
            templates,
            capture,
            root,
        }
    }

    /// Config running `script` through `/bin/sh` as the engine.
    fn config(&self, script: &str) -> RenderConfigBuilder {
        let path = self.root.join(format!("engine-{}.sh", script.len()));
        let body = script.replace("@CAPTURE@", &self.capture.to_string_lossy());
        std::fs::write(&path, body).unwrap();
        RenderConfig::builder()
            .templates_dir(&self.templates)
            .work_dir(&self.work)
            .soffice_path("/bin/sh")
            .soffice_args([path.to_string_lossy().into_owned()])
            .conversion_timeout(Duration::from_secs(20))
            .reference_date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
    }

    fn assert_work_dir_clean(&self) {
        if self.work.exists() {
            let left: Vec<_> = std::fs::read_dir(&self.work)
                .unwrap()
                .map(|e| e.unwrap().file_name())
                .collect();
            assert!(left.is_empty(), "working directory not clean: {left:?}");
        }
    }

    fn captured(&self, ext: &str) -> Vec<u8> {
        let entry = std::fs::read_dir(&self.capture)
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.extension().is_some_and(|e| e == ext))
            .expect("engine did not receive an input file");
        std::fs::read(entry).unwrap()
    }
}

fn sd_resolv_request() -> RenderRequest {
    RenderRequest::new("SD-RESOLV").fields([
        ("AC", "Maria Souza"),
        ("PROCESSONUMERO", "0001234-56.2024"),
        ("VALORPROPOSTA", "R$ 1.000,00"),
        ("VALORINTERMEDIACAO", "R$ 200,00"),
    ])
}

/// Parse the whole document and return its unescaped text.
fn well_formed_text(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Text(t)) => text.push_str(&t.unescape().expect("bad entity")),
            Ok(_) => {}
            Err(e) => panic!("malformed XML at {}: {e}", reader.buffer_position()),
        }
    }
    text
}

// ── Spies ────────────────────────────────────────────────────────────────────

/// Filesystem source that logs every call.
#[derive(Default)]
struct SpySource {
    calls: Mutex<Vec<String>>,
}

impl TemplateSource for SpySource {
    fn exists(&self, path: &Path) -> bool {
        self.calls
            .lock()
            .unwrap()
            .push(format!("exists {}", path.display()));
        FsTemplateSource.exists(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("read {}", path.display()));
        FsTemplateSource.read(path)
    }
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl RenderProgressCallback for EventLog {
    fn on_render_start(&self, template_id: &str) {
        self.push(format!("start {template_id}"));
    }
    fn on_stage_start(&self, stage: Stage) {
        self.push(format!("begin {stage}"));
    }
    fn on_stage_complete(&self, stage: Stage, _elapsed: Duration) {
        self.push(format!("end {stage}"));
    }
    fn on_stage_error(&self, stage: Stage, _error: &str) {
        self.push(format!("error {stage}"));
    }
    fn on_render_complete(&self, _output_len: usize) {
        self.push("done".into());
    }
}

impl EventLog {
    fn push(&self, e: String) {
        self.events.lock().unwrap().push(e);
    }
}

// ── Request flow ─────────────────────────────────────────────────────────────
#[tokio::test]
async fn sd_resolv_total_is_derived() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();

    let doc = generate(&sd_resolv_request(), &test_catalog(), &config)
        .await
        .unwrap();
    assert!(doc.pdf.starts_with(b"%PDF"));
    assert_eq!(doc.filename, "proposta_0001234-56_2024_Maria_Souza_05-03-2024.pdf");
    assert_eq!(doc.stats.derived, 1);
    assert_eq!(doc.stats.auto_filled, 1);

    let content = read_part(&env.captured("odt"), "content.xml").unwrap();
    assert!(content.contains("Total: R$ 800,00"));
    assert!(content.contains("Data: 05/03/2024"));
    assert!(content.contains("A/C: Maria Souza"));
    assert!(content.contains("Liquido: </text:p>"));
    assert!(!content.contains("{{"));
    env.assert_work_dir_clean();
}

#[tokio::test]
async fn rpbank_split_follows_the_total() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();
    let request = RenderRequest::new("RPBANK").fields([
        ("VALORPROPOSTA", "R$ 1.000,00"),
        ("TAXAINTERMEDIACAO", "R$ 0,00"),
    ]);

    let filled = fill_only(&request, &test_catalog(), &config).await.unwrap();
    let content = read_part(&filled.bytes, "content.xml").unwrap();
    assert!(content.contains("Total: R$ 1.000,00"));
    assert!(content.contains("Intermediacao: R$ 100,00"));
    assert!(content.contains("Parceria: R$ 80,00"));
    assert!(content.contains("Escritorio: R$ 20,00"));
    assert!(!content.contains("{{"));
    // Only the date is set among the naming fields.
    assert_eq!(filled.filename, "proposta_05-03-2024.odt");
}

#[tokio::test]
async fn impossible_date_is_rejected_before_storage() {
    let env = Env::new();
    let spy = Arc::new(SpySource::default());
    let config = env
        .config(ENGINE_OK)
        .template_source(spy.clone())
        .build()
        .unwrap();
    let request = sd_resolv_request().field("DATA", "31/13/2024");

    let err = generate(&request, &test_catalog(), &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.status_code(), 400);
    assert!(err.public_message().contains("Data"));
    assert!(spy.calls.lock().unwrap().is_empty());
    assert!(!env.work.exists());
}

#[tokio::test]
async fn path_traversal_id_never_reaches_storage() {
    let env = Env::new();
    let spy = Arc::new(SpySource::default());
    let config = env
        .config(ENGINE_OK)
        .template_source(spy.clone())
        .build()
        .unwrap();

    for id in ["../../etc", "..", "RPBANK/../x", "RPBANK%2F", ""] {
        let err = generate(&RenderRequest::new(id), &test_catalog(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidTemplateId), "{id:?}");
        assert!(!err.public_message().contains(".."));
    }
    assert!(spy.calls.lock().unwrap().is_empty());
}

// ── Filling ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn odt_values_with_markup_characters_stay_well_formed() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();
    let request = RenderRequest::new("SD-RESOLV").fields([
        ("AC", r#"Tom & Jerry's "best" deal 2>1"#),
        ("PROCESSONUMERO", "1 < 2"),
    ]);

    let filled = fill_only(&request, &test_catalog(), &config).await.unwrap();
    let content = read_part(&filled.bytes, "content.xml").unwrap();
    assert!(content.contains("Tom &amp; Jerry&apos;s &quot;best&quot; deal 2&gt;1"));

    let text = well_formed_text(&content);
    assert!(text.contains(r#"A/C: Tom & Jerry's "best" deal 2>1"#));
    assert!(text.contains("Processo: 1 < 2"));
}

#[tokio::test]
async fn tags_in_values_are_stripped_not_injected() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();
    let request = RenderRequest::new("SD-RESOLV")
        .field("AC", "</text:p><text:p>injected</text:p> Maria\u{0}");

    let filled = fill_only(&request, &test_catalog(), &config).await.unwrap();
    let content = read_part(&filled.bytes, "content.xml").unwrap();
    assert!(content.contains("A/C: injected Maria</text:p>"));
    well_formed_text(&content);
}

#[tokio::test]
async fn filling_is_deterministic() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();
    let catalog = test_catalog();

    let a = fill_only(&sd_resolv_request(), &catalog, &config).await.unwrap();
    let b = fill_only(&sd_resolv_request(), &catalog, &config).await.unwrap();
    assert_eq!(a.bytes, b.bytes);

    let word = sd_resolv_request();
    let word = RenderRequest { template_id: "SD-DOCX".into(), ..word };
    let c = fill_only(&word, &catalog, &config).await.unwrap();
    let d = fill_only(&word, &catalog, &config).await.unwrap();
    assert_eq!(c.bytes, d.bytes);
}

#[tokio::test]
async fn odt_package_layout_is_preserved() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();
    let filled = fill_only(&sd_resolv_request(), &test_catalog(), &config)
        .await
        .unwrap();

    let mut archive = ZipArchive::new(Cursor::new(&filled.bytes)).unwrap();
    let names: Vec<_> = archive.file_names().map(str::to_string).collect();
    assert_eq!(archive.len(), 4);
    {
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
    }
    assert!(names.contains(&"styles.xml".to_string()));
    assert_eq!(read_part(&filled.bytes, "styles.xml").unwrap(), STYLES_XML);
    assert_eq!(read_part(&filled.bytes, "mimetype").unwrap(), ODT_MIMETYPE);
    assert_eq!(
        archive.by_name("content.xml").unwrap().compression(),
        CompressionMethod::Deflated
    );
}

#[tokio::test]
async fn docx_placeholders_split_across_runs_are_filled() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();
    let request = RenderRequest {
        template_id: "SD-DOCX".into(),
        ..sd_resolv_request()
    }
    .field("AC", "Maria\nSouza");

    let filled = fill_only(&request, &test_catalog(), &config).await.unwrap();
    assert_eq!(filled.kind, proposal_pdf::DocumentKind::Docx);

    let body = read_part(&filled.bytes, "word/document.xml").unwrap();
    assert!(!body.contains("{{"));
    assert!(!body.contains("NAO_DECLARADO"));
    assert!(body.contains(r#"<w:t xml:space="preserve">Prezado(a) </w:t>"#));
    assert!(body.contains("Maria</w:t><w:br/>"));
    assert!(body.contains("Total: R$ 800,00"));
    let text = well_formed_text(&body);
    assert!(text.contains("Prezado(a) Maria"));

    let header = read_part(&filled.bytes, "word/header1.xml").unwrap();
    assert!(header.contains("Processo 0001234-56.2024"));
    well_formed_text(&header);

    assert_eq!(
        read_part(&filled.bytes, "word/styles.xml").unwrap(),
        "<w:styles/>"
    );
}

#[tokio::test]
async fn unsupported_extension_is_a_format_error() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();
    let err = fill_only(&RenderRequest::new("LEGACY"), &test_catalog(), &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateFormat);
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn corrupt_template_is_a_format_error() {
    let env = Env::new();
    std::fs::write(env.templates.join("MODELOA.ODT"), b"PK\x03\x04 truncated").unwrap();
    let config = env.config(ENGINE_OK).build().unwrap();
    let err = generate(&sd_resolv_request(), &test_catalog(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::TemplateFormat { .. }), "{err:?}");
    assert!(!env.work.exists(), "nothing may be written before filling succeeds");
}

#[tokio::test]
async fn missing_template_file_is_404_without_read() {
    let env = Env::new();
    std::fs::remove_file(env.templates.join("modeloB.odt")).unwrap();
    let spy = Arc::new(SpySource::default());
    let config = env
        .config(ENGINE_OK)
        .template_source(spy.clone())
        .build()
        .unwrap();

    let err = generate(&RenderRequest::new("RPBANK"), &test_catalog(), &config)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
    let calls = spy.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("exists "));
}

#[tokio::test]
async fn template_is_read_fresh_every_request() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();
    let catalog = test_catalog();

    let before = fill_only(&sd_resolv_request(), &catalog, &config).await.unwrap();
    std::fs::write(
        env.templates.join("MODELOA.ODT"),
        odt(&SD_RESOLV_CONTENT.replace("Total:", "Soma:")),
    )
    .unwrap();
    let after = fill_only(&sd_resolv_request(), &catalog, &config).await.unwrap();

    assert!(read_part(&before.bytes, "content.xml").unwrap().contains("Total: R$ 800,00"));
    assert!(read_part(&after.bytes, "content.xml").unwrap().contains("Soma: R$ 800,00"));
}

// ── Conversion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn engine_receives_the_conversion_arguments() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();
    generate(&sd_resolv_request(), &test_catalog(), &config)
        .await
        .unwrap();

    let args = std::fs::read_to_string(env.capture.join("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert!(args[0].starts_with("-env:UserInstallation=file:///"));
    assert_eq!(&args[1..5], ["--headless", "--convert-to", "pdf", "--outdir"]);
    assert_eq!(Path::new(args[5]), env.work.as_path());
    let input = Path::new(args[6]).file_name().unwrap().to_string_lossy();
    assert!(input.starts_with("input_") && input.ends_with(".odt"), "{input}");
    env.assert_work_dir_clean();
}

#[tokio::test]
async fn shared_profile_leaves_user_installation_alone() {
    let env = Env::new();
    let config = env
        .config(ENGINE_OK)
        .isolated_profile(false)
        .build()
        .unwrap();
    generate(&sd_resolv_request(), &test_catalog(), &config)
        .await
        .unwrap();

    let args = std::fs::read_to_string(env.capture.join("args.txt")).unwrap();
    assert!(!args.contains("UserInstallation"), "{args}");
    assert_eq!(args.lines().next(), Some("--headless"));
}

#[tokio::test]
async fn engine_failure_carries_diagnostics_and_cleans_up() {
    let env = Env::new();
    let config = env.config(ENGINE_FAIL).build().unwrap();
    let err = generate(&sd_resolv_request(), &test_catalog(), &config)
        .await
        .unwrap_err();

    match &err {
        RenderError::Conversion { diagnostics, .. } => {
            assert_eq!(
                diagnostics.as_deref(),
                Some("Error: source file could not be loaded")
            );
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!err.public_message().contains("source file"));
    env.assert_work_dir_clean();
}

#[tokio::test]
async fn missing_output_is_reported() {
    let env = Env::new();
    let config = env.config(ENGINE_SILENT).build().unwrap();
    let err = generate(&sd_resolv_request(), &test_catalog(), &config)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("PDF was not produced"), "{err}");
    env.assert_work_dir_clean();
}

#[tokio::test]
async fn non_pdf_output_is_rejected() {
    let env = Env::new();
    let config = env.config(ENGINE_NOT_PDF).build().unwrap();
    let err = generate(&sd_resolv_request(), &test_catalog(), &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conversion);
    assert!(err.to_string().contains("not a PDF"));
    env.assert_work_dir_clean();
}

#[tokio::test]
async fn hung_engine_times_out_and_cleans_up() {
    let env = Env::new();
    let config = env
        .config(ENGINE_HANG)
        .conversion_timeout(Duration::from_millis(300))
        .isolated_profile(true)
        .build()
        .unwrap();

    let started = Instant::now();
    let err = generate(&sd_resolv_request(), &test_catalog(), &config)
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(err.to_string().contains("timed out"), "{err}");
    assert_eq!(err.status_code(), 500);
    env.assert_work_dir_clean();
}

#[tokio::test]
async fn timeout_kills_forked_workers_before_cleanup() {
    let env = Env::new();
    let config = env
        .config(ENGINE_FORKED_WORKER)
        .conversion_timeout(Duration::from_millis(300))
        .build()
        .unwrap();

    let err = generate(&sd_resolv_request(), &test_catalog(), &config)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timed out"), "{err}");
    env.assert_work_dir_clean();

    // A surviving worker would have written its PDF by now.
    tokio::time::sleep(Duration::from_secs(2)).await;
    env.assert_work_dir_clean();
}

#[tokio::test]
async fn missing_engine_binary_is_a_conversion_error() {
    let env = Env::new();
    let config = env
        .config(ENGINE_OK)
        .soffice_path(env.root.join("no-such-soffice"))
        .soffice_args(Vec::<String>::new())
        .build()
        .unwrap();
    let err = generate(&sd_resolv_request(), &test_catalog(), &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conversion);
    assert!(err.to_string().contains("could not start"));
    env.assert_work_dir_clean();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_do_not_collide() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();
    let catalog = test_catalog();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let config = config.clone();
        let catalog = catalog.clone();
        tasks.push(tokio::spawn(async move {
            let request = sd_resolv_request().field("AC", format!("Cliente {i}"));
            generate(&request, &catalog, &config).await
        }));
    }
    for task in tasks {
        let doc = task.await.unwrap().unwrap();
        assert!(doc.pdf.starts_with(b"%PDF"));
    }

    let inputs = std::fs::read_dir(&env.capture)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|x| x == "odt")
        })
        .count();
    assert_eq!(inputs, 8);
    env.assert_work_dir_clean();
}

// ── Entry points ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn generate_to_file_writes_the_pdf() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();
    let out = env.root.join("out/proposta.pdf");

    let stats = generate_to_file(&sd_resolv_request(), &test_catalog(), &out, &config)
        .await
        .unwrap();
    let pdf = std::fs::read(&out).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
    assert_eq!(stats.pdf_bytes, pdf.len());
    assert_eq!(std::fs::read_dir(env.root.join("out")).unwrap().count(), 1);
}

#[test]
fn generate_sync_runs_without_a_runtime() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();
    let doc = proposal_pdf::generate_sync(&sd_resolv_request(), &test_catalog(), &config).unwrap();
    assert!(doc.pdf.starts_with(b"%PDF"));
}

#[tokio::test]
async fn progress_events_follow_the_stages() {
    let env = Env::new();
    let log = Arc::new(EventLog::default());
    let config = env
        .config(ENGINE_OK)
        .progress_callback(log.clone())
        .build()
        .unwrap();

    generate(&sd_resolv_request(), &test_catalog(), &config)
        .await
        .unwrap();
    assert_eq!(
        *log.events.lock().unwrap(),
        [
            "start SD-RESOLV",
            "begin validate",
            "end validate",
            "begin fill",
            "end fill",
            "begin convert",
            "end convert",
            "done"
        ]
    );

    log.events.lock().unwrap().clear();
    let _ = generate(&RenderRequest::new("NOPE"), &test_catalog(), &config).await;
    assert_eq!(
        *log.events.lock().unwrap(),
        ["start NOPE", "begin validate", "error validate"]
    );
}

#[tokio::test]
async fn undeclared_fields_are_ignored() {
    let env = Env::new();
    let config = env.config(ENGINE_OK).build().unwrap();
    let request = sd_resolv_request().field("NOT_A_FIELD", "{{AC}}");
    let filled = fill_only(&request, &test_catalog(), &config).await.unwrap();
    let content = read_part(&filled.bytes, "content.xml").unwrap();
    assert!(!content.contains("NOT_A_FIELD"));
    assert!(!content.contains("{{"));
}
