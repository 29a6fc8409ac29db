//! PDF conversion through a headless LibreOffice subprocess.
//!
//! LibreOffice only converts files on disk, so every conversion gets a
//! [`WorkingArtifact`]: a uniquely named input file, the PDF LibreOffice is
//! expected to write next to it, and optionally a private user profile.
//! The artifact removes all of them when it is dropped, so the working
//! directory is left clean whether the conversion succeeds, fails, times
//! out or the task is cancelled.
//!
//! The engine is invoked as
//!
//! ```text
//! <soffice> [extra args] [-env:UserInstallation=file:///…] \
//!     --headless --convert-to pdf --outdir <work_dir> <work_dir>/input_<id>.<ext>
//! ```
//!
//! with stdin closed and stdout/stderr captured for diagnostics. The run is
//! bounded by [`RenderConfig::conversion_timeout`]. On unix the launcher
//! runs in its own process group, and when the bound is hit the whole group
//! is killed before the artifact is cleaned up, so a forked worker cannot
//! write into the working directory afterwards.

use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::pipeline::template::DocumentKind;
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Longest engine output kept in an error, in characters.
const MAX_DIAGNOSTIC_CHARS: usize = 4000;

/// Files (and optional profile directory) owned by one conversion.
#[derive(Debug)]
pub struct WorkingArtifact {
    pub id: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub profile: Option<PathBuf>,
}

impl WorkingArtifact {
    /// Reserve unique names under `dir`. Nothing is created yet.
    pub fn new(dir: &Path, kind: DocumentKind, isolated_profile: bool) -> Self {
        let id = artifact_id();
        Self {
            input: dir.join(format!("input_{id}.{}", kind.extension())),
            output: dir.join(format!("input_{id}.pdf")),
            profile: isolated_profile.then(|| dir.join(format!("profile_{id}"))),
            id,
        }
    }
}

impl Drop for WorkingArtifact {
    fn drop(&mut self) {
        for path in [&self.input, &self.output] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
        if let Some(profile) = &self.profile {
            if let Err(e) = std::fs::remove_dir_all(profile) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove profile {}: {}", profile.display(), e);
                }
            }
        }
        debug!("Cleaned up artifact {}", self.id);
    }
}

/// Millisecond timestamp plus a random UUIDv4, e.g. `1712345678901_6f1c…`.
pub fn artifact_id() -> String {
    format!(
        "{}_{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

/// Convert a filled document to PDF bytes.
pub async fn convert_to_pdf(
    document: &[u8],
    kind: DocumentKind,
    config: &RenderConfig,
) -> Result<Vec<u8>, RenderError> {
    let work_dir = &config.work_dir;
    tokio::fs::create_dir_all(work_dir)
        .await
        .map_err(|e| RenderError::Workspace {
            path: work_dir.clone(),
            source: e,
        })?;

    let artifact = WorkingArtifact::new(work_dir, kind, config.isolated_profile);
    tokio::fs::write(&artifact.input, document)
        .await
        .map_err(|e| RenderError::Workspace {
            path: artifact.input.clone(),
            source: e,
        })?;

    let mut cmd = Command::new(&config.soffice_path);
    cmd.args(&config.soffice_args);
    if let Some(profile) = &artifact.profile {
        let profile = std::path::absolute(profile).map_err(|e| RenderError::Workspace {
            path: profile.clone(),
            source: e,
        })?;
        cmd.arg(format!("-env:UserInstallation={}", file_url(&profile)));
    }
    cmd.arg("--headless")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(work_dir)
        .arg(&artifact.input)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // The launcher forks worker processes; giving it its own group lets a
    // timeout take all of them down.
    #[cfg(unix)]
    cmd.process_group(0);

    debug!(
        "Running {} on {}",
        config.soffice_path.display(),
        artifact.input.display()
    );
    let started = Instant::now();

    let mut child = cmd.spawn().map_err(|e| {
        RenderError::conversion(
            format!(
                "could not start '{}': {e} (install LibreOffice or set {})",
                config.soffice_path.display(),
                soffice_locate::ENV_VAR
            ),
            None,
        )
    })?;
    // Declared after `child` so it is dropped (and fires) first.
    let mut group = ProcessGroup::new(&child);

    let outcome = timeout(config.conversion_timeout, collect_output(&mut child)).await;
    let output = match outcome {
        Err(_) => {
            group.kill();
            if let Err(e) = child.kill().await {
                debug!("Engine already gone after timeout: {}", e);
            }
            warn!(
                "LibreOffice did not finish within {:?}; process group killed",
                config.conversion_timeout
            );
            return Err(RenderError::conversion(
                format!("timed out after {} ms", config.conversion_timeout.as_millis()),
                None,
            ));
        }
        Ok(Err(e)) => {
            group.kill();
            return Err(RenderError::conversion(
                format!("lost contact with the engine: {e}"),
                None,
            ));
        }
        Ok(Ok(output)) => {
            group.release();
            output
        }
    };

    let diagnostics = engine_diagnostics(&output.stdout, &output.stderr);
    if !output.status.success() {
        if let Some(d) = &diagnostics {
            warn!("LibreOffice output: {}", d);
        }
        return Err(RenderError::conversion(
            format!("engine exited with {}", output.status),
            diagnostics,
        ));
    }

    let pdf = match tokio::fs::read(&artifact.output).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(RenderError::conversion("PDF was not produced", diagnostics));
        }
        Err(e) => {
            return Err(RenderError::Workspace {
                path: artifact.output.clone(),
                source: e,
            });
        }
    };

    if !pdf.starts_with(b"%PDF") {
        return Err(RenderError::conversion(
            "engine output is not a PDF",
            diagnostics,
        ));
    }

    info!(
        "Converted {} document to PDF in {}ms ({} bytes)",
        kind.extension(),
        started.elapsed().as_millis(),
        pdf.len()
    );
    Ok(pdf)
}

/// Wait for the engine while draining both pipes.
async fn collect_output(child: &mut Child) -> io::Result<Output> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, stdout, stderr) = tokio::try_join!(child.wait(), drain(stdout), drain(stderr))?;
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Process group led by the engine launcher.
///
/// Killed on [`ProcessGroup::kill`] or on drop unless released first. Only
/// release once the leader has been reaped normally; until then its pid
/// cannot be reused.
struct ProcessGroup {
    leader: Option<u32>,
}

impl ProcessGroup {
    fn new(child: &Child) -> Self {
        Self { leader: child.id() }
    }

    fn release(&mut self) {
        self.leader = None;
    }

    fn kill(&mut self) {
        if let Some(pid) = self.leader.take() {
            kill_group(pid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(leader: u32) {
    let Ok(pgid) = libc::pid_t::try_from(leader) else {
        return;
    };
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group
    // created by `process_group(0)` for this child.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            "Could not signal process group {}: {}",
            pgid,
            io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_group(_leader: u32) {}

/// stderr, or stdout when stderr is blank, capped in length.
fn engine_diagnostics(stdout: &[u8], stderr: &[u8]) -> Option<String> {
    let pick = |bytes: &[u8]| {
        let text = String::from_utf8_lossy(bytes).trim().to_string();
        (!text.is_empty()).then_some(text)
    };
    let text = pick(stderr).or_else(|| pick(stdout))?;
    Some(match text.char_indices().nth(MAX_DIAGNOSTIC_CHARS) {
        Some((cut, _)) => format!("{}...[truncated]", &text[..cut]),
        None => text,
    })
}

/// `file://` URL for an absolute path, as LibreOffice expects for
/// `UserInstallation`.
fn file_url(path: &Path) -> String {
    let mut p = path.to_string_lossy().replace('\\', "/");
    if !p.starts_with('/') {
        p.insert(0, '/');
    }
    format!("file://{}", p.replace(' ', "%20"))
}
