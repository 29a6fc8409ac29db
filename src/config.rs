//! Configuration types for template filling and PDF conversion.
//!
//! All pipeline behaviour is controlled through [`RenderConfig`], built via
//! its [`RenderConfigBuilder`]. Everything that is fixed per deployment
//! (where templates live, which engine to run, how long to wait for it)
//! lives here; everything that changes per request travels in
//! [`crate::RenderRequest`].

use crate::error::RenderError;
use crate::pipeline::sanitize::DEFAULT_MAX_CHARS;
use crate::pipeline::template::{FsTemplateSource, TemplateSource};
use crate::progress::{ProgressCallback, RenderProgressCallback};
use chrono::NaiveDate;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for proposal rendering.
///
/// Built via [`RenderConfig::builder()`] or using [`RenderConfig::default()`].
///
/// # Example
/// ```rust
/// use proposal_pdf::RenderConfig;
/// use std::time::Duration;
///
/// let config = RenderConfig::builder()
///     .templates_dir("templates")
///     .conversion_timeout(Duration::from_secs(30))
///     .isolated_profile(false)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RenderConfig {
    /// Directory holding the template files named in the catalog. Default: `templates`.
    pub templates_dir: PathBuf,

    /// Directory for per-conversion input/output files. Created on demand.
    /// Default: `<system temp>/proposal-pdf`.
    pub work_dir: PathBuf,

    /// LibreOffice executable. Default: resolved by `soffice-locate`
    /// (`SOFFICE_PATH`, then the platform default, then `PATH`).
    pub soffice_path: PathBuf,

    /// Extra arguments placed before the conversion arguments.
    pub soffice_args: Vec<String>,

    /// Upper bound for one engine run; the process is killed after it. Default: 60 s.
    pub conversion_timeout: Duration,

    /// Give every conversion its own throwaway LibreOffice user profile. Default: true.
    ///
    /// With a shared profile a running LibreOffice instance (a desktop session
    /// or another conversion) may take the job over, and the launcher can exit
    /// before the PDF exists. Isolation costs a profile bootstrap per run.
    pub isolated_profile: bool,

    /// Maximum characters kept from one submitted value. Default: 500.
    pub max_field_chars: usize,

    /// Compute empty calculated fields from their formulas. Default: true.
    pub derive_calculated: bool,

    /// Fill empty auto-fill date fields with the reference date. Default: true.
    pub auto_fill_dates: bool,

    /// Date used for auto-filled fields. Default: None (today, local time).
    pub reference_date: Option<NaiveDate>,

    /// Where template bytes come from. Default: the local filesystem.
    pub template_source: Arc<dyn TemplateSource>,

    /// Optional stage-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("templates"),
            work_dir: std::env::temp_dir().join("proposal-pdf"),
            soffice_path: soffice_locate::locate()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|_| soffice_locate::default_path()),
            soffice_args: Vec::new(),
            conversion_timeout: Duration::from_secs(60),
            isolated_profile: true,
            max_field_chars: DEFAULT_MAX_CHARS,
            derive_calculated: true,
            auto_fill_dates: true,
            reference_date: None,
            template_source: Arc::new(FsTemplateSource),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderConfig")
            .field("templates_dir", &self.templates_dir)
            .field("work_dir", &self.work_dir)
            .field("soffice_path", &self.soffice_path)
            .field("soffice_args", &self.soffice_args)
            .field("conversion_timeout", &self.conversion_timeout)
            .field("isolated_profile", &self.isolated_profile)
            .field("max_field_chars", &self.max_field_chars)
            .field("derive_calculated", &self.derive_calculated)
            .field("auto_fill_dates", &self.auto_fill_dates)
            .field("reference_date", &self.reference_date)
            .field("template_source", &"<dyn TemplateSource>")
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn RenderProgressCallback>"),
            )
            .finish()
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }

    /// The date auto-filled fields receive.
    pub(crate) fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.templates_dir = dir.into();
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = path.into();
        self
    }

    pub fn soffice_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.soffice_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn conversion_timeout(mut self, timeout: Duration) -> Self {
        self.config.conversion_timeout = timeout;
        self
    }

    pub fn isolated_profile(mut self, v: bool) -> Self {
        self.config.isolated_profile = v;
        self
    }

    pub fn max_field_chars(mut self, n: usize) -> Self {
        self.config.max_field_chars = n;
        self
    }

    pub fn derive_calculated(mut self, v: bool) -> Self {
        self.config.derive_calculated = v;
        self
    }

    pub fn auto_fill_dates(mut self, v: bool) -> Self {
        self.config.auto_fill_dates = v;
        self
    }

    pub fn reference_date(mut self, date: NaiveDate) -> Self {
        self.config.reference_date = Some(date);
        self
    }

    pub fn template_source(mut self, source: Arc<dyn TemplateSource>) -> Self {
        self.config.template_source = source;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn RenderProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig, RenderError> {
        let c = &self.config;
        if c.conversion_timeout.is_zero() {
            return Err(RenderError::InvalidConfig(
                "conversion timeout must be greater than zero".into(),
            ));
        }
        if c.max_field_chars == 0 {
            return Err(RenderError::InvalidConfig(
                "max field length must be ≥ 1".into(),
            ));
        }
        if c.soffice_path.as_os_str().is_empty() {
            return Err(RenderError::InvalidConfig(
                "LibreOffice path must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
