//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn RenderProgressCallback>`] via
//! [`crate::config::RenderConfigBuilder::progress_callback`] to receive
//! events as a request moves through validation, filling and conversion.
//! The CLI drives its spinner from these; a service could forward them to
//! its own metrics.
//!
//! # Example
//!
//! ```rust
//! use proposal_pdf::{RenderConfig, RenderProgressCallback, Stage};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Log;
//!
//! impl RenderProgressCallback for Log {
//!     fn on_stage_complete(&self, stage: Stage, elapsed: Duration) {
//!         eprintln!("{stage} took {elapsed:?}");
//!     }
//! }
//!
//! let config = RenderConfig::builder()
//!     .progress_callback(Arc::new(Log) as Arc<dyn RenderProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Pipeline stages reported to progress callbacks, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Id check, catalog lookup, sanitising, auto-fill and formulas.
    Validate,
    /// Reading the template and substituting placeholders.
    Fill,
    /// Running the engine and reading back the PDF.
    Convert,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Validate => "validate",
            Stage::Fill => "fill",
            Stage::Convert => "convert",
        })
    }
}

/// Called by the pipeline as a request progresses.
///
/// Implementations must be `Send + Sync`: conversions of different requests
/// may share one callback from several tasks. All methods have default
/// no-op implementations so callers only override what they care about.
pub trait RenderProgressCallback: Send + Sync {
    /// Called once, before the template id is checked.
    fn on_render_start(&self, template_id: &str) {
        let _ = template_id;
    }

    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    fn on_stage_complete(&self, stage: Stage, elapsed: Duration) {
        let _ = (stage, elapsed);
    }

    /// Called when a stage fails; no later stage runs.
    ///
    /// # Arguments
    /// * `error`: the caller-safe message of the failure
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }

    /// Called once after the last stage succeeded.
    ///
    /// # Arguments
    /// * `output_len`: byte length of the produced PDF or filled document
    fn on_render_complete(&self, output_len: usize) {
        let _ = output_len;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RenderProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RenderConfig`].
pub type ProgressCallback = Arc<dyn RenderProgressCallback>;
