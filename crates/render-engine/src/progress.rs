//! Render progress reporting.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Stages of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStage {
    Preparing,
    Fetching,
    Trimming,
    Concatenating,
    Encoding,
    Complete,
}

/// Progress report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderProgress {
    pub stage: RenderStage,
    /// Fraction of the output encoded, in `[0, 1]`.
    pub percent: f64,
}

impl RenderProgress {
    pub fn new(stage: RenderStage, percent: f64) -> Self {
        Self {
            stage,
            percent: percent.clamp(0.0, 1.0),
        }
    }
}

/// Receives progress reports.
pub type ProgressCallback = Arc<dyn Fn(RenderProgress) + Send + Sync>;

/// Receives JPEG preview frames.
pub type PreviewCallback = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Optional observers of a render.
///
/// Previews are only extracted when a progress callback is present too: frame
/// timestamps come from the progress stream.
#[derive(Clone, Default)]
pub struct RenderCallbacks {
    pub on_progress: Option<ProgressCallback>,
    pub on_preview: Option<PreviewCallback>,
}

impl RenderCallbacks {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, cb: impl Fn(RenderProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(cb));
        self
    }

    pub fn with_preview(mut self, cb: impl Fn(Bytes) + Send + Sync + 'static) -> Self {
        self.on_preview = Some(Arc::new(cb));
        self
    }

    pub(crate) fn report(&self, stage: RenderStage, percent: f64) {
        if let Some(cb) = &self.on_progress {
            cb(RenderProgress::new(stage, percent));
        }
    }
}

impl std::fmt::Debug for RenderCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_preview", &self.on_preview.is_some())
            .finish()
    }
}

/// Encoded fraction of a render: `min(1, elapsed / total)`.
pub fn percent_complete(out_time_secs: f64, total_secs: f64) -> f64 {
    if total_secs <= 0.0 || !out_time_secs.is_finite() {
        return 0.0;
    }
    (out_time_secs / total_secs).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_complete() {
        assert_eq!(percent_complete(3.0, 6.0), 0.5);
        assert_eq!(percent_complete(9.0, 6.0), 1.0);
        assert_eq!(percent_complete(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_report_is_clamped() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callbacks =
            RenderCallbacks::none().with_progress(move |p| sink.lock().unwrap().push(p));
        callbacks.report(RenderStage::Encoding, 1.7);
        assert_eq!(seen.lock().unwrap()[0].percent, 1.0);
    }
}
