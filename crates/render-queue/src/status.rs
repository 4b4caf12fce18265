//! Pollable render status, keyed by project.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use clipflow_render_engine::{RenderProgress, RenderStage};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

/// Coarse render state reported to pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderState {
    Rendering,
    Done,
    Failed,
}

impl RenderState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Rendering)
    }
}

/// Poll response for one project's render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStatus {
    pub status: RenderState,

    /// Overall progress in `[0, 1]`.
    pub progress: f64,

    /// Latest preview frame: a presigned URL in broker mode, a `data:` URL inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_video_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RenderStatus {
    fn rendering() -> Self {
        Self {
            status: RenderState::Rendering,
            progress: 0.0,
            preview_image_url: None,
            output_video_url: None,
            error: None,
        }
    }
}

/// Map a stage report onto one overall fraction.
///
/// Encoding dominates wall-clock time, so it owns the upper 70%.
pub fn overall_progress(report: RenderProgress) -> f64 {
    let value = match report.stage {
        RenderStage::Preparing => 0.0,
        RenderStage::Fetching => 0.05,
        RenderStage::Trimming => 0.15,
        RenderStage::Concatenating => 0.25,
        RenderStage::Encoding => 0.3 + 0.7 * report.percent,
        RenderStage::Complete => 1.0,
    };
    value.clamp(0.0, 1.0)
}

/// Live status of every render the process knows about.
///
/// Writes are synchronous so render callbacks can update it directly.
#[derive(Debug, Default)]
pub struct StatusStore {
    entries: Mutex<HashMap<Uuid, RenderStatus>>,
    changed: Notify,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, RenderStatus>> {
        // A poisoned map still holds consistent entries: every write is a single assignment.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `apply` to an existing entry. Only [`StatusStore::begin`] creates entries.
    fn modify(&self, project_id: Uuid, apply: impl FnOnce(&mut RenderStatus)) {
        let updated = match self.lock().get_mut(&project_id) {
            Some(entry) => {
                apply(entry);
                true
            }
            None => false,
        };
        if updated {
            self.changed.notify_waiters();
        }
    }

    /// Like `modify`, but skips entries that already reached a terminal state.
    fn modify_rendering(&self, project_id: Uuid, apply: impl FnOnce(&mut RenderStatus)) {
        self.modify(project_id, |entry| {
            if entry.status == RenderState::Rendering {
                apply(entry);
            }
        });
    }

    /// Reset the entry for a new render.
    pub fn begin(&self, project_id: Uuid) {
        self.lock().insert(project_id, RenderStatus::rendering());
        self.changed.notify_waiters();
    }

    /// Raise progress. Progress never moves backwards while rendering.
    pub fn set_progress(&self, project_id: Uuid, progress: f64) {
        self.modify_rendering(project_id, |entry| {
            entry.progress = entry.progress.max(progress.clamp(0.0, 1.0));
        });
    }

    /// Record the latest preview frame. Late frames for a finished or cleared render are dropped.
    pub fn set_preview(&self, project_id: Uuid, url: String) {
        self.modify_rendering(project_id, |entry| entry.preview_image_url = Some(url));
    }

    pub fn complete(&self, project_id: Uuid, output_video_url: String) {
        self.modify(project_id, |entry| {
            entry.status = RenderState::Done;
            entry.progress = 1.0;
            entry.output_video_url = Some(output_video_url);
            entry.error = None;
        });
    }

    pub fn fail(&self, project_id: Uuid, error: String) {
        self.modify(project_id, |entry| {
            entry.status = RenderState::Failed;
            entry.error = Some(error);
        });
    }

    pub fn get(&self, project_id: Uuid) -> Option<RenderStatus> {
        self.lock().get(&project_id).cloned()
    }

    /// Drop a terminal entry. Returns false when the entry is missing or still rendering.
    pub fn clear(&self, project_id: Uuid) -> bool {
        let mut entries = self.lock();
        match entries.get(&project_id) {
            Some(entry) if entry.status.is_terminal() => {
                entries.remove(&project_id);
                true
            }
            _ => false,
        }
    }

    /// Wait until the entry reaches a terminal state. `None` when there is no entry.
    pub async fn wait_terminal(&self, project_id: Uuid) -> Option<RenderStatus> {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            let current = self.get(project_id)?;
            if current.status.is_terminal() {
                return Some(current);
            }
            changed.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotonic() {
        let store = StatusStore::new();
        let id = Uuid::new_v4();
        store.begin(id);
        store.set_progress(id, 0.6);
        store.set_progress(id, 0.4);
        assert_eq!(store.get(id).unwrap().progress, 0.6);
    }

    #[test]
    fn test_clear_only_terminal() {
        let store = StatusStore::new();
        let id = Uuid::new_v4();
        store.begin(id);
        assert!(!store.clear(id));
        store.fail(id, "boom".into());
        assert!(store.clear(id));
        assert!(store.get(id).is_none());
        assert!(!store.clear(id));
    }

    #[test]
    fn test_late_updates_never_recreate_entry() {
        let store = StatusStore::new();
        let id = Uuid::new_v4();
        store.begin(id);
        store.complete(id, "blob://out.mp4".into());
        assert!(store.clear(id));

        store.set_preview(id, "blob://render-previews/job/frame-3.jpg?expires=1".into());
        store.set_progress(id, 0.5);
        assert!(store.get(id).is_none());

        store.begin(id);
        store.fail(id, "boom".into());
        assert!(store.clear(id));
    }

    #[test]
    fn test_preview_ignored_after_completion() {
        let store = StatusStore::new();
        let id = Uuid::new_v4();
        store.begin(id);
        store.set_preview(id, "data:image/jpeg;base64,AAAA".into());
        store.complete(id, "blob://out.mp4".into());
        store.set_preview(id, "blob://late.jpg".into());

        let status = store.get(id).unwrap();
        assert_eq!(status.status, RenderState::Done);
        assert_eq!(status.preview_image_url.as_deref(), Some("data:image/jpeg;base64,AAAA"));
    }

    #[test]
    fn test_overall_progress_mapping() {
        let encoding_half = RenderProgress::new(RenderStage::Encoding, 0.5);
        assert!((overall_progress(encoding_half) - 0.65).abs() < 1e-9);
        assert_eq!(overall_progress(RenderProgress::new(RenderStage::Complete, 1.0)), 1.0);
    }

    #[test]
    fn test_status_serialization() {
        let store = StatusStore::new();
        let id = Uuid::new_v4();
        store.begin(id);
        store.complete(id, "blob://video-assets/u/p/draft-1.mp4".into());
        let json = serde_json::to_value(store.get(id).unwrap()).unwrap();
        assert_eq!(json["status"], "done");
        assert_eq!(json["outputVideoUrl"], "blob://video-assets/u/p/draft-1.mp4");
        assert!(json.get("previewImageUrl").is_none());
    }

    #[tokio::test]
    async fn test_wait_terminal_wakes_on_completion() {
        let store = std::sync::Arc::new(StatusStore::new());
        let id = Uuid::new_v4();
        store.begin(id);

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_terminal(id).await })
        };
        tokio::task::yield_now().await;
        store.complete(id, "blob://out.mp4".into());

        let status = waiter.await.unwrap().unwrap();
        assert_eq!(status.status, RenderState::Done);
    }
}
