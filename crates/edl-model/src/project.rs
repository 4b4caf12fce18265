//! Video project records.
//!
//! A project is created once by the auto-edit step and then updated in place:
//! EDL edits replace `edl_url`, every re-render replaces `draft_video_url`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted project record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProject {
    /// Unique project identifier.
    pub id: Uuid,

    /// Owning user.
    pub user_id: String,

    /// Where the current EDL blob lives.
    pub edl_url: String,

    /// Latest draft render, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_video_url: Option<String>,

    /// Delivered final render, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,

    pub status: ProjectStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a project's renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// EDL planned, nothing rendered yet.
    Draft,
    /// A render is in flight.
    Rendering,
    /// The latest render finished.
    Ready,
    /// The latest render failed.
    Failed,
}

impl VideoProject {
    /// Create a new project pointing at a stored EDL.
    pub fn new(user_id: impl Into<String>, edl_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            edl_url: edl_url.into(),
            draft_video_url: None,
            final_video_url: None,
            status: ProjectStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a finished draft render.
    pub fn record_draft(&mut self, url: impl Into<String>, at: DateTime<Utc>) {
        self.draft_video_url = Some(url.into());
        self.status = ProjectStatus::Ready;
        self.updated_at = at;
    }

    /// Record a finished final render.
    pub fn record_final(&mut self, url: impl Into<String>, at: DateTime<Utc>) {
        self.final_video_url = Some(url.into());
        self.status = ProjectStatus::Ready;
        self.updated_at = at;
    }

    /// Point the project at a replacement EDL.
    pub fn replace_edl(&mut self, url: impl Into<String>, at: DateTime<Utc>) {
        self.edl_url = url.into();
        self.updated_at = at;
    }
}
