//! Video project persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use clipflow_edl::{ProjectStatus, VideoProject};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// Project record store. Concurrent writers are not excluded; last write wins.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create(&self, project: VideoProject) -> StorageResult<VideoProject>;

    async fn get(&self, id: Uuid) -> StorageResult<VideoProject>;

    async fn set_edl_url(&self, id: Uuid, edl_url: &str) -> StorageResult<VideoProject>;

    async fn set_status(&self, id: Uuid, status: ProjectStatus) -> StorageResult<VideoProject>;

    async fn set_draft_video(&self, id: Uuid, url: &str) -> StorageResult<VideoProject>;

    async fn set_final_video(&self, id: Uuid, url: &str) -> StorageResult<VideoProject>;
}

/// Process-local project store.
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<Uuid, VideoProject>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut VideoProject) + Send,
    ) -> StorageResult<VideoProject> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(&id)
            .ok_or_else(|| StorageError::ProjectNotFound(id.to_string()))?;
        apply(project);
        Ok(project.clone())
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn create(&self, project: VideoProject) -> StorageResult<VideoProject> {
        self.projects
            .write()
            .await
            .insert(project.id, project.clone());
        tracing::debug!(project_id = %project.id, user_id = %project.user_id, "Project created");
        Ok(project)
    }

    async fn get(&self, id: Uuid) -> StorageResult<VideoProject> {
        self.projects
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::ProjectNotFound(id.to_string()))
    }

    async fn set_edl_url(&self, id: Uuid, edl_url: &str) -> StorageResult<VideoProject> {
        self.update(id, |p| p.replace_edl(edl_url, Utc::now())).await
    }

    async fn set_status(&self, id: Uuid, status: ProjectStatus) -> StorageResult<VideoProject> {
        self.update(id, |p| {
            p.status = status;
            p.updated_at = Utc::now();
        })
        .await
    }

    async fn set_draft_video(&self, id: Uuid, url: &str) -> StorageResult<VideoProject> {
        self.update(id, |p| p.record_draft(url, Utc::now())).await
    }

    async fn set_final_video(&self, id: Uuid, url: &str) -> StorageResult<VideoProject> {
        self.update(id, |p| p.record_final(url, Utc::now())).await
    }
}
