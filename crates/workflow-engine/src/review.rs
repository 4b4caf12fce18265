//! Review sessions: pending human approvals keyed by `(run_id, step_id)`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clipflow_edl::Edl;
use clipflow_services::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Resolved,
}

/// A checkpoint waiting on a reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSession {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    /// EDL under review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edl_url: Option<String>,
    pub status: ReviewStatus,
    /// Auto-approve after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ReviewSession {
    pub fn pending(run_id: Uuid, step_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            step_id: step_id.into(),
            project_id: None,
            edl_url: None,
            status: ReviewStatus::Pending,
            expires_at: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ReviewStatus::Pending && self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A reviewer's answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Keep the EDL as planned.
    Approve,
    /// Replace the EDL. `None` keeps the current one.
    Edit { edl: Option<Box<Edl>> },
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Insert or update the session for `(run_id, step_id)`.
    ///
    /// An existing session keeps its id and creation time.
    async fn upsert(&self, session: ReviewSession) -> StorageResult<ReviewSession>;

    async fn get(&self, run_id: Uuid, step_id: &str) -> StorageResult<Option<ReviewSession>>;

    async fn resolve(&self, id: Uuid, at: DateTime<Utc>) -> StorageResult<ReviewSession>;

    async fn pending(&self) -> StorageResult<Vec<ReviewSession>>;
}

#[derive(Debug, Default)]
pub struct InMemoryReviewStore {
    sessions: RwLock<HashMap<(Uuid, String), ReviewSession>>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl ReviewStore for InMemoryReviewStore {
    async fn upsert(&self, mut session: ReviewSession) -> StorageResult<ReviewSession> {
        let mut sessions = self.sessions.write().await;
        let key = (session.run_id, session.step_id.clone());
        if let Some(existing) = sessions.get(&key) {
            session.id = existing.id;
            session.created_at = existing.created_at;
        }
        sessions.insert(key, session.clone());
        Ok(session)
    }

    async fn get(&self, run_id: Uuid, step_id: &str) -> StorageResult<Option<ReviewSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&(run_id, step_id.to_string()))
            .cloned())
    }

    async fn resolve(&self, id: Uuid, at: DateTime<Utc>) -> StorageResult<ReviewSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .values_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("review session {id}")))?;
        session.status = ReviewStatus::Resolved;
        session.resolved_at = Some(at);
        Ok(session.clone())
    }

    async fn pending(&self) -> StorageResult<Vec<ReviewSession>> {
        let mut pending: Vec<ReviewSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.status == ReviewStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|s| s.created_at);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryReviewStore::new();
        let run_id = Uuid::new_v4();

        let first = store.upsert(ReviewSession::pending(run_id, "gate")).await.unwrap();
        let mut again = ReviewSession::pending(run_id, "gate");
        again.edl_url = Some("blob://edl-2.json".into());
        let second = store.upsert(again).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        let stored = store.get(run_id, "gate").await.unwrap().unwrap();
        assert_eq!(stored.edl_url.as_deref(), Some("blob://edl-2.json"));
    }

    #[tokio::test]
    async fn test_resolve_removes_from_pending() {
        let store = InMemoryReviewStore::new();
        let session = store
            .upsert(ReviewSession::pending(Uuid::new_v4(), "gate"))
            .await
            .unwrap();
        assert_eq!(store.pending().await.unwrap().len(), 1);

        let resolved = store.resolve(session.id, Utc::now()).await.unwrap();
        assert_eq!(resolved.status, ReviewStatus::Resolved);
        assert!(store.pending().await.unwrap().is_empty());
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let mut session = ReviewSession::pending(Uuid::new_v4(), "gate");
        assert!(!session.is_expired(now));
        session.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(session.is_expired(now));
        session.status = ReviewStatus::Resolved;
        assert!(!session.is_expired(now));
    }
}
