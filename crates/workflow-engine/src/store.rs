//! Run persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use clipflow_services::StorageResult;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::run::Run;

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or replace a run record.
    async fn save(&self, run: &Run) -> StorageResult<()>;

    async fn get(&self, id: Uuid) -> StorageResult<Option<Run>>;
}

#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, Run>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, run: &Run) -> StorageResult<()> {
        self.runs.write().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<Run>> {
        Ok(self.runs.read().await.get(&id).cloned())
    }
}
