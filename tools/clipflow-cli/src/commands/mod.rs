pub mod captions;
pub mod check;
pub mod plan;
pub mod render;
pub mod run;
pub mod validate;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clipflow_common::AppConfig;
use clipflow_edl::Edl;
use clipflow_services::{AssetFetcher, BlobStore, LocalBlobStore, StoreAssetFetcher};

/// Read and validate an EDL file.
pub(crate) fn load_edl(path: &Path) -> anyhow::Result<Edl> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    clipflow_edl::parse_edl(&json).with_context(|| format!("Invalid EDL at {}", path.display()))
}

/// Blob store rooted at `storage.root` and a fetcher over it.
pub(crate) async fn local_storage(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn BlobStore>, Arc<dyn AssetFetcher>)> {
    let store: Arc<dyn BlobStore> = Arc::new(
        LocalBlobStore::new(&config.storage.root)
            .await
            .with_context(|| format!("Failed to open storage at {}", config.storage.root.display()))?,
    );
    let fetcher = Arc::new(StoreAssetFetcher::new(
        store.clone(),
        Duration::from_secs(config.engine.http_timeout_secs),
    ));
    Ok((store, fetcher))
}
