//! Clipflow Services
//!
//! The capabilities the planner, renderer and workflow engine consume but do
//! not own:
//! - **Blob store:** key → bytes with presigned retrieval (`blob://` native scheme)
//! - **Keys:** purpose-prefixed storage keys with traversal checks
//! - **Asset fetch:** resolve `blob://`, `http(s)://` and local references to bytes
//! - **Projects:** persisted `VideoProject` records
//! - **Providers:** speech synthesis and text generation backends

pub mod blob;
pub mod error;
pub mod fetch;
pub mod keys;
pub mod projects;
pub mod provider;
pub mod text;
pub mod voice;

pub use blob::{blob_url, key_from_blob_url, BlobStore, InMemoryBlobStore, LocalBlobStore, StoredBlob};
pub use error::{StorageError, StorageResult};
pub use fetch::{AssetFetcher, StoreAssetFetcher};
pub use projects::{InMemoryProjectStore, ProjectStore};
pub use provider::{sanitize_provider_error, ProviderError};
pub use text::{generator_from_config, OpenAiCompatibleGenerator, TextGenerator, TextRequest};
pub use voice::{
    synthesizer_from_config, AudioFormat, RestJsonSynthesizer, SsmlSynthesizer, VoiceClip,
    VoiceRequest, VoiceSynthesizer,
};
