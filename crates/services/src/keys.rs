//! Storage key layout.
//!
//! Keys are namespaced by purpose so access can be scoped where presigned URLs
//! are issued:
//!
//! - `video-assets/{user}/{project}/...` EDLs and rendered videos
//! - `render-previews/{job}/...` preview frames of broker-mode renders
//! - `user-assets/{user}/...` uploads and generated media (voiceovers)
//!
//! Keys must not contain `..`, empty segments or a leading `/`.

use crate::error::{StorageError, StorageResult};

pub const VIDEO_ASSETS_PREFIX: &str = "video-assets";
pub const RENDER_PREVIEWS_PREFIX: &str = "render-previews";
pub const USER_ASSETS_PREFIX: &str = "user-assets";

/// Reject keys that could escape their namespace.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key is empty".to_string()));
    }
    if key.starts_with('/') {
        return Err(StorageError::InvalidKey(format!("{key}: leading '/'")));
    }
    if key.contains('\\') {
        return Err(StorageError::InvalidKey(format!("{key}: backslash")));
    }
    for segment in key.split('/') {
        if segment.is_empty() {
            return Err(StorageError::InvalidKey(format!("{key}: empty segment")));
        }
        if segment == ".." || segment == "." {
            return Err(StorageError::InvalidKey(format!("{key}: relative segment")));
        }
    }
    Ok(())
}

/// Key for a file belonging to a project.
pub fn video_asset_key(user_id: &str, project_id: &str, file_name: &str) -> String {
    format!("{VIDEO_ASSETS_PREFIX}/{user_id}/{project_id}/{file_name}")
}

/// Key for a draft render finished at `timestamp_ms`.
pub fn draft_video_key(user_id: &str, project_id: &str, timestamp_ms: i64) -> String {
    video_asset_key(user_id, project_id, &format!("draft-{timestamp_ms}.mp4"))
}

/// Key for a final render finished at `timestamp_ms`.
pub fn final_video_key(user_id: &str, project_id: &str, timestamp_ms: i64) -> String {
    video_asset_key(user_id, project_id, &format!("final-{timestamp_ms}.mp4"))
}

/// Key for an EDL document written at `timestamp_ms`.
pub fn edl_key(user_id: &str, project_id: &str, timestamp_ms: i64) -> String {
    video_asset_key(user_id, project_id, &format!("edl-{timestamp_ms}.json"))
}

/// Key for the `n`th preview frame of a render job.
pub fn render_preview_key(job_id: &str, frame: u64) -> String {
    format!("{RENDER_PREVIEWS_PREFIX}/{job_id}/frame-{frame}.jpg")
}

/// Key for a file in a user's own asset root.
pub fn user_asset_key(user_id: &str, path: &str) -> String {
    format!("{USER_ASSETS_PREFIX}/{user_id}/{}", path.trim_start_matches('/'))
}
