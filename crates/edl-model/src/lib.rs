//! Clipflow EDL Model
//!
//! Defines the contract between planning and rendering:
//! - **Edl:** Timeline of trimmed clips, text overlays, audio mix, color grade, output format
//! - **Validation:** Strict schema and invariant checks with documented default-filling
//! - **VideoProject:** The persisted record that points at a project's EDL and renders
//!
//! All times are seconds. Timeline `start_sec` values live on the output
//! timeline axis; `in_sec`/`out_sec` live on the source clip axis.

pub mod edl;
pub mod project;
pub mod validate;

pub use edl::*;
pub use project::*;
pub use validate::*;
