//! Clipflow Render Queue
//!
//! Wraps the render orchestrator in a job queue with two modes, chosen once
//! at start-up from `queue.broker_url`:
//! - **Broker:** jobs are enqueued and a fixed-size worker pool renders them,
//!   retrying with exponential backoff before failing permanently. Preview
//!   frames are uploaded under `render-previews/{job}/`.
//! - **Inline:** the render runs in-process right away and preview frames are
//!   kept inline as `data:` URLs.
//!
//! Either way a successful render stores the draft video and updates the
//! project's `draftVideoUrl`, and progress is polled through [`RenderQueue::status`].

pub mod broker;
pub mod error;
pub mod job;
pub mod queue;
pub mod status;

pub use broker::{retry_delay, InMemoryBroker, JobBroker, JobState, RenderJob, MEMORY_BROKER_URL};
pub use error::{QueueError, QueueResult};
pub use job::RenderDeps;
pub use queue::{QueueMode, QueueSettings, RenderQueue, RenderSubmission, MAX_RETRY_BACKOFF};
pub use status::{overall_progress, RenderState, RenderStatus, StatusStore};
