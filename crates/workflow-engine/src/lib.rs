//! Clipflow Workflow Engine
//!
//! Runs node-and-edge workflow graphs:
//! - **Graph:** steps with a closed [`StepKind`] per category, edges with optional handles
//! - **Scheduler:** Kahn ordering over enabled steps, one step at a time per run,
//!   every transition persisted to a [`RunStore`]
//! - **Dispatch:** one [`StepExecutor`] per category, errors normalised to [`StepFailure`]
//! - **Review:** approval gates pause a run until [`WorkflowEngine::resolve_review`]

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod executors;
pub mod graph;
pub mod review;
pub mod run;
pub mod store;

pub use dispatch::{Dispatcher, StepContext, StepExecutor, StepOutcome};
pub use engine::{InitialContext, RunHandle, WorkflowEngine};
pub use error::{EngineError, EngineResult, GraphError, StepError, StepFailure};
pub use executors::{ExecutorServices, ReviewMode, ACTIVE_HANDLE};
pub use graph::{
    Edge, LogicKind, ReviewKind, Step, StepCategory, StepKind, UtilityKind, VideoKind,
    WorkflowGraph,
};
pub use review::{InMemoryReviewStore, Resolution, ReviewSession, ReviewStatus, ReviewStore};
pub use run::{Run, RunStatus, StepLog, StepStatus};
pub use store::{InMemoryRunStore, RunStore};
