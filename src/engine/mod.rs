// ABOUTME: Pause/resume engine for extract refresh tasks
// ABOUTME: Handles dependency resolution, task inventory, snapshots and schedule toggling

pub mod error;
pub mod inventory;
pub mod orchestrator;
pub mod resolver;
pub mod result;
pub mod schedule;
pub mod snapshot;

pub use error::{PauseError, Result, StoreError, TaskOperationError};
pub use inventory::TaskInventory;
pub use orchestrator::{PauseOptions, PauseOrchestrator, DEFAULT_MAX_CONCURRENT};
pub use resolver::{MetadataResolver, Resolution, UpstreamGraph};
pub use result::{
    BatchResult, BatchStatus, BatchSummary, OperationKind, OperationStatus, PauseReport,
    ResumeReport, TaskOutcome,
};
pub use schedule::ScheduleController;
pub use snapshot::{JsonFileSnapshotStore, MemorySnapshotStore, PausedTaskSnapshot, SnapshotStore};
