// ABOUTME: Main library module for extract-pause
// ABOUTME: Exports the model, API client, pause engine and CLI modules

pub mod cli;
pub mod client;
pub mod engine;
pub mod model;

// Re-export commonly used types
pub use cli::{App, Args, Config};
pub use client::{ClientError, RestClient, TableauApi};
pub use engine::{
    BatchStatus, JsonFileSnapshotStore, MemorySnapshotStore, PauseError, PauseOptions,
    PauseOrchestrator, PauseReport, PausedTaskSnapshot, ResumeReport, ScheduleController,
    SnapshotStore,
};
pub use model::{Entity, EntityKind, EntityRef, Schedule, ScheduleRef, ScheduleState};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
