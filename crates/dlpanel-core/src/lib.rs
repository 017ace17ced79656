pub mod config;
pub mod error;
pub mod logging;

// Request side: catalog items and their resolution into transfer specs.
pub mod catalog;
pub mod filename;
pub mod resolver;

// Execution side: one worker and one process per job class.
pub mod cancel;
pub mod control;
pub mod coordinator;
pub mod engine;
pub mod executor;
pub mod job;
pub mod progress;
pub mod status;
pub mod tool;

pub use engine::Engine;
pub use job::{JobKind, StartAck, StopAck};
pub use resolver::{JobRequest, TransferSpec};
pub use status::{JobState, JobStatus};
