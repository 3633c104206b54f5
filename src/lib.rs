//! smoothframe
//!
//! Job queue and transcoding orchestration for frame-rate upsampling.
//!
//! Files are selected and probed for duration and frame rate, committed as
//! jobs, and transcoded one at a time by an external interpolation engine.
//! The [`app::QueueService`] is the entry point; collaborators plug in
//! through the traits in [`ports`].

pub mod adapters;
pub mod app;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod probe;
pub mod utils;

// Re-export commonly used types
pub use app::{QueueService, QueueSnapshot, SchedulerConfig};
pub use domain::errors::DomainError;
pub use domain::model::{
    InterpolationFactor, Job, JobId, JobStatus, MediaMetadata, ObjectUrl, ProcessingError,
    SelectionId, SelectionRecord,
};
pub use engine::EngineState;
pub use error::{SmoothframeError, SmoothframeResult};
