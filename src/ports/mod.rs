// Ports - Interface definitions (contracts) for the queue's collaborators

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::*;
use crate::domain::model::*;

/// Byte-addressable blob with a known size
#[async_trait]
pub trait ByteSource: Send + Sync + fmt::Debug {
    /// File name shown to users and used as the engine input name
    fn name(&self) -> &str;

    /// Size in bytes
    fn size(&self) -> u64;

    /// MIME type, e.g. `video/mp4`
    fn mime_type(&self) -> &str;

    /// Read the half-open byte range `[start, end)`
    async fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>, DomainError>;

    /// Read the whole blob
    async fn read_all(&self) -> Result<Vec<u8>, DomainError> {
        self.read_range(0, self.size()).await
    }

    /// Path on disk when the blob is backed by a local file
    fn local_path(&self) -> Option<&Path> {
        None
    }

    fn is_video(&self) -> bool {
        self.mime_type().starts_with("video/")
    }
}

/// Values read from a container before defaults are applied
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawMetadata {
    pub duration: Option<f64>,
    pub frame_rate: Option<f64>,
}

/// Port for reading duration and frame rate from a source
#[async_trait]
pub trait ProbePort: Send + Sync {
    /// Read container metadata; fails when there is no video track or the source cannot be parsed
    async fn probe(&self, source: Arc<dyn ByteSource>) -> Result<RawMetadata, DomainError>;
}

/// Elapsed decode time reported while a command runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Elapsed output time in microseconds
    pub time_micros: i64,
}

/// Registration token returned by `TranscodeEngine::on_progress`
pub type ListenerId = u64;

/// Callback receiving progress events
pub type ProgressListener = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Port for the external frame-interpolation engine
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Initialise the engine; a no-op when already loaded
    async fn load(&self) -> Result<(), DomainError>;

    fn is_loaded(&self) -> bool;

    /// Write a file into the engine's private namespace
    async fn write_file(&self, name: &str, data: Vec<u8>) -> Result<(), DomainError>;

    /// Read a file from the engine's private namespace
    async fn read_file(&self, name: &str) -> Result<Vec<u8>, DomainError>;

    /// Delete a file from the engine's private namespace
    async fn delete_file(&self, name: &str) -> Result<(), DomainError>;

    /// Run one command and return its exit status
    async fn exec(&self, args: &[String]) -> Result<i32, DomainError>;

    /// Subscribe to progress events
    fn on_progress(&self, listener: ProgressListener) -> ListenerId;

    /// Drop a progress subscription; unknown ids are ignored
    fn off_progress(&self, id: ListenerId);

    /// Tear the engine down; safe to call more than once
    fn terminate(&self);
}

/// Creates fresh, unloaded engines
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Arc<dyn TranscodeEngine>;
}

/// Port for host-managed object URLs
pub trait UrlPort: Send + Sync {
    fn create_object_url(&self, source: Arc<dyn ByteSource>) -> ObjectUrl;

    /// Release a URL; fails for unknown or already revoked URLs
    fn revoke_object_url(&self, url: &ObjectUrl) -> Result<(), DomainError>;
}

/// User-visible warnings and errors decided by the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    InvalidFileType { file_name: String },
    NoFilesSelected,
    EngineLoadFailed { detail: String },
    MetadataReadFailed { file_name: String },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::InvalidFileType { file_name } => {
                write!(f, "{} is not a video file", file_name)
            }
            Notification::NoFilesSelected => write!(f, "No valid files selected"),
            Notification::EngineLoadFailed { detail } => {
                write!(f, "Transcoding engine failed to load: {}", detail)
            }
            Notification::MetadataReadFailed { file_name } => {
                write!(f, "Could not read video metadata from {}", file_name)
            }
        }
    }
}

/// Fire-and-forget channel for user notifications
pub trait NotifyPort: Send + Sync {
    fn notify(&self, notification: Notification);
}
