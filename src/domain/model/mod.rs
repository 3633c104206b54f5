// Domain models - Queue entities and value types

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::ports::ByteSource;

/// Identifier of a pre-queue selection record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SelectionId(Uuid);

impl SelectionId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SelectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SelectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a queued job, independent of any selection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a host-managed object URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Integer multiplier applied to the source frame rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct InterpolationFactor(u32);

impl InterpolationFactor {
    /// Factors offered as presets to users
    pub const PRESETS: [u32; 6] = [2, 3, 4, 5, 6, 8];

    /// Smallest accepted factor
    pub const MIN: u32 = 2;

    /// Create a factor, rejecting anything below 2
    pub fn new(factor: u32) -> Result<Self, DomainError> {
        if factor < Self::MIN {
            return Err(DomainError::BadArgs(format!(
                "Interpolation factor must be at least {}, got {}",
                Self::MIN,
                factor
            )));
        }
        Ok(Self(factor))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Target frame rate for a given source frame rate
    pub fn target_frame_rate(self, source_frame_rate: f64) -> f64 {
        source_frame_rate * self.0 as f64
    }
}

impl Default for InterpolationFactor {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

impl TryFrom<u32> for InterpolationFactor {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InterpolationFactor> for u32 {
    fn from(factor: InterpolationFactor) -> Self {
        factor.0
    }
}

impl fmt::Display for InterpolationFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

/// Duration and frame rate read from a source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Duration in seconds
    pub duration: f64,
    /// Frames per second
    pub frame_rate: f64,
}

impl MediaMetadata {
    /// Both values are positive and finite, so the job can be scheduled and its progress scaled
    pub fn is_usable(&self) -> bool {
        self.duration.is_finite()
            && self.duration > 0.0
            && self.frame_rate.is_finite()
            && self.frame_rate > 0.0
    }
}

/// Why a job ended in the `error` status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProcessingError {
    /// Duration or frame rate could not be determined
    Metadata,
    /// The host lacks the shared memory primitive the engine needs
    SharedArrayBufferUnavailable,
    /// Anything else, with an optional human-readable detail
    Unknown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl ProcessingError {
    /// Marker the engine puts in its failure message when shared memory is missing
    pub const SHARED_MEMORY_MARKER: &'static str = "SharedArrayBuffer";

    /// Classify a failure raised while a job was being dispatched
    pub fn from_failure_message(message: &str) -> Self {
        if message.contains(Self::SHARED_MEMORY_MARKER) {
            return ProcessingError::SharedArrayBufferUnavailable;
        }
        let detail = if message.trim().is_empty() {
            "Unknown error".to_string()
        } else {
            message.to_string()
        };
        ProcessingError::Unknown {
            detail: Some(detail),
        }
    }

    /// Failure for an engine run that ended with a non-zero exit status
    pub fn exit_status(code: i32) -> Self {
        ProcessingError::Unknown {
            detail: Some(format!("engine exited with a non-zero status: {}", code)),
        }
    }

    /// Tag name as exposed to collaborators
    pub fn tag(&self) -> &'static str {
        match self {
            ProcessingError::Metadata => "metadata",
            ProcessingError::SharedArrayBufferUnavailable => "shared-array-buffer-unavailable",
            ProcessingError::Unknown { .. } => "unknown",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            ProcessingError::Unknown { detail } => detail.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}: {}", self.tag(), detail),
            None => f.write_str(self.tag()),
        }
    }
}

/// Job status with the payload each status owns
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed { processed_url: ObjectUrl },
    Error(ProcessingError),
}

impl JobStatus {
    pub fn name(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed { .. } => "completed",
            JobStatus::Error(_) => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Error(_))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A file chosen by the user but not yet queued
#[derive(Debug, Clone)]
pub struct SelectionRecord {
    id: SelectionId,
    source: Arc<dyn ByteSource>,
    preview_url: ObjectUrl,
    duration: Option<f64>,
    frame_rate: Option<f64>,
    error: bool,
    paused: bool,
}

impl SelectionRecord {
    pub fn new(source: Arc<dyn ByteSource>, preview_url: ObjectUrl) -> Self {
        Self {
            id: SelectionId::new(),
            source,
            preview_url,
            duration: None,
            frame_rate: None,
            error: false,
            paused: false,
        }
    }

    pub fn id(&self) -> SelectionId {
        self.id
    }

    pub fn source(&self) -> &Arc<dyn ByteSource> {
        &self.source
    }

    pub fn file_name(&self) -> &str {
        self.source.name()
    }

    pub fn preview_url(&self) -> &ObjectUrl {
        &self.preview_url
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    /// Set when probing this file failed
    pub fn has_error(&self) -> bool {
        self.error
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the record can be promoted into a job
    pub fn is_valid(&self) -> bool {
        !self.error
    }

    pub(crate) fn apply_metadata(&mut self, metadata: MediaMetadata) {
        self.duration = Some(metadata.duration);
        self.frame_rate = Some(metadata.frame_rate);
    }

    pub(crate) fn mark_error(&mut self) {
        self.error = true;
    }

    pub(crate) fn toggle_paused(&mut self) {
        self.paused = !self.paused;
    }
}

/// One file's requested transcode
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    source: Arc<dyn ByteSource>,
    factor: InterpolationFactor,
    status: JobStatus,
    progress: f64,
    original_url: ObjectUrl,
    duration: Option<f64>,
    frame_rate: Option<f64>,
    paused: bool,
    queued_at: DateTime<Utc>,
}

impl Job {
    /// Promote a selection record; its preview URL moves into the job
    pub fn from_selection(selection: SelectionRecord, factor: InterpolationFactor) -> Self {
        Self {
            id: JobId::new(),
            source: selection.source,
            factor,
            status: JobStatus::Queued,
            progress: 0.0,
            original_url: selection.preview_url,
            duration: selection.duration,
            frame_rate: selection.frame_rate,
            paused: false,
            queued_at: Utc::now(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn source(&self) -> &Arc<dyn ByteSource> {
        &self.source
    }

    pub fn file_name(&self) -> &str {
        self.source.name()
    }

    pub fn factor(&self) -> InterpolationFactor {
        self.factor
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    /// Progress in [0, 100]
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn original_url(&self) -> &ObjectUrl {
        &self.original_url
    }

    /// Present only when the job is completed
    pub fn processed_url(&self) -> Option<&ObjectUrl> {
        match &self.status {
            JobStatus::Completed { processed_url } => Some(processed_url),
            _ => None,
        }
    }

    /// Present only when the job is in the error status
    pub fn error(&self) -> Option<&ProcessingError> {
        match &self.status {
            JobStatus::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    /// Duration and frame rate, only when both are known and usable
    pub fn metadata(&self) -> Option<MediaMetadata> {
        match (self.duration, self.frame_rate) {
            (Some(duration), Some(frame_rate)) => Some(MediaMetadata {
                duration,
                frame_rate,
            })
            .filter(MediaMetadata::is_usable),
            _ => None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn queued_at(&self) -> DateTime<Utc> {
        self.queued_at
    }

    pub fn is_queued(&self) -> bool {
        self.status == JobStatus::Queued
    }

    pub fn is_processing(&self) -> bool {
        self.status == JobStatus::Processing
    }

    /// URLs that must be released when the job goes away
    pub fn owned_urls(&self) -> Vec<ObjectUrl> {
        let mut urls = vec![self.original_url.clone()];
        if let Some(processed) = self.processed_url() {
            urls.push(processed.clone());
        }
        urls
    }

    pub(crate) fn start_processing(&mut self) -> Result<(), DomainError> {
        if self.status != JobStatus::Queued {
            return Err(self.invalid("start processing"));
        }
        self.status = JobStatus::Processing;
        self.progress = 0.0;
        Ok(())
    }

    /// Record a progress value; never moves backwards and never exceeds 100
    pub(crate) fn record_progress(&mut self, percent: f64) -> Result<(), DomainError> {
        if self.status != JobStatus::Processing {
            return Err(self.invalid("record progress"));
        }
        if percent.is_finite() {
            self.progress = self.progress.max(percent.clamp(0.0, 100.0));
        }
        Ok(())
    }

    pub(crate) fn complete(
        &mut self,
        processed_url: ObjectUrl,
        metadata: MediaMetadata,
    ) -> Result<(), DomainError> {
        if self.status != JobStatus::Processing {
            return Err(self.invalid("complete"));
        }
        self.status = JobStatus::Completed { processed_url };
        self.progress = 100.0;
        self.duration = Some(metadata.duration);
        self.frame_rate = Some(metadata.frame_rate);
        Ok(())
    }

    pub(crate) fn fail(&mut self, error: ProcessingError) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(self.invalid("fail"));
        }
        self.status = JobStatus::Error(error);
        Ok(())
    }

    pub(crate) fn merge_metadata(&mut self, metadata: MediaMetadata) -> Result<(), DomainError> {
        if self.status != JobStatus::Queued {
            return Err(self.invalid("merge metadata"));
        }
        self.duration = Some(metadata.duration);
        self.frame_rate = Some(metadata.frame_rate);
        Ok(())
    }

    pub(crate) fn toggle_paused(&mut self) {
        self.paused = !self.paused;
    }

    fn invalid(&self, action: &str) -> DomainError {
        DomainError::InvalidTransition(format!(
            "cannot {} job {} while {}",
            action, self.id, self.status
        ))
    }
}

#[cfg(test)]
mod tests;
