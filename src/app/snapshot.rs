// Snapshots - Immutable projections of the queue handed to the UI layer

use chrono::{DateTime, Utc};

use crate::domain::model::{Job, JobId, SelectionId, SelectionRecord};
use crate::engine::EngineState;

/// Read-only view of both queue stages at one instant
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    /// Selection records, oldest first
    pub selections: Vec<SelectionRecord>,
    /// Jobs, oldest first
    pub jobs: Vec<Job>,
    /// Engine lifecycle state
    pub engine: EngineState,
    pub taken_at: DateTime<Utc>,
}

impl QueueSnapshot {
    pub fn empty() -> Self {
        Self {
            selections: Vec::new(),
            jobs: Vec::new(),
            engine: EngineState::Unloaded,
            taken_at: Utc::now(),
        }
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id() == id)
    }

    pub fn selection(&self, id: SelectionId) -> Option<&SelectionRecord> {
        self.selections.iter().find(|record| record.id() == id)
    }

    pub fn processing_count(&self) -> usize {
        self.jobs.iter().filter(|job| job.is_processing()).count()
    }

    /// Selections that would be queued by a commit
    pub fn valid_selections(&self) -> impl Iterator<Item = &SelectionRecord> {
        self.selections.iter().filter(|record| record.is_valid())
    }
}

impl Default for QueueSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
