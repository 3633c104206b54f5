// Metadata resolver - Background probing of queued jobs that lack metadata

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::app::registry::JobRegistry;
use crate::domain::model::{JobId, ProcessingError};
use crate::domain::rules::DispatchRules;
use crate::ports::ByteSource;
use crate::probe::{ProbeFailure, ProbeOutcome};

/// What applying a probe result did to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverUpdate {
    /// Duration and frame rate merged; the job is now dispatch-eligible
    Resolved,
    /// Probe failed; the job moved to `error` with the `metadata` tag
    Failed,
    /// Job vanished or no longer needs metadata
    Ignored,
}

/// Tracks which jobs have a probe in flight so each is probed at most once at a time
#[derive(Debug, Default)]
pub struct MetadataResolver {
    in_flight: HashSet<JobId>,
}

impl MetadataResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Jobs to probe now; jobs already resolved or already being probed are skipped
    pub fn plan(&mut self, jobs: &JobRegistry) -> Vec<(JobId, Arc<dyn ByteSource>)> {
        let mut planned = Vec::new();
        for job in jobs.iter().filter(|job| DispatchRules::needs_metadata(job)) {
            if self.in_flight.insert(job.id()) {
                planned.push((job.id(), Arc::clone(job.source())));
            }
        }
        planned
    }

    /// Merge a probe result into the registry
    pub fn apply(
        &mut self,
        jobs: &mut JobRegistry,
        result: Result<ProbeOutcome<JobId>, ProbeFailure<JobId>>,
    ) -> ResolverUpdate {
        let id = match &result {
            Ok(outcome) => outcome.id,
            Err(failure) => failure.id,
        };
        self.in_flight.remove(&id);

        let Some(job) = jobs.get_mut(&id) else {
            return ResolverUpdate::Ignored;
        };
        if !DispatchRules::needs_metadata(job) {
            return ResolverUpdate::Ignored;
        }

        match result {
            Ok(outcome) if !outcome.metadata.is_usable() => match job.fail(ProcessingError::Metadata) {
                Ok(()) => {
                    warn!(
                        job_id = %id,
                        duration = outcome.metadata.duration,
                        frame_rate = outcome.metadata.frame_rate,
                        "Job metadata has no usable duration"
                    );
                    ResolverUpdate::Failed
                }
                Err(error) => {
                    warn!(job_id = %id, %error, "Could not fail job");
                    ResolverUpdate::Ignored
                }
            },
            Ok(outcome) => match job.merge_metadata(outcome.metadata) {
                Ok(()) => {
                    info!(
                        job_id = %id,
                        duration = outcome.metadata.duration,
                        frame_rate = outcome.metadata.frame_rate,
                        "Resolved job metadata"
                    );
                    ResolverUpdate::Resolved
                }
                Err(error) => {
                    warn!(job_id = %id, %error, "Could not merge job metadata");
                    ResolverUpdate::Ignored
                }
            },
            Err(failure) => match job.fail(ProcessingError::Metadata) {
                Ok(()) => {
                    warn!(job_id = %id, error = %failure.error, "Job metadata could not be read");
                    ResolverUpdate::Failed
                }
                Err(error) => {
                    warn!(job_id = %id, %error, "Could not fail job");
                    ResolverUpdate::Ignored
                }
            },
        }
    }
}
