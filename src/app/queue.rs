//! Queue service
//!
//! The operations the UI layer drives: selecting files, committing them as
//! jobs, removing and cancelling, toggling preview playback. Every mutation
//! publishes a fresh [`QueueSnapshot`]; mutations of the job collection also
//! wake the scheduling pump.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::scheduler::{SchedulerConfig, Shared};
use crate::app::snapshot::QueueSnapshot;
use crate::domain::model::*;
use crate::engine::EngineState;
use crate::ports::*;
use crate::probe::MetadataProber;

/// Owner of the selection and job registries and of the scheduling pump
pub struct QueueService {
    shared: Arc<Shared>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl QueueService {
    pub fn new(
        engine_factory: Arc<dyn EngineFactory>,
        prober: MetadataProber,
        urls: Arc<dyn UrlPort>,
        notifier: Arc<dyn NotifyPort>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(engine_factory, prober, urls, notifier, config)),
            pump: Mutex::new(None),
        }
    }

    /// Spawn the scheduling pump and load the engine
    ///
    /// Must be called from within a tokio runtime. Calling it again only
    /// retries a load if the engine is not ready or loading.
    pub async fn start(&self) -> EngineState {
        {
            let mut pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner);
            if pump.is_none() {
                *pump = Some(tokio::spawn(Arc::clone(&self.shared).run_pump()));
                debug!("Scheduling pump started");
            }
        }
        let state = self.shared.load_engine().await;
        self.shared.touch();
        state
    }

    /// Stop dispatching and terminate the engine
    pub fn shutdown(&self) {
        if let Some(pump) = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pump.abort();
        }
        self.shared.teardown();
        info!("Queue service shut down");
    }

    /// Add files to the selection stage and probe them concurrently
    ///
    /// Returns the ids of accepted files in input order.
    pub async fn select_files(&self, sources: Vec<Arc<dyn ByteSource>>) -> Vec<SelectionId> {
        let mut notifications = Vec::new();
        let mut accepted = Vec::new();
        for source in sources {
            if !source.is_video() {
                warn!(
                    file_name = source.name(),
                    mime_type = source.mime_type(),
                    "Rejected non-video file"
                );
                notifications.push(Notification::InvalidFileType {
                    file_name: source.name().to_string(),
                });
                continue;
            }
            let preview_url = self.shared.urls.create_object_url(Arc::clone(&source));
            accepted.push(SelectionRecord::new(source, preview_url));
        }

        let to_probe: Vec<(SelectionId, Arc<dyn ByteSource>)> = accepted
            .iter()
            .map(|record| (record.id(), Arc::clone(record.source())))
            .collect();
        let ids: Vec<SelectionId> = to_probe.iter().map(|(id, _)| *id).collect();

        if !accepted.is_empty() {
            let mut state = self.shared.lock();
            for record in accepted {
                debug!(selection_id = %record.id(), file_name = record.file_name(), "File selected");
                state.selections.insert(record);
            }
            self.shared.publish(&state);
        }

        let results = self.shared.prober.probe_all(to_probe).await;

        if !results.is_empty() {
            let mut state = self.shared.lock();
            for result in results {
                match result {
                    Ok(outcome) => {
                        if let Some(record) = state.selections.get_mut(&outcome.id) {
                            record.apply_metadata(outcome.metadata);
                        }
                    }
                    Err(failure) => {
                        if let Some(record) = state.selections.get_mut(&failure.id) {
                            record.mark_error();
                            notifications.push(Notification::MetadataReadFailed {
                                file_name: record.file_name().to_string(),
                            });
                        }
                    }
                }
            }
            self.shared.publish(&state);
        }

        self.shared.push_notifications(notifications);
        ids
    }

    /// Drop a selection and release its preview URL
    pub fn remove_selection(&self, id: SelectionId) -> bool {
        let removed = {
            let mut state = self.shared.lock();
            let removed = state.selections.remove(&id);
            if removed.is_some() {
                self.shared.publish(&state);
            }
            removed
        };
        match removed {
            Some(record) => {
                self.shared.reclaimer.reclaim_selection(&record);
                true
            }
            None => false,
        }
    }

    /// Promote every valid selection into a queued job, oldest first
    ///
    /// Errored selections are discarded. With nothing valid to queue the
    /// selections are left untouched and `NoFilesSelected` is sent.
    pub fn commit_to_queue(&self, factor: InterpolationFactor) -> Vec<JobId> {
        let (queued, discarded) = {
            let mut state = self.shared.lock();
            if !state.selections.iter().any(SelectionRecord::is_valid) {
                drop(state);
                self.shared.push_notifications(vec![Notification::NoFilesSelected]);
                return Vec::new();
            }

            let mut queued = Vec::new();
            let mut discarded = Vec::new();
            for record in state.selections.drain() {
                if record.is_valid() {
                    let job = Job::from_selection(record, factor);
                    info!(job_id = %job.id(), file_name = job.file_name(), %factor, "Job queued");
                    queued.push(job.id());
                    state.jobs.insert(job);
                } else {
                    discarded.push(record);
                }
            }
            self.shared.publish(&state);
            (queued, discarded)
        };

        for record in &discarded {
            self.shared.reclaimer.reclaim_selection(record);
        }
        self.shared.touch();
        queued
    }

    /// Remove a job; removing the active job cancels it
    pub async fn remove_job(&self, id: JobId) -> bool {
        let removed = {
            let mut state = self.shared.lock();
            if state.engine.current_job().map(|active| active.job_id) == Some(id) {
                None
            } else {
                let removed = state.jobs.remove(&id);
                if removed.is_some() {
                    self.shared.publish(&state);
                }
                Some(removed)
            }
        };

        match removed {
            None => self.cancel_job(id).await,
            Some(Some(job)) => {
                debug!(job_id = %id, status = %job.status(), "Job removed");
                self.shared.reclaimer.reclaim_job(&job);
                self.shared.touch();
                true
            }
            Some(None) => false,
        }
    }

    /// Cancel the active job; a no-op for any other job
    pub async fn cancel_job(&self, id: JobId) -> bool {
        self.shared.cancel(id).await
    }

    /// Flip a selection's preview playback flag; returns the new value
    pub fn toggle_selection_pause(&self, id: SelectionId) -> Option<bool> {
        let mut state = self.shared.lock();
        let record = state.selections.get_mut(&id)?;
        record.toggle_paused();
        let paused = record.is_paused();
        self.shared.publish(&state);
        Some(paused)
    }

    /// Flip a job's preview playback flag; returns the new value
    pub fn toggle_job_pause(&self, id: JobId) -> Option<bool> {
        let mut state = self.shared.lock();
        let job = state.jobs.get_mut(&id)?;
        job.toggle_paused();
        let paused = job.is_paused();
        self.shared.publish(&state);
        Some(paused)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.shared.snapshot()
    }

    /// Receive a snapshot after every mutation
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.shared.subscribe()
    }

    pub fn engine_state(&self) -> EngineState {
        self.shared.lock().engine.state()
    }
}

impl Drop for QueueService {
    fn drop(&mut self) {
        if let Some(pump) = self
            .pump
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pump.abort();
        }
    }
}
