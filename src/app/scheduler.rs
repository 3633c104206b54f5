//! Scheduler
//!
//! Single-flight dispatch of queued jobs onto the transcoding engine.
//!
//! Every mutation of the job collection wakes the pump; the pump waits for a
//! short quiet period (trailing debounce) and then evaluates once: it starts
//! background probes for queued jobs without metadata and, when the engine is
//! ready and idle, claims the oldest eligible job. Claiming and the
//! `queued -> processing` transition happen under the same lock, so at most
//! one job is ever `processing`.
//!
//! A dispatched run is identified by the ticket it got from
//! [`EngineHandle::claim`]. After every suspension point the run re-checks its
//! ticket; cancellation terminates the engine, which voids the ticket, so a
//! run resumed after cancellation stops without touching the registry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use crate::adapters::sources::MemorySource;
use crate::app::reclaimer::ResourceReclaimer;
use crate::app::registry::{JobRegistry, SelectionRegistry};
use crate::app::resolver::{MetadataResolver, ResolverUpdate};
use crate::app::snapshot::QueueSnapshot;
use crate::domain::errors::DomainError;
use crate::domain::model::*;
use crate::domain::rules::{download_name, DispatchRules, InterpolationCommand, RESULT_MIME_TYPE};
use crate::engine::progress::{ProgressSubscription, ProgressTracker};
use crate::engine::{ActiveJob, EngineHandle, EngineState, LoadOutcome};
use crate::ports::*;
use crate::probe::MetadataProber;

/// Scheduler tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Quiet period after the last change before dispatch is evaluated
    pub dispatch_debounce: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dispatch_debounce: Duration::from_millis(100),
        }
    }
}

/// Mutable queue state; only touched between suspension points
pub(crate) struct QueueState {
    pub(crate) selections: SelectionRegistry,
    pub(crate) jobs: JobRegistry,
    pub(crate) engine: EngineHandle,
    pub(crate) resolver: MetadataResolver,
}

impl QueueState {
    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            selections: self.selections.to_vec(),
            jobs: self.jobs.to_vec(),
            engine: self.engine.state(),
            taken_at: chrono::Utc::now(),
        }
    }
}

/// Everything a dispatched run needs once it has left the lock
struct Dispatch {
    active: ActiveJob,
    engine: Arc<dyn TranscodeEngine>,
    source: Arc<dyn ByteSource>,
    factor: InterpolationFactor,
    metadata: MediaMetadata,
}

/// How a dispatched run ended
enum RunOutcome {
    Completed {
        result: Arc<dyn ByteSource>,
        metadata: MediaMetadata,
    },
    Failed(ProcessingError),
    /// The run stopped being the active one (cancelled or engine torn down)
    Superseded,
}

/// State and collaborators shared by the service, the pump and in-flight runs
pub(crate) struct Shared {
    state: Mutex<QueueState>,
    pub(crate) prober: MetadataProber,
    pub(crate) reclaimer: ResourceReclaimer,
    pub(crate) urls: Arc<dyn UrlPort>,
    pub(crate) notifier: Arc<dyn NotifyPort>,
    config: SchedulerConfig,
    wake: Notify,
    snapshots: watch::Sender<QueueSnapshot>,
}

impl Shared {
    pub(crate) fn new(
        engine_factory: Arc<dyn EngineFactory>,
        prober: MetadataProber,
        urls: Arc<dyn UrlPort>,
        notifier: Arc<dyn NotifyPort>,
        config: SchedulerConfig,
    ) -> Self {
        let (snapshots, _) = watch::channel(QueueSnapshot::empty());
        Self {
            state: Mutex::new(QueueState {
                selections: SelectionRegistry::new(),
                jobs: JobRegistry::new(),
                engine: EngineHandle::new(engine_factory),
                resolver: MetadataResolver::new(),
            }),
            prober,
            reclaimer: ResourceReclaimer::new(Arc::clone(&urls)),
            urls,
            notifier,
            config,
            wake: Notify::new(),
            snapshots,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a fresh snapshot of `state`
    pub(crate) fn publish(&self, state: &QueueState) {
        self.snapshots.send_replace(state.snapshot());
    }

    /// Request a (debounced) dispatch evaluation
    pub(crate) fn touch(&self) {
        self.wake.notify_one();
    }

    pub(crate) fn snapshot(&self) -> QueueSnapshot {
        self.snapshots.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshots.subscribe()
    }

    fn notify_all(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            self.notifier.notify(notification);
        }
    }

    /// Pump loop: wait for a change, let bursts settle, evaluate once
    pub(crate) async fn run_pump(self: Arc<Self>) {
        loop {
            self.wake.notified().await;
            while tokio::time::timeout(self.config.dispatch_debounce, self.wake.notified())
                .await
                .is_ok()
            {}
            self.evaluate();
        }
    }

    /// One scheduling pass: background probes plus at most one dispatch
    pub(crate) fn evaluate(self: &Arc<Self>) {
        let (probes, dispatch) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let probes = state.resolver.plan(&state.jobs);
            let dispatch = Self::claim_next(state);
            if dispatch.is_some() {
                self.publish(state);
            }
            (probes, dispatch)
        };

        for (job_id, source) in probes {
            self.spawn_resolution(job_id, source);
        }
        if let Some(dispatch) = dispatch {
            let shared = Arc::clone(self);
            tokio::spawn(async move { shared.run(dispatch).await });
        }
    }

    /// Claim the engine for the oldest eligible job and mark it `processing`
    fn claim_next(state: &mut QueueState) -> Option<Dispatch> {
        if state.jobs.iter().any(Job::is_processing) {
            return None;
        }
        let engine = state.engine.engine()?;
        let job_id = DispatchRules::next_eligible(state.jobs.iter())?.id();
        let active = state.engine.claim(job_id)?;

        let job = state.jobs.get_mut(&job_id)?;
        if let Err(error) = job.start_processing() {
            warn!(%job_id, %error, "Claimed job could not start");
            state.engine.release(active.ticket);
            return None;
        }
        let Some(metadata) = job.metadata() else {
            let _ = job.fail(ProcessingError::Metadata);
            state.engine.release(active.ticket);
            return None;
        };

        info!(%job_id, file_name = job.file_name(), factor = %job.factor(), "Dispatching job");
        Some(Dispatch {
            active,
            engine,
            source: Arc::clone(job.source()),
            factor: job.factor(),
            metadata,
        })
    }

    fn is_current(&self, active: ActiveJob) -> bool {
        self.lock().engine.is_current(active.ticket)
    }

    /// Drive one job through the engine and apply the outcome
    async fn run(self: Arc<Self>, dispatch: Dispatch) {
        let Dispatch {
            active,
            engine,
            source,
            factor,
            metadata,
        } = dispatch;
        let input_name = source.name().to_string();
        let output_name = InterpolationCommand::output_name(active.job_id, &input_name);

        let tracker = Arc::new(ProgressTracker::new(metadata.duration));
        let subscription =
            ProgressSubscription::subscribe(Arc::clone(&engine), self.progress_listener(active, tracker));

        let outcome = match self
            .transcode(&engine, active, &source, &input_name, &output_name, factor, metadata)
            .await
        {
            Ok(outcome) => outcome,
            Err(_) if !self.is_current(active) => RunOutcome::Superseded,
            Err(error) => {
                warn!(job_id = %active.job_id, %error, "Transcode raised an error");
                RunOutcome::Failed(ProcessingError::from_failure_message(&error.to_string()))
            }
        };

        subscription.unsubscribe();
        ResourceReclaimer::delete_virtual_files(engine.as_ref(), &[&input_name, &output_name]).await;

        self.finish(active, outcome);
        self.touch();
    }

    #[allow(clippy::too_many_arguments)]
    async fn transcode(
        &self,
        engine: &Arc<dyn TranscodeEngine>,
        active: ActiveJob,
        source: &Arc<dyn ByteSource>,
        input_name: &str,
        output_name: &str,
        factor: InterpolationFactor,
        metadata: MediaMetadata,
    ) -> Result<RunOutcome, DomainError> {
        let data = source.read_all().await?;
        if !self.is_current(active) {
            return Ok(RunOutcome::Superseded);
        }

        engine.write_file(input_name, data).await?;
        if !self.is_current(active) {
            return Ok(RunOutcome::Superseded);
        }

        let target_frame_rate = factor.target_frame_rate(metadata.frame_rate);
        let args = InterpolationCommand::arguments(input_name, output_name, target_frame_rate);
        debug!(job_id = %active.job_id, ?args, "Executing interpolation command");
        let exit_code = engine.exec(&args).await?;
        if !self.is_current(active) {
            return Ok(RunOutcome::Superseded);
        }
        if exit_code != 0 {
            warn!(job_id = %active.job_id, exit_code, "Engine exited with a failure status");
            return Ok(RunOutcome::Failed(ProcessingError::exit_status(exit_code)));
        }

        let bytes = engine.read_file(output_name).await?;
        if !self.is_current(active) {
            return Ok(RunOutcome::Superseded);
        }

        let result: Arc<dyn ByteSource> = Arc::new(MemorySource::new(
            download_name(input_name),
            RESULT_MIME_TYPE,
            bytes,
        ));
        let probed = self.prober.probe(active.job_id, Arc::clone(&result)).await;
        if !self.is_current(active) {
            return Ok(RunOutcome::Superseded);
        }
        let final_metadata = match probed {
            Ok(outcome) => outcome.metadata,
            Err(failure) => {
                warn!(job_id = %active.job_id, error = %failure.error, "Could not read interpolated result");
                return Ok(RunOutcome::Failed(ProcessingError::Unknown {
                    detail: Some(failure.error.to_string()),
                }));
            }
        };

        Ok(RunOutcome::Completed {
            result,
            metadata: final_metadata,
        })
    }

    /// Apply a run outcome if the run is still the active one
    fn finish(&self, active: ActiveJob, outcome: RunOutcome) {
        let mut state = self.lock();
        if !state.engine.release(active.ticket) {
            debug!(job_id = %active.job_id, "Run superseded, outcome dropped");
            return;
        }
        let Some(job) = state.jobs.get_mut(&active.job_id) else {
            return;
        };

        let applied = match outcome {
            RunOutcome::Completed { result, metadata } => {
                let url = self.urls.create_object_url(result);
                match job.complete(url.clone(), metadata) {
                    Ok(()) => {
                        info!(job_id = %active.job_id, %url, "Job completed");
                        Ok(())
                    }
                    Err(error) => {
                        self.reclaimer.revoke(&url);
                        Err(error)
                    }
                }
            }
            RunOutcome::Failed(processing_error) => {
                error!(job_id = %active.job_id, error = %processing_error, "Job failed");
                job.fail(processing_error)
            }
            RunOutcome::Superseded => job.fail(ProcessingError::Unknown {
                detail: Some("engine run was interrupted".to_string()),
            }),
        };
        if let Err(error) = applied {
            warn!(job_id = %active.job_id, %error, "Could not apply run outcome");
        }
        self.publish(&state);
    }

    fn progress_listener(
        self: &Arc<Self>,
        active: ActiveJob,
        tracker: Arc<ProgressTracker>,
    ) -> ProgressListener {
        let shared = Arc::downgrade(self);
        Arc::new(move |event: ProgressEvent| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let Some(percent) = tracker.observe(event) else {
                return;
            };
            shared.apply_progress(active, percent);
        })
    }

    fn apply_progress(&self, active: ActiveJob, percent: f64) {
        let mut state = self.lock();
        if !state.engine.is_current(active.ticket) {
            return;
        }
        if let Some(job) = state.jobs.get_mut(&active.job_id) {
            if job.record_progress(percent).is_ok() {
                self.publish(&state);
            }
        }
    }

    fn spawn_resolution(self: &Arc<Self>, job_id: JobId, source: Arc<dyn ByteSource>) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let result = shared.prober.probe(job_id, source).await;
            let update = {
                let mut guard = shared.lock();
                let state = &mut *guard;
                let update = state.resolver.apply(&mut state.jobs, result);
                if update != ResolverUpdate::Ignored {
                    shared.publish(state);
                }
                update
            };
            if update != ResolverUpdate::Ignored {
                shared.touch();
            }
        });
    }

    /// Load the engine unless it is ready or already loading
    pub(crate) async fn load_engine(&self) -> EngineState {
        let ticket = {
            let mut state = self.lock();
            let ticket = state.engine.begin_load();
            self.publish(&state);
            ticket
        };
        let Some(ticket) = ticket else {
            return self.lock().engine.state();
        };

        let engine = ticket.engine();
        let result = engine.load().await;

        let (outcome, engine_state) = {
            let mut state = self.lock();
            let outcome = state.engine.finish_load(ticket, result);
            self.publish(&state);
            (outcome, state.engine.state())
        };
        match outcome {
            LoadOutcome::Ready => self.touch(),
            LoadOutcome::Failed(error) => self.notify_all(vec![Notification::EngineLoadFailed {
                detail: error.to_string(),
            }]),
            LoadOutcome::Stale => {}
        }
        engine_state
    }

    /// Cancel the active job: remove it, reclaim it, restart the engine
    pub(crate) async fn cancel(&self, job_id: JobId) -> bool {
        let removed = {
            let mut state = self.lock();
            match state.engine.current_job() {
                Some(active) if active.job_id == job_id => {}
                _ => return false,
            }
            let removed = state.jobs.remove(&job_id);
            state.engine.terminate();
            self.publish(&state);
            removed
        };

        if let Some(job) = removed {
            self.reclaimer.reclaim_job(&job);
        }
        info!(%job_id, "Cancelled active job, restarting engine");

        self.load_engine().await;
        self.touch();
        true
    }

    /// Tear down the engine for good
    pub(crate) fn teardown(&self) {
        let mut state = self.lock();
        state.engine.terminate();
        self.publish(&state);
    }

    pub(crate) fn push_notifications(&self, notifications: Vec<Notification>) {
        self.notify_all(notifications);
    }
}
