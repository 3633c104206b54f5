use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use smoothframe::adapters::{
    MemoryEngineFactory, MemorySource, ObjectUrlStore, ScriptedRun, TracingNotifier,
};
use smoothframe::app::{QueueService, QueueSnapshot, SchedulerConfig};
use smoothframe::domain::errors::DomainError;
use smoothframe::domain::model::*;
use smoothframe::domain::rules::{download_name, ProbeDefaults, INTERPOLATION_POLICY};
use smoothframe::engine::EngineState;
use smoothframe::ports::{ByteSource, Notification, NotifyPort, ProbePort, RawMetadata, UrlPort};
use smoothframe::probe::MetadataProber;

/// Test utilities for driving the queue
mod test_utils {
    use super::*;

    /// Probe port answering from a table keyed by file name
    ///
    /// Unknown names fail. Every probe waits until the gate is open.
    pub struct StubProbe {
        entries: HashMap<String, RawMetadata>,
        gate: watch::Receiver<bool>,
    }

    #[async_trait]
    impl ProbePort for StubProbe {
        async fn probe(&self, source: Arc<dyn ByteSource>) -> Result<RawMetadata, DomainError> {
            let mut gate = self.gate.clone();
            let _ = gate.wait_for(|open| *open).await;
            self.entries
                .get(source.name())
                .copied()
                .ok_or_else(|| DomainError::ProbeFail("No video track found".to_string()))
        }
    }

    pub struct Harness {
        pub queue: Arc<QueueService>,
        pub engines: MemoryEngineFactory,
        pub urls: Arc<ObjectUrlStore>,
        pub notifier: Arc<TracingNotifier>,
        pub gate: watch::Sender<bool>,
    }

    pub struct HarnessBuilder {
        engines: MemoryEngineFactory,
        entries: HashMap<String, RawMetadata>,
        gate_open: bool,
    }

    impl HarnessBuilder {
        pub fn new(runs: Vec<ScriptedRun>) -> Self {
            Self {
                engines: MemoryEngineFactory::new(runs),
                entries: HashMap::new(),
                gate_open: true,
            }
        }

        pub fn engines(mut self, engines: MemoryEngineFactory) -> Self {
            self.engines = engines;
            self
        }

        /// Register `name` and its interpolated result with the same timing
        pub fn video(mut self, name: &str, duration: f64, frame_rate: f64) -> Self {
            let metadata = RawMetadata {
                duration: Some(duration),
                frame_rate: Some(frame_rate),
            };
            self.entries.insert(name.to_string(), metadata);
            self.entries.insert(download_name(name), metadata);
            self
        }

        /// Make the interpolated result of `name` unreadable
        pub fn unreadable_result(mut self, name: &str) -> Self {
            self.entries.remove(&download_name(name));
            self
        }

        pub fn gated(mut self) -> Self {
            self.gate_open = false;
            self
        }

        pub fn build(self) -> Harness {
            let (gate, receiver) = watch::channel(self.gate_open);
            let probe = StubProbe {
                entries: self.entries,
                gate: receiver,
            };
            let urls = Arc::new(ObjectUrlStore::new());
            let notifier = Arc::new(TracingNotifier::new());
            let queue = Arc::new(QueueService::new(
                Arc::new(self.engines.clone()),
                MetadataProber::new(Arc::new(probe), ProbeDefaults::default()),
                Arc::clone(&urls) as Arc<dyn UrlPort>,
                Arc::clone(&notifier) as Arc<dyn NotifyPort>,
                SchedulerConfig {
                    dispatch_debounce: Duration::from_millis(5),
                },
            ));
            Harness {
                queue,
                engines: self.engines,
                urls,
                notifier,
                gate,
            }
        }
    }

    pub fn video(name: &str) -> Arc<dyn ByteSource> {
        Arc::new(MemorySource::new(name, "video/mp4", name.as_bytes().to_vec()))
    }

    /// Wait for a snapshot satisfying `predicate`, checking every snapshot seen on the way
    pub async fn wait_until<F>(queue: &QueueService, mut predicate: F) -> QueueSnapshot
    where
        F: FnMut(&QueueSnapshot) -> bool,
    {
        let mut snapshots = queue.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = snapshots.borrow_and_update().clone();
                if predicate(&snapshot) {
                    return snapshot;
                }
                snapshots.changed().await.expect("queue stopped publishing");
            }
        })
        .await
        .expect("timed out waiting for queue state")
    }

    pub async fn wait_for_status(queue: &QueueService, id: JobId, status: &str) -> Job {
        let snapshot = wait_until(queue, |snapshot| {
            snapshot
                .job(id)
                .map_or(false, |job| job.status().name() == status)
        })
        .await;
        snapshot.job(id).cloned().expect("job present")
    }

    /// Select and commit files in one step
    pub async fn enqueue(harness: &Harness, names: &[&str], factor: u32) -> Vec<JobId> {
        let sources = names.iter().map(|name| video(name)).collect();
        harness.queue.select_files(sources).await;
        harness
            .queue
            .commit_to_queue(InterpolationFactor::new(factor).unwrap())
    }
}

use test_utils::*;

#[tokio::test]
async fn test_single_job_completes_with_interpolated_result() {
    let harness = HarnessBuilder::new(vec![ScriptedRun::exit(0)])
        .video("a.mp4", 10.0, 24.0)
        .video("a-interpolated.mp4", 10.0, 48.0)
        .build();
    assert_eq!(harness.queue.start().await, EngineState::Ready);

    let ids = enqueue(&harness, &["a.mp4"], 2).await;
    assert_eq!(ids.len(), 1);

    let job = wait_for_status(&harness.queue, ids[0], "completed").await;
    assert_eq!(job.progress(), 100.0);
    assert_eq!(job.frame_rate(), Some(48.0));
    let processed = job.processed_url().expect("processed URL");
    assert!(harness.urls.resolve(processed).is_some());

    let log = harness.engines.exec_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0][0], "-i");
    assert_eq!(log[0][1], "a.mp4");
    assert_eq!(log[0][2], "-vf");
    assert_eq!(
        log[0][3],
        format!("minterpolate=fps=48:{}", INTERPOLATION_POLICY)
    );
    assert!(log[0][4].starts_with("interpolated-"));
    assert!(log[0][4].ends_with("-a.mp4"));

    harness.queue.shutdown();
}

#[tokio::test]
async fn test_unreadable_result_fails_job() {
    let harness = HarnessBuilder::new(vec![ScriptedRun::exit(0)])
        .video("b.mp4", 4.0, 30.0)
        .unreadable_result("b.mp4")
        .build();
    harness.queue.start().await;

    let ids = enqueue(&harness, &["b.mp4"], 3).await;
    let urls_before_run = harness.urls.created_count();
    let job = wait_for_status(&harness.queue, ids[0], "error").await;

    let error = job.error().expect("error payload");
    assert_eq!(error.tag(), "unknown");
    assert!(error.detail().is_some());
    assert_eq!(job.processed_url(), None);
    assert_eq!(harness.urls.created_count(), urls_before_run);
    assert_eq!(
        harness.engines.exec_log()[0][3],
        format!("minterpolate=fps=90:{}", INTERPOLATION_POLICY)
    );
}

#[tokio::test]
async fn test_zero_duration_job_is_never_dispatched() {
    let harness = HarnessBuilder::new(vec![ScriptedRun::exit(0)])
        .video("still.mp4", 0.0, 30.0)
        .build();
    harness.queue.start().await;

    let ids = enqueue(&harness, &["still.mp4"], 2).await;
    assert_eq!(ids.len(), 1);
    let job = wait_for_status(&harness.queue, ids[0], "error").await;

    assert_eq!(job.error(), Some(&ProcessingError::Metadata));
    assert_eq!(job.processed_url(), None);
    assert!(harness.engines.exec_log().is_empty());
}

#[tokio::test]
async fn test_non_zero_exit_is_unknown_error() {
    let harness = HarnessBuilder::new(vec![ScriptedRun::exit(1)])
        .video("a.mp4", 10.0, 24.0)
        .build();
    harness.queue.start().await;

    let ids = enqueue(&harness, &["a.mp4"], 2).await;
    let job = wait_for_status(&harness.queue, ids[0], "error").await;

    let error = job.error().expect("error payload");
    assert_eq!(error.tag(), "unknown");
    assert!(error.detail().unwrap().contains('1'));
    assert_eq!(job.processed_url(), None);
}

#[tokio::test]
async fn test_shared_memory_failure_does_not_block_the_queue() {
    let harness = HarnessBuilder::new(vec![
        ScriptedRun::fail("SharedArrayBuffer is not defined"),
        ScriptedRun::exit(0),
    ])
    .video("first.mp4", 2.0, 30.0)
    .video("second.mp4", 2.0, 30.0)
    .build();
    harness.queue.start().await;

    let ids = enqueue(&harness, &["first.mp4", "second.mp4"], 2).await;
    let first = wait_for_status(&harness.queue, ids[0], "error").await;
    assert_eq!(
        first.error(),
        Some(&ProcessingError::SharedArrayBufferUnavailable)
    );

    wait_for_status(&harness.queue, ids[1], "completed").await;
}

#[tokio::test]
async fn test_selection_probe_failure_marks_only_that_file() {
    let harness = HarnessBuilder::new(vec![])
        .video("one.mp4", 1.0, 25.0)
        .video("three.mp4", 1.0, 25.0)
        .build();

    let ids = harness
        .queue
        .select_files(vec![video("one.mp4"), video("broken.mp4"), video("three.mp4")])
        .await;
    assert_eq!(ids.len(), 3);

    let snapshot = harness.queue.snapshot();
    let broken = snapshot.selection(ids[1]).unwrap();
    assert!(broken.has_error());
    assert_eq!(broken.duration(), None);
    assert_eq!(snapshot.selection(ids[0]).unwrap().duration(), Some(1.0));
    assert_eq!(snapshot.selection(ids[2]).unwrap().frame_rate(), Some(25.0));
    assert_eq!(snapshot.valid_selections().count(), 2);
    assert_eq!(
        harness.notifier.delivered(),
        vec![Notification::MetadataReadFailed {
            file_name: "broken.mp4".to_string()
        }]
    );

    let broken_preview = broken.preview_url().clone();
    let jobs = harness
        .queue
        .commit_to_queue(InterpolationFactor::default());
    assert_eq!(jobs.len(), 2);
    assert!(harness.queue.snapshot().selections.is_empty());
    assert_eq!(harness.urls.revocations_of(&broken_preview), 1);
}

#[tokio::test]
async fn test_non_video_files_are_rejected() {
    let harness = HarnessBuilder::new(vec![]).build();
    let notes: Arc<dyn ByteSource> =
        Arc::new(MemorySource::new("notes.txt", "text/plain", b"hello".to_vec()));

    let ids = harness.queue.select_files(vec![notes]).await;
    assert!(ids.is_empty());
    assert!(harness.queue.snapshot().selections.is_empty());
    assert_eq!(harness.urls.created_count(), 0);
    assert_eq!(
        harness.notifier.delivered(),
        vec![Notification::InvalidFileType {
            file_name: "notes.txt".to_string()
        }]
    );
}

#[tokio::test]
async fn test_commit_with_nothing_valid_notifies() {
    let harness = HarnessBuilder::new(vec![]).build();
    harness.queue.select_files(vec![video("broken.mp4")]).await;

    let jobs = harness
        .queue
        .commit_to_queue(InterpolationFactor::default());
    assert!(jobs.is_empty());
    assert_eq!(harness.queue.snapshot().selections.len(), 1);
    assert!(harness
        .notifier
        .delivered()
        .contains(&Notification::NoFilesSelected));
}

#[tokio::test]
async fn test_remove_selection_revokes_preview() {
    let harness = HarnessBuilder::new(vec![])
        .video("a.mp4", 1.0, 30.0)
        .build();
    let ids = harness.queue.select_files(vec![video("a.mp4")]).await;
    let preview = harness
        .queue
        .snapshot()
        .selection(ids[0])
        .unwrap()
        .preview_url()
        .clone();

    assert!(harness.queue.remove_selection(ids[0]));
    assert!(!harness.queue.remove_selection(ids[0]));
    assert_eq!(harness.urls.revocations_of(&preview), 1);
    assert_eq!(harness.urls.live_count(), 0);
}

#[tokio::test]
async fn test_jobs_run_in_fifo_order_one_at_a_time() {
    let runs = (0..3)
        .map(|_| ScriptedRun::exit(0).with_delay(Duration::from_millis(20)))
        .collect();
    let harness = HarnessBuilder::new(runs)
        .video("a.mp4", 1.0, 30.0)
        .video("b.mp4", 1.0, 30.0)
        .video("c.mp4", 1.0, 30.0)
        .build();
    harness.queue.start().await;

    let ids = enqueue(&harness, &["a.mp4", "b.mp4", "c.mp4"], 2).await;
    wait_until(&harness.queue, |snapshot| {
        assert!(snapshot.processing_count() <= 1);
        ids.iter().all(|id| {
            snapshot
                .job(*id)
                .map_or(false, |job| job.status().is_terminal())
        })
    })
    .await;

    let inputs: Vec<String> = harness
        .engines
        .exec_log()
        .into_iter()
        .map(|args| args[1].clone())
        .collect();
    assert_eq!(inputs, vec!["a.mp4", "b.mp4", "c.mp4"]);
}

#[tokio::test]
async fn test_job_waits_for_metadata_before_dispatch() {
    let harness = HarnessBuilder::new(vec![ScriptedRun::exit(0)])
        .video("late.mp4", 6.0, 25.0)
        .gated()
        .build();
    harness.queue.start().await;

    let queue = Arc::clone(&harness.queue);
    let selecting = tokio::spawn(async move { queue.select_files(vec![video("late.mp4")]).await });
    wait_until(&harness.queue, |snapshot| snapshot.selections.len() == 1).await;

    let ids = harness
        .queue
        .commit_to_queue(InterpolationFactor::default());
    assert_eq!(ids.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let job = harness.queue.snapshot().job(ids[0]).cloned().unwrap();
    assert!(job.is_queued());
    assert_eq!(job.metadata(), None);
    assert!(harness.engines.exec_log().is_empty());

    harness.gate.send_replace(true);
    let job = wait_for_status(&harness.queue, ids[0], "completed").await;
    assert_eq!(job.duration(), Some(6.0));
    selecting.await.unwrap();
}

#[tokio::test]
async fn test_job_metadata_probe_failure_fails_job() {
    let harness = HarnessBuilder::new(vec![]).gated().build();
    harness.queue.start().await;

    let queue = Arc::clone(&harness.queue);
    let selecting = tokio::spawn(async move { queue.select_files(vec![video("bad.mp4")]).await });
    wait_until(&harness.queue, |snapshot| snapshot.selections.len() == 1).await;
    let ids = harness
        .queue
        .commit_to_queue(InterpolationFactor::default());

    harness.gate.send_replace(true);
    let job = wait_for_status(&harness.queue, ids[0], "error").await;
    assert_eq!(job.error(), Some(&ProcessingError::Metadata));
    assert!(harness.engines.exec_log().is_empty());
    selecting.await.unwrap();
}

#[tokio::test]
async fn test_progress_is_monotonic_and_clamped() {
    let run = ScriptedRun::exit(0)
        .with_progress([2_000_000, 5_000_000, 3_000_000, 15_000_000])
        .with_delay(Duration::from_millis(30));
    let harness = HarnessBuilder::new(vec![run])
        .video("a.mp4", 10.0, 24.0)
        .build();
    harness.queue.start().await;

    let ids = enqueue(&harness, &["a.mp4"], 2).await;
    let mut last = 0.0;
    let mut peak_while_processing = 0.0;
    wait_until(&harness.queue, |snapshot| {
        let Some(job) = snapshot.job(ids[0]) else {
            return false;
        };
        assert!(job.progress() >= last);
        assert!(job.progress() <= 100.0);
        last = job.progress();
        if job.is_processing() {
            peak_while_processing = job.progress();
        }
        job.status().is_terminal()
    })
    .await;

    assert_eq!(last, 100.0);
    assert!(peak_while_processing <= 100.0);
}

#[tokio::test]
async fn test_cancel_active_job_restarts_engine() {
    let harness = HarnessBuilder::new(vec![
        ScriptedRun::hang().with_progress([2_000_000]),
        ScriptedRun::exit(0),
    ])
    .video("long.mp4", 10.0, 24.0)
    .video("next.mp4", 2.0, 24.0)
    .build();
    harness.queue.start().await;

    let ids = enqueue(&harness, &["long.mp4", "next.mp4"], 2).await;
    let snapshot = wait_until(&harness.queue, |snapshot| {
        snapshot
            .job(ids[0])
            .map_or(false, |job| job.is_processing() && job.progress() > 0.0)
    })
    .await;
    let original = snapshot.job(ids[0]).unwrap().original_url().clone();

    assert!(harness.queue.remove_job(ids[0]).await);
    assert!(harness.queue.snapshot().job(ids[0]).is_none());

    wait_for_status(&harness.queue, ids[1], "completed").await;
    assert!(harness.queue.snapshot().job(ids[0]).is_none());
    assert_eq!(harness.urls.revocations_of(&original), 1);
    assert_eq!(harness.engines.created_count(), 2);
    assert!(harness.engines.terminated_count() >= 1);
    assert_eq!(harness.queue.engine_state(), EngineState::Ready);
}

#[tokio::test]
async fn test_cancel_is_noop_for_inactive_jobs() {
    let harness = HarnessBuilder::new(vec![])
        .video("a.mp4", 1.0, 30.0)
        .build();
    let ids = enqueue(&harness, &["a.mp4"], 2).await;

    assert!(!harness.queue.cancel_job(ids[0]).await);
    assert!(harness.queue.snapshot().job(ids[0]).is_some());
    assert_eq!(harness.engines.terminated_count(), 0);
}

#[tokio::test]
async fn test_removing_completed_job_revokes_both_urls() {
    let harness = HarnessBuilder::new(vec![ScriptedRun::exit(0)])
        .video("a.mp4", 1.0, 30.0)
        .build();
    harness.queue.start().await;

    let ids = enqueue(&harness, &["a.mp4"], 2).await;
    let job = wait_for_status(&harness.queue, ids[0], "completed").await;

    assert!(harness.queue.remove_job(ids[0]).await);
    for url in job.owned_urls() {
        assert_eq!(harness.urls.revocations_of(&url), 1);
    }
    assert_eq!(harness.urls.live_count(), 0);
    assert!(!harness.queue.remove_job(ids[0]).await);
}

#[tokio::test]
async fn test_engine_load_failure_leaves_queue_idle() {
    let engines = MemoryEngineFactory::default().with_load_failures(1);
    let harness = HarnessBuilder::new(vec![])
        .engines(engines)
        .video("a.mp4", 1.0, 30.0)
        .build();

    assert_eq!(harness.queue.start().await, EngineState::Failed);
    assert!(matches!(
        harness.notifier.delivered().as_slice(),
        [Notification::EngineLoadFailed { .. }]
    ));

    let ids = enqueue(&harness, &["a.mp4"], 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.queue.snapshot().job(ids[0]).unwrap().is_queued());
    assert!(harness.engines.exec_log().is_empty());

    assert_eq!(harness.queue.start().await, EngineState::Ready);
    wait_for_status(&harness.queue, ids[0], "completed").await;
}

#[tokio::test]
async fn test_virtual_files_are_cleaned_up() {
    let harness = HarnessBuilder::new(vec![ScriptedRun::exit(0), ScriptedRun::exit(2)])
        .video("ok.mp4", 1.0, 30.0)
        .video("bad.mp4", 1.0, 30.0)
        .build();
    harness.queue.start().await;

    let ids = enqueue(&harness, &["ok.mp4", "bad.mp4"], 2).await;
    wait_for_status(&harness.queue, ids[0], "completed").await;
    wait_for_status(&harness.queue, ids[1], "error").await;

    for engine in harness.engines.engines() {
        assert!(engine.file_names().is_empty());
        assert_eq!(engine.listener_count(), 0);
    }
}

#[tokio::test]
async fn test_pause_flags_toggle_without_affecting_dispatch() {
    let harness = HarnessBuilder::new(vec![ScriptedRun::exit(0)])
        .video("a.mp4", 1.0, 30.0)
        .build();

    let selection = harness.queue.select_files(vec![video("a.mp4")]).await[0];
    assert_eq!(harness.queue.toggle_selection_pause(selection), Some(true));
    assert_eq!(harness.queue.toggle_selection_pause(selection), Some(false));
    assert_eq!(harness.queue.toggle_selection_pause(SelectionId::new()), None);

    let ids = harness
        .queue
        .commit_to_queue(InterpolationFactor::default());
    assert_eq!(harness.queue.toggle_job_pause(ids[0]), Some(true));

    harness.queue.start().await;
    let job = wait_for_status(&harness.queue, ids[0], "completed").await;
    assert!(job.is_paused());
}
