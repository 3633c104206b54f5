//! Per-job progress tracking on top of the engine's time signal

use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::rules::ProgressRules;
use crate::ports::{ListenerId, ProgressEvent, ProgressListener, TranscodeEngine};

/// Turns elapsed-time events for one job into clamped, non-decreasing percentages
#[derive(Debug)]
pub struct ProgressTracker {
    duration: f64,
    last: Mutex<Option<f64>>,
}

impl ProgressTracker {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            last: Mutex::new(None),
        }
    }

    /// Percentage for `event`, or `None` when it would not move progress forward
    pub fn observe(&self, event: ProgressEvent) -> Option<f64> {
        let elapsed = ProgressRules::micros_to_seconds(event.time_micros);
        let percent = ProgressRules::percentage(elapsed, self.duration)?;

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*last, Some(previous) if percent < previous) {
            return None;
        }
        *last = Some(percent);
        Some(percent)
    }

    pub fn last_percentage(&self) -> Option<f64> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Progress listener registration that is removed when dropped
pub struct ProgressSubscription {
    engine: Arc<dyn TranscodeEngine>,
    id: Option<ListenerId>,
}

impl ProgressSubscription {
    pub fn subscribe(engine: Arc<dyn TranscodeEngine>, listener: ProgressListener) -> Self {
        let id = engine.on_progress(listener);
        Self {
            engine,
            id: Some(id),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.engine.off_progress(id);
        }
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.release();
    }
}
