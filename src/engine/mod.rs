//! Transcoding engine handle
//!
//! Owns the one live [`TranscodeEngine`] and makes its lifetime explicit:
//! `Unloaded -> Loading -> Ready -> Terminated -> Loading ...`, with `Failed`
//! when a load attempt does not succeed. Loading is split into
//! [`EngineHandle::begin_load`] and [`EngineHandle::finish_load`] so the
//! caller can await the engine without holding the queue lock; a load that
//! finishes after the handle moved on is detected by its generation and
//! torn down instead of being installed.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::errors::DomainError;
use crate::domain::model::JobId;
use crate::ports::{EngineFactory, TranscodeEngine};

pub mod progress;

/// Lifecycle state of the engine handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// No engine has been created yet
    Unloaded,
    /// A load is in flight
    Loading,
    /// Engine loaded and usable
    Ready,
    /// Last load attempt failed; nothing is dispatched until a reload succeeds
    Failed,
    /// Engine torn down
    Terminated,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Unloaded => "unloaded",
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
            EngineState::Failed => "failed",
            EngineState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// The job currently driving the engine, with the dispatch ticket that identifies this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveJob {
    pub job_id: JobId,
    pub ticket: u64,
}

/// An in-flight load, produced by `begin_load`
pub struct LoadTicket {
    generation: u64,
    engine: Arc<dyn TranscodeEngine>,
}

impl LoadTicket {
    pub fn engine(&self) -> Arc<dyn TranscodeEngine> {
        Arc::clone(&self.engine)
    }
}

/// Result of installing a finished load
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Ready,
    Failed(DomainError),
    /// The handle was terminated or reloaded while this load was running
    Stale,
}

/// Exclusive owner of the live engine
pub struct EngineHandle {
    factory: Arc<dyn EngineFactory>,
    state: EngineState,
    engine: Option<Arc<dyn TranscodeEngine>>,
    pending: Option<Arc<dyn TranscodeEngine>>,
    generation: u64,
    next_ticket: u64,
    current: Option<ActiveJob>,
}

impl EngineHandle {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            state: EngineState::Unloaded,
            engine: None,
            pending: None,
            generation: 0,
            next_ticket: 0,
            current: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    /// The ready engine, never a stale or half-initialised one
    pub fn engine(&self) -> Option<Arc<dyn TranscodeEngine>> {
        match self.state {
            EngineState::Ready => self.engine.clone(),
            _ => None,
        }
    }

    /// Start a load; `None` when the engine is already ready or loading
    pub fn begin_load(&mut self) -> Option<LoadTicket> {
        if matches!(self.state, EngineState::Ready | EngineState::Loading) {
            debug!(state = %self.state, "Engine load skipped");
            return None;
        }
        self.generation += 1;
        let engine = self.factory.create();
        self.pending = Some(Arc::clone(&engine));
        self.state = EngineState::Loading;
        debug!(generation = self.generation, "Engine load started");
        Some(LoadTicket {
            generation: self.generation,
            engine,
        })
    }

    /// Install the result of a load started by `begin_load`
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<(), DomainError>,
    ) -> LoadOutcome {
        if ticket.generation != self.generation {
            debug!(
                generation = ticket.generation,
                current = self.generation,
                "Discarding stale engine load"
            );
            ticket.engine.terminate();
            return LoadOutcome::Stale;
        }

        self.pending = None;
        match result {
            Ok(()) => {
                self.engine = Some(ticket.engine);
                self.state = EngineState::Ready;
                info!(generation = self.generation, "Transcoding engine ready");
                LoadOutcome::Ready
            }
            Err(error) => {
                ticket.engine.terminate();
                self.engine = None;
                self.state = EngineState::Failed;
                warn!(%error, "Transcoding engine failed to load");
                LoadOutcome::Failed(error)
            }
        }
    }

    /// Tear down the live engine and any load in flight; idempotent
    pub fn terminate(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.terminate();
        }
        if let Some(engine) = self.pending.take() {
            engine.terminate();
        }
        self.generation += 1;
        self.current = None;
        if self.state != EngineState::Terminated {
            info!("Transcoding engine terminated");
        }
        self.state = EngineState::Terminated;
    }

    /// Claim the engine for `job_id`; `None` unless ready and idle
    pub fn claim(&mut self, job_id: JobId) -> Option<ActiveJob> {
        if !self.is_ready() || self.current.is_some() {
            return None;
        }
        self.next_ticket += 1;
        let active = ActiveJob {
            job_id,
            ticket: self.next_ticket,
        };
        self.current = Some(active);
        Some(active)
    }

    pub fn current_job(&self) -> Option<ActiveJob> {
        self.current
    }

    /// Whether the run identified by `ticket` is still the active one
    pub fn is_current(&self, ticket: u64) -> bool {
        self.current.map(|active| active.ticket) == Some(ticket)
    }

    /// Release the claim held by `ticket`; returns false if it was already superseded
    pub fn release(&mut self, ticket: u64) -> bool {
        if self.is_current(ticket) {
            self.current = None;
            true
        } else {
            false
        }
    }
}
