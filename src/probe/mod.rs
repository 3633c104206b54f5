//! Metadata prober
//!
//! Wraps a [`ProbePort`] with the caller's fallback values and tags every
//! result with the identifier of the record it was issued for, so failures
//! can be routed back to the right selection or job.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::domain::errors::DomainError;
use crate::domain::model::MediaMetadata;
use crate::domain::rules::ProbeDefaults;
use crate::ports::{ByteSource, ProbePort};

/// Successful probe of one source
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome<K> {
    pub id: K,
    pub metadata: MediaMetadata,
}

/// Probe failure carrying the originating identifier
#[derive(Debug, Clone, Error)]
#[error("failed to probe {id}: {error}")]
pub struct ProbeFailure<K: fmt::Display + fmt::Debug> {
    pub id: K,
    pub error: DomainError,
}

/// Reads duration and frame rate, applying defaults for unusable fields
#[derive(Clone)]
pub struct MetadataProber {
    port: Arc<dyn ProbePort>,
    defaults: ProbeDefaults,
}

impl MetadataProber {
    pub fn new(port: Arc<dyn ProbePort>, defaults: ProbeDefaults) -> Self {
        Self { port, defaults }
    }

    pub fn defaults(&self) -> ProbeDefaults {
        self.defaults
    }

    /// Probe one source on behalf of `id`
    pub async fn probe<K>(
        &self,
        id: K,
        source: Arc<dyn ByteSource>,
    ) -> Result<ProbeOutcome<K>, ProbeFailure<K>>
    where
        K: fmt::Display + fmt::Debug,
    {
        debug!(%id, file_name = source.name(), "Probing source");
        match self.port.probe(source).await {
            Ok(raw) => Ok(ProbeOutcome {
                id,
                metadata: self.defaults.resolve(raw.duration, raw.frame_rate),
            }),
            Err(error) => {
                warn!(%id, %error, "Probe failed");
                Err(ProbeFailure { id, error })
            }
        }
    }

    /// Probe every source concurrently; results arrive in completion order
    pub async fn probe_all<K>(
        &self,
        items: Vec<(K, Arc<dyn ByteSource>)>,
    ) -> Vec<Result<ProbeOutcome<K>, ProbeFailure<K>>>
    where
        K: fmt::Display + fmt::Debug + Clone + Send + Sync + 'static,
    {
        let mut results = Vec::with_capacity(items.len());
        let mut set = JoinSet::new();
        for (id, source) in items {
            let prober = self.clone();
            set.spawn(async move { prober.probe(id, source).await });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(join_error) => warn!(%join_error, "Probe task did not finish"),
            }
        }
        results
    }
}
