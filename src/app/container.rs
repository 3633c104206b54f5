// App container - Wires adapters into the queue service

use std::sync::Arc;

use tracing::info;

use crate::adapters::{
    FfmpegEngineFactory, MemoryEngineFactory, ObjectUrlStore, ProbeLibavAdapter, QueueConfig,
    TracingNotifier,
};
use crate::app::queue::QueueService;
use crate::error::SmoothframeResult;
use crate::ports::{EngineFactory, NotifyPort, ProbePort, UrlPort};
use crate::probe::MetadataProber;

pub trait AppContainer: Send + Sync {
    fn queue(&self) -> Arc<QueueService>;
    fn urls(&self) -> Arc<ObjectUrlStore>;
}

pub struct DefaultAppContainer {
    queue: Arc<QueueService>,
    urls: Arc<ObjectUrlStore>,
}

impl DefaultAppContainer {
    /// libav prober and ffmpeg process engine
    pub fn new(config: &QueueConfig) -> SmoothframeResult<Self> {
        let engines = Arc::new(FfmpegEngineFactory::new(config.ffmpeg_path.clone()));
        Self::with_engines(config, engines)
    }

    /// libav prober with the scripted in-memory engine; every run succeeds
    pub fn simulated(config: &QueueConfig) -> SmoothframeResult<Self> {
        info!("Using the in-memory engine");
        Self::with_engines(config, Arc::new(MemoryEngineFactory::default()))
    }

    pub fn with_engines(
        config: &QueueConfig,
        engines: Arc<dyn EngineFactory>,
    ) -> SmoothframeResult<Self> {
        let probe_port = Arc::new(ProbeLibavAdapter::new()?);
        Self::with_ports(config, engines, probe_port)
    }

    pub fn with_ports(
        config: &QueueConfig,
        engines: Arc<dyn EngineFactory>,
        probe_port: Arc<dyn ProbePort>,
    ) -> SmoothframeResult<Self> {
        let prober = MetadataProber::new(probe_port, config.probe_defaults()?);
        let urls = Arc::new(ObjectUrlStore::new());
        let notifier: Arc<dyn NotifyPort> = Arc::new(TracingNotifier::new());

        let queue = Arc::new(QueueService::new(
            engines,
            prober,
            Arc::clone(&urls) as Arc<dyn UrlPort>,
            notifier,
            config.scheduler_config(),
        ));

        Ok(Self { queue, urls })
    }
}

impl AppContainer for DefaultAppContainer {
    fn queue(&self) -> Arc<QueueService> {
        Arc::clone(&self.queue)
    }

    fn urls(&self) -> Arc<ObjectUrlStore> {
        Arc::clone(&self.urls)
    }
}
