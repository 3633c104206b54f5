// Adapters - Concrete collaborators behind the ports

pub mod engine_memory;
pub mod exec_ffmpeg;
pub mod object_urls;
pub mod probe_libav;
pub mod sources;
pub mod toml_config;
pub mod tracing_log;

// Re-export adapters
pub use engine_memory::{MemoryEngine, MemoryEngineFactory, ScriptedRun};
pub use exec_ffmpeg::{FfmpegEngine, FfmpegEngineFactory};
pub use object_urls::ObjectUrlStore;
pub use probe_libav::ProbeLibavAdapter;
pub use sources::{FileSource, MemorySource};
pub use toml_config::QueueConfig;
pub use tracing_log::TracingNotifier;
