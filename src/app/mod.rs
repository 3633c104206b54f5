// Application layer - Queue service, scheduling and wiring

pub mod container;
pub mod queue;
pub mod reclaimer;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod snapshot;

// Re-export the service surface
pub use container::{AppContainer, DefaultAppContainer};
pub use queue::QueueService;
pub use scheduler::SchedulerConfig;
pub use snapshot::QueueSnapshot;
