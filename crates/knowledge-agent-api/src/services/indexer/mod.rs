pub mod pipeline;
pub mod scheduler;

pub use pipeline::{IndexerOptions, IndexerResult, IndexingPipeline, RunOutcome};
pub use scheduler::{IndexerScheduler, SchedulerHandle};
