use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::config::IndexerConfig;

use super::pipeline::{IndexerOptions, IndexingPipeline, RunOutcome};

/// Periodic driver for the pipeline: one pass immediately on startup, then
/// one per interval. Ticks that land while a pass is in flight are dropped
/// by the pipeline's running flag.
pub struct IndexerScheduler;

pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl IndexerScheduler {
    pub fn spawn(
        pipeline: Arc<IndexingPipeline>,
        config: IndexerConfig,
        site_url: Option<String>,
    ) -> SchedulerHandle {
        let (shutdown, mut signal) = watch::channel(false);
        let interval_ms = config.interval_ms.max(1_000);
        let days_back = config.days_back;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let options = IndexerOptions {
                            site_url: site_url.clone(),
                            days_back,
                            skip_embeddings: false,
                            limit: None,
                        };
                        match pipeline.run(options).await {
                            Ok(RunOutcome::Completed(result)) => info!(
                                processed = result.documents_processed,
                                chunks = result.chunks_created,
                                errors = result.errors.len(),
                                "scheduled indexing pass finished"
                            ),
                            Ok(RunOutcome::AlreadyRunning) => {
                                info!("scheduled tick dropped, pass already running")
                            }
                            Err(err) => error!(error = %format!("{err:#}"), "scheduled indexing pass failed"),
                        }
                    }
                    changed = signal.changed() => {
                        if changed.is_err() || *signal.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("indexer scheduler stopped");
        });

        SchedulerHandle { shutdown, task }
    }
}

impl SchedulerHandle {
    /// Cancel the timer; an in-flight pass finishes on its own.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
