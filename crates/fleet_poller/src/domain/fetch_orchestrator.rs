use crate::domain::{DirectoryListing, TelemetryClient};
use common::domain::TelemetryRecord;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument};

/// Receives completion counts while a fetch is running
pub trait FetchProgress: Send + Sync {
    fn on_progress(&self, completed: usize, total: usize);
}

/// Logs progress every `interval` completions and once at the end
pub struct LogFetchProgress {
    interval: usize,
}

impl LogFetchProgress {
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
        }
    }
}

impl Default for LogFetchProgress {
    fn default() -> Self {
        Self::new(10)
    }
}

impl FetchProgress for LogFetchProgress {
    fn on_progress(&self, completed: usize, total: usize) {
        if completed % self.interval == 0 || completed == total {
            info!(completed, total, "fetch progress");
        }
    }
}

/// Runs the TelemetryClient over a whole directory under a concurrency cap
pub struct FetchOrchestrator {
    client: Arc<TelemetryClient>,
    progress: Arc<dyn FetchProgress>,
}

impl FetchOrchestrator {
    pub fn new(client: Arc<TelemetryClient>, progress: Arc<dyn FetchProgress>) -> Self {
        Self { client, progress }
    }

    /// Fetch every directory entry, at most `max_concurrent` at a time
    ///
    /// Returns one record per entry in completion order. A device whose fetch
    /// panics is reported Offline with its directory address.
    #[instrument(skip(self, directory), fields(total = directory.len()))]
    pub async fn fetch_all(
        &self,
        directory: &DirectoryListing,
        max_concurrent: usize,
    ) -> Vec<TelemetryRecord> {
        let gate = Arc::new(Semaphore::new(max_concurrent.clamp(1, Semaphore::MAX_PERMITS)));
        let mut tasks = JoinSet::new();

        for (name, address) in directory {
            let client = Arc::clone(&self.client);
            let gate = Arc::clone(&gate);
            let name = name.clone();
            let address = address.clone();

            tasks.spawn(async move {
                let fallback = TelemetryRecord::offline(name.clone(), address.clone());
                let Ok(_permit) = gate.acquire_owned().await else {
                    return fallback;
                };

                match AssertUnwindSafe(client.fetch(&name, address.as_deref()))
                    .catch_unwind()
                    .await
                {
                    Ok(record) => record,
                    Err(_) => {
                        error!(device_name = %name, "telemetry fetch panicked, reporting offline");
                        fallback
                    }
                }
            });
        }

        let total = directory.len();
        let mut records = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(record) => records.push(record),
                Err(e) => error!(error = %e, "fetch task did not complete"),
            }
            self.progress.on_progress(records.len(), total);
        }

        records
    }
}
