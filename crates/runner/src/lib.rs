//! Runs the service's long-lived processes under one cancellation token.
//!
//! - Processes run concurrently; the first error cancels the rest
//! - SIGINT/SIGTERM cancel every process
//! - Closers always run afterwards, bounded by a timeout
//!
//! # Example
//!
//! ```no_run
//! use printfleet_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Runner::new()
//!         .with_named_process("poller", |ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A long-running process; resolves when done or after the token is cancelled
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>
        + Send,
>;

/// Cleanup run once every process has stopped
pub type Closer =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>> + Send>;

pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Closer timeout defaults to 10 seconds
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let name = format!("process-{}", self.app_processes.len());
        self.with_named_process(name, process)
    }

    /// Adds a process whose name appears in lifecycle logs; accepts the boxed
    /// processes returned by `into_runner_process`
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run every process to completion or cancellation, then the closers
    ///
    /// Returns the first process error, if any. A panicking process counts as
    /// an error. The caller decides the exit code.
    pub async fn run(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                tracing::debug!(process = %name, "app process starting");
                (name, process(process_token).await)
            });
        }

        Self::spawn_signal_handlers(token.clone());

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    tracing::debug!(process = %name, "app process completed");
                }
                Ok((name, Err(err))) => {
                    if first_error.is_none() && !token.is_cancelled() {
                        tracing::error!(process = %name, "app process error: {:#}", err);
                        first_error = Some(err);
                    }
                    token.cancel();
                }
                Err(err) => {
                    tracing::error!("app process panicked: {}", err);
                    if first_error.is_none() {
                        first_error = Some(anyhow::anyhow!("app process panicked: {err}"));
                    }
                    token.cancel();
                }
            }

            if token.is_cancelled() {
                break;
            }
        }

        let drain = async {
            while let Some(joined) = join_set.join_next().await {
                if let Ok((name, Err(err))) = joined {
                    tracing::warn!(process = %name, "app process error during shutdown: {:#}", err);
                }
            }
        };
        if tokio::time::timeout(self.closer_timeout, drain).await.is_err() {
            tracing::warn!("app processes did not stop in time, aborting");
        }
        join_set.shutdown().await;

        if !self.closers.is_empty() {
            tracing::debug!("running closers with timeout of {:?}", self.closer_timeout);
            match tokio::time::timeout(self.closer_timeout, Self::run_closers(self.closers)).await
            {
                Ok(()) => tracing::debug!("all closers completed"),
                Err(_) => tracing::error!("closers timed out after {:?}", self.closer_timeout),
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn spawn_signal_handlers(token: CancellationToken) {
        let ctrl_c_token = token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("received shutdown signal");
                    ctrl_c_token.cancel();
                }
                Err(err) => tracing::error!("error setting up signal handler: {}", err),
            }
        });

        #[cfg(unix)]
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    tracing::info!("received SIGTERM signal");
                    token.cancel();
                }
                Err(err) => tracing::error!("error setting up SIGTERM handler: {}", err),
            }
        });
    }

    /// Closers run concurrently; one failing does not stop the others
    async fn run_closers(closers: Vec<Closer>) {
        let mut closer_set = JoinSet::new();
        for closer in closers {
            closer_set.spawn(async move { closer().await });
        }

        while let Some(result) = closer_set.join_next().await {
            match result {
                Ok(Ok(())) => tracing::debug!("closer completed"),
                Ok(Err(err)) => tracing::error!("closer error: {:#}", err),
                Err(err) => tracing::error!("closer panicked: {}", err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_completed_processes_run_closers_and_succeed() {
        let closer_called = Arc::new(AtomicBool::new(false));
        let flag = closer_called.clone();

        let result = Runner::new()
            .with_named_process("one-shot", |_ctx| async move { Ok(()) })
            .with_closer(move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .run()
            .await;

        assert!(result.is_ok());
        assert!(closer_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_process_error_cancels_siblings_and_is_returned() {
        let sibling_cancelled = Arc::new(AtomicBool::new(false));
        let flag = sibling_cancelled.clone();

        let result = Runner::new()
            .with_named_process("long-lived", move |ctx| async move {
                ctx.cancelled().await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_named_process("failing", |_ctx| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(anyhow::anyhow!("directory unavailable"))
            })
            .run()
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("directory unavailable"));
        assert!(sibling_cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_external_cancellation_stops_processes() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let result = Runner::new()
            .with_app_process(|ctx| async move {
                tokio::select! {
                    _ = ctx.cancelled() => Ok(()),
                    _ = tokio::time::sleep(Duration::from_secs(100)) => Ok(()),
                }
            })
            .with_cancellation_token(token)
            .run()
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_panicking_process_is_an_error() {
        let result = Runner::new()
            .with_named_process("panics", |_ctx| async move {
                if true {
                    panic!("boom");
                }
                Ok(())
            })
            .run()
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_all_closers_run_even_when_one_fails() {
        let counter = Arc::new(AtomicUsize::new(0));
        let first = counter.clone();
        let second = counter.clone();

        let runner = Runner::new()
            .with_closer(move || async move {
                first.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("flush failed"))
            })
            .with_closer(move || async move {
                second.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_closer_timeout(Duration::from_secs(1));

        Runner::run_closers(runner.closers).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
