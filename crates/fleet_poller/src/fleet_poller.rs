use crate::domain::{
    DeviceDirectory, DevicePageFetcher, FetchOrchestrator, LogFetchProgress,
    ReconciliationService, TelemetryClient,
};
use chrono::Utc;
use common::domain::{DeviceAlert, DeviceStatus, DomainResult, FleetTelemetryRepository, ReconcileSummary};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct FleetPollerConfig {
    pub print_server_address: String,
    pub max_concurrent_requests: usize,
    pub toner_alert_threshold: i32,
    pub offline_alert_hours: i64,
    pub progress_interval: usize,
    /// `None` runs a single cycle
    pub poll_interval: Option<Duration>,
}

impl Default for FleetPollerConfig {
    fn default() -> Self {
        Self {
            print_server_address: "10.3.3.10".to_string(),
            max_concurrent_requests: 10,
            toner_alert_threshold: 10,
            offline_alert_hours: 48,
            progress_interval: 10,
            poll_interval: None,
        }
    }
}

/// What one poll cycle did
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub devices_listed: usize,
    pub devices_online: usize,
    pub summary: ReconcileSummary,
    pub alerts: Vec<DeviceAlert>,
}

/// One poll cycle: directory, fetch, reconcile, report
pub struct FleetPoller {
    directory: Arc<dyn DeviceDirectory>,
    orchestrator: FetchOrchestrator,
    reconciliation: ReconciliationService,
    config: FleetPollerConfig,
}

impl FleetPoller {
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        fetcher: Arc<dyn DevicePageFetcher>,
        repository: Arc<dyn FleetTelemetryRepository>,
        config: FleetPollerConfig,
    ) -> Self {
        let client = Arc::new(TelemetryClient::new(fetcher));
        let progress = Arc::new(LogFetchProgress::new(config.progress_interval));

        Self {
            directory,
            orchestrator: FetchOrchestrator::new(client, progress),
            reconciliation: ReconciliationService::new(repository, config.toner_alert_threshold),
            config,
        }
    }

    #[instrument(skip(self), fields(server = %self.config.print_server_address))]
    pub async fn run_cycle(&self) -> DomainResult<CycleReport> {
        let directory = self
            .directory
            .list_devices(&self.config.print_server_address)
            .await?;

        if directory.is_empty() {
            warn!("directory returned no devices, nothing to poll");
            return Ok(CycleReport::default());
        }
        info!(devices = directory.len(), "polling fleet");

        let records = self
            .orchestrator
            .fetch_all(&directory, self.config.max_concurrent_requests)
            .await;
        let devices_online = records
            .iter()
            .filter(|r| r.status == DeviceStatus::Online)
            .count();

        let summary = self.reconciliation.reconcile(records, Utc::now()).await?;
        info!(
            saved = summary.saved,
            unresolved = summary.unresolved.len(),
            snapshots_written = summary.snapshots_written,
            devices_created = summary.devices_created,
            online = devices_online,
            "poll cycle reconciled"
        );
        for name in &summary.unresolved {
            warn!(device_name = %name, "device has no serial and no history, skipped");
        }

        // Batch is already committed; alert listing is best-effort
        let alerts = match self.reconciliation.active_alerts().await {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!(error = %e, "failed to list active alerts");
                Vec::new()
            }
        };
        self.log_alerts(&alerts);

        Ok(CycleReport {
            devices_listed: directory.len(),
            devices_online,
            summary,
            alerts,
        })
    }

    fn log_alerts(&self, alerts: &[DeviceAlert]) {
        let now = Utc::now();
        for alert in alerts {
            let long_offline = alert.is_long_offline(self.config.offline_alert_hours, now);
            warn!(
                device_id = alert.device_id,
                device_name = %alert.device_name,
                ip_address = alert.ip_address.as_deref().unwrap_or("-"),
                toner_level = ?alert.toner_level,
                toner_alert = alert.toner_alert,
                offline_alert = alert.offline_alert,
                long_offline,
                last_online = ?alert.last_online,
                "device alert"
            );
        }
    }

    /// Run cycles until done or cancelled
    ///
    /// Without a poll interval a single cycle runs and its error is returned.
    /// With one, a failed cycle is logged and the next still runs. A cycle in
    /// progress always finishes; cancellation is observed between cycles.
    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        let Some(interval) = self.config.poll_interval else {
            if ctx.is_cancelled() {
                info!("cancelled before the poll cycle started");
                return Ok(());
            }
            self.run_cycle().await?;
            return Ok(());
        };

        while !ctx.is_cancelled() {
            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "poll cycle failed");
            }

            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("fleet poller stopped");
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
            > + Send,
    > {
        Box::new(move |ctx| Box::pin(async move { self.run(ctx).await }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DirectoryListing, FetchError, MockDeviceDirectory, MockDevicePageFetcher,
    };
    use async_trait::async_trait;
    use common::domain::{DomainError, MockFleetTelemetryRepository};

    fn one_device() -> DirectoryListing {
        DirectoryListing::from([("P1".to_string(), Some("10.0.0.10".to_string()))])
    }

    fn unreachable_fetcher() -> MockDevicePageFetcher {
        let mut fetcher = MockDevicePageFetcher::new();
        fetcher
            .expect_fetch_page()
            .returning(|_, _| Err(FetchError::Timeout));
        fetcher
    }

    /// Directory that cancels the process while the cycle is underway
    struct CancellingDirectory {
        token: CancellationToken,
    }

    #[async_trait]
    impl DeviceDirectory for CancellingDirectory {
        async fn list_devices(&self, _server_address: &str) -> DomainResult<DirectoryListing> {
            self.token.cancel();
            Ok(one_device())
        }
    }

    fn config() -> FleetPollerConfig {
        FleetPollerConfig {
            print_server_address: "10.3.3.10".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_directory_writes_nothing() {
        let mut directory = MockDeviceDirectory::new();
        directory
            .expect_list_devices()
            .withf(|server: &str| server == "10.3.3.10")
            .times(1)
            .returning(|_| Ok(Default::default()));
        let mut fetcher = MockDevicePageFetcher::new();
        fetcher.expect_fetch_page().never();
        let mut repo = MockFleetTelemetryRepository::new();
        repo.expect_reconcile().never();

        let poller = FleetPoller::new(
            Arc::new(directory),
            Arc::new(fetcher),
            Arc::new(repo),
            config(),
        );
        let report = poller.run_cycle().await.unwrap();

        assert_eq!(report.devices_listed, 0);
        assert_eq!(report.summary, ReconcileSummary::default());
    }

    #[tokio::test]
    async fn test_directory_failure_ends_cycle_with_error() {
        let mut directory = MockDeviceDirectory::new();
        directory
            .expect_list_devices()
            .returning(|server| Err(DomainError::DirectoryUnavailable(server.to_string())));
        let mut repo = MockFleetTelemetryRepository::new();
        repo.expect_reconcile().never();

        let poller = FleetPoller::new(
            Arc::new(directory),
            Arc::new(MockDevicePageFetcher::new()),
            Arc::new(repo),
            config(),
        );

        let result = poller.run_cycle().await;
        assert!(matches!(result, Err(DomainError::DirectoryUnavailable(_))));

        let mut failing = MockDeviceDirectory::new();
        failing
            .expect_list_devices()
            .returning(|server| Err(DomainError::DirectoryUnavailable(server.to_string())));
        let poller = FleetPoller::new(
            Arc::new(failing),
            Arc::new(MockDevicePageFetcher::new()),
            Arc::new(MockFleetTelemetryRepository::new()),
            config(),
        );
        assert!(poller.run(CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_polling_loop_survives_failed_cycles_until_cancelled() {
        let mut directory = MockDeviceDirectory::new();
        directory
            .expect_list_devices()
            .returning(|server| Err(DomainError::DirectoryUnavailable(server.to_string())));

        let poller = FleetPoller::new(
            Arc::new(directory),
            Arc::new(MockDevicePageFetcher::new()),
            Arc::new(MockFleetTelemetryRepository::new()),
            FleetPollerConfig {
                poll_interval: Some(Duration::from_millis(5)),
                ..config()
            },
        );

        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            cancel.cancel();
        });

        assert!(poller.run(token).await.is_ok());
    }

    #[tokio::test]
    async fn test_alert_listing_failure_keeps_committed_cycle() {
        let mut directory = MockDeviceDirectory::new();
        directory.expect_list_devices().returning(|_| Ok(one_device()));
        let mut repo = MockFleetTelemetryRepository::new();
        repo.expect_reconcile().times(1).returning(|_| {
            Ok(ReconcileSummary {
                saved: 1,
                ..Default::default()
            })
        });
        repo.expect_list_active_alerts()
            .times(1)
            .returning(|| Err(DomainError::RepositoryError(anyhow::anyhow!("view read failed"))));

        let poller = FleetPoller::new(
            Arc::new(directory),
            Arc::new(unreachable_fetcher()),
            Arc::new(repo),
            config(),
        );

        assert!(poller.run(CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_cycle_in_progress_finishes_after_cancellation() {
        let token = CancellationToken::new();
        let directory = CancellingDirectory {
            token: token.clone(),
        };
        let mut repo = MockFleetTelemetryRepository::new();
        repo.expect_reconcile()
            .times(1)
            .returning(|_| Ok(ReconcileSummary::default()));
        repo.expect_list_active_alerts()
            .times(1)
            .returning(|| Ok(Vec::new()));

        let poller = FleetPoller::new(
            Arc::new(directory),
            Arc::new(unreachable_fetcher()),
            Arc::new(repo),
            FleetPollerConfig {
                poll_interval: Some(Duration::from_secs(60)),
                ..config()
            },
        );

        assert!(poller.run(token).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_no_cycle() {
        let mut directory = MockDeviceDirectory::new();
        directory.expect_list_devices().never();

        let poller = FleetPoller::new(
            Arc::new(directory),
            Arc::new(MockDevicePageFetcher::new()),
            Arc::new(MockFleetTelemetryRepository::new()),
            config(),
        );
        let token = CancellationToken::new();
        token.cancel();

        assert!(poller.run(token).await.is_ok());
    }
}
