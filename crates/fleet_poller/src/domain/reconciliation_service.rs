use chrono::{DateTime, Utc};
use common::domain::{
    DeviceAlert, DomainResult, FleetTelemetryRepository, ReconcileBatchInput, ReconcileSummary,
    TelemetryRecord,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Domain service that hands a fetched batch to the telemetry store
pub struct ReconciliationService {
    repository: Arc<dyn FleetTelemetryRepository>,
    toner_alert_threshold: i32,
}

impl ReconciliationService {
    pub fn new(repository: Arc<dyn FleetTelemetryRepository>, toner_alert_threshold: i32) -> Self {
        Self {
            repository,
            toner_alert_threshold,
        }
    }

    /// Reconcile one cycle's records, all observed at `observed_at`
    #[instrument(skip(self, records), fields(record_count = records.len()))]
    pub async fn reconcile(
        &self,
        records: Vec<TelemetryRecord>,
        observed_at: DateTime<Utc>,
    ) -> DomainResult<ReconcileSummary> {
        debug!(threshold = self.toner_alert_threshold, "reconciling fetched records");

        self.repository
            .reconcile(ReconcileBatchInput {
                records,
                observed_at,
                toner_alert_threshold: self.toner_alert_threshold,
            })
            .await
    }

    pub async fn active_alerts(&self) -> DomainResult<Vec<DeviceAlert>> {
        self.repository.list_active_alerts().await
    }
}
