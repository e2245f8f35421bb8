use crate::domain::device::{CurrentState, DeviceAlert, DeviceId, HistorySnapshot, UsageLog};
use crate::domain::result::DomainResult;
use crate::domain::telemetry_record::TelemetryRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One poll cycle's worth of records, reconciled as a unit
#[derive(Debug, Clone)]
pub struct ReconcileBatchInput {
    pub records: Vec<TelemetryRecord>,
    pub observed_at: DateTime<Utc>,
    pub toner_alert_threshold: i32,
}

/// Outcome of reconciling a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Devices that received a usage log and current-state row
    pub saved: usize,
    /// Display names that could not be tied to a device this cycle
    pub unresolved: Vec<String>,
    pub snapshots_written: usize,
    pub devices_created: usize,
}

/// Input for registering a newly discovered serial number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDevice {
    pub serial_number: String,
    pub mac_address: Option<String>,
    pub first_seen: DateTime<Utc>,
}

/// Repository trait for fleet telemetry persistence
/// Infrastructure layer (e.g., PostgreSQL) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FleetTelemetryRepository: Send + Sync {
    /// Reconcile a full batch atomically: either every record is applied or none is
    async fn reconcile(&self, input: ReconcileBatchInput) -> DomainResult<ReconcileSummary>;

    /// Current-state rows that carry a toner or offline alert
    async fn list_active_alerts(&self) -> DomainResult<Vec<DeviceAlert>>;
}

/// Reads and writes available while a batch is being reconciled
///
/// Implementations hold whatever isolation scope their backend offers (a
/// database transaction, a private copy of in-memory state). Nothing written
/// through this trait may become visible to other readers until the owning
/// repository commits.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReconcileTransaction: Send {
    async fn find_device_by_serial(&mut self, serial_number: &str) -> DomainResult<Option<DeviceId>>;

    async fn insert_device(&mut self, device: &NewDevice) -> DomainResult<DeviceId>;

    async fn update_device_mac(&mut self, device_id: DeviceId, mac_address: &str) -> DomainResult<()>;

    /// Most recent snapshot recorded under `device_name`, across all devices
    async fn latest_snapshot_by_name(&mut self, device_name: &str) -> DomainResult<Option<HistorySnapshot>>;

    async fn latest_snapshot_for_device(&mut self, device_id: DeviceId) -> DomainResult<Option<HistorySnapshot>>;

    async fn insert_snapshot(&mut self, snapshot: &HistorySnapshot) -> DomainResult<()>;

    async fn insert_usage_log(&mut self, log: &UsageLog) -> DomainResult<()>;

    async fn upsert_current_state(&mut self, state: &CurrentState) -> DomainResult<()>;
}
