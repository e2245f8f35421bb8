use crate::domain::device::{
    CurrentState, Device, DeviceAlert, DeviceId, HistorySnapshot, UsageLog,
};
use crate::domain::fleet_telemetry::{
    FleetTelemetryRepository, NewDevice, ReconcileBatchInput, ReconcileSummary,
    ReconcileTransaction,
};
use crate::domain::reconciliation::reconcile_batch;
use crate::domain::result::DomainResult;
use crate::domain::telemetry_record::DeviceStatus;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Default)]
struct FleetState {
    next_device_id: DeviceId,
    devices: Vec<Device>,
    history: Vec<HistorySnapshot>,
    usage_logs: Vec<UsageLog>,
    current_state: BTreeMap<DeviceId, CurrentState>,
}

/// In-memory implementation of FleetTelemetryRepository
///
/// A batch runs against a private copy of the state which replaces the shared
/// state only when the whole batch succeeds. The mutex is held for the whole
/// batch, so concurrent reconciles are serialised.
#[derive(Clone, Default)]
pub struct InMemoryFleetTelemetryRepository {
    state: Arc<Mutex<FleetState>>,
}

impl InMemoryFleetTelemetryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn devices(&self) -> Vec<Device> {
        self.state.lock().await.devices.clone()
    }

    pub async fn history(&self) -> Vec<HistorySnapshot> {
        self.state.lock().await.history.clone()
    }

    pub async fn usage_logs(&self) -> Vec<UsageLog> {
        self.state.lock().await.usage_logs.clone()
    }

    pub async fn current_state(&self, device_id: DeviceId) -> Option<CurrentState> {
        self.state.lock().await.current_state.get(&device_id).cloned()
    }

    pub async fn device_by_serial(&self, serial_number: &str) -> Option<Device> {
        self.state
            .lock()
            .await
            .devices
            .iter()
            .find(|d| d.serial_number.as_deref() == Some(serial_number))
            .cloned()
    }
}

#[async_trait]
impl FleetTelemetryRepository for InMemoryFleetTelemetryRepository {
    #[instrument(skip(self, input), fields(record_count = input.records.len()))]
    async fn reconcile(&self, input: ReconcileBatchInput) -> DomainResult<ReconcileSummary> {
        let mut shared = self.state.lock().await;
        let mut working = shared.clone();

        let summary = reconcile_batch(&mut working, &input).await?;

        *shared = working;
        debug!(saved = summary.saved, "in-memory batch committed");
        Ok(summary)
    }

    async fn list_active_alerts(&self) -> DomainResult<Vec<DeviceAlert>> {
        let state = self.state.lock().await;

        let mut alerts: Vec<DeviceAlert> = state
            .current_state
            .values()
            .filter(|s| s.alerts.toner_alert || s.alerts.offline_alert)
            .map(|s| DeviceAlert {
                device_id: s.device_id,
                serial_number: state
                    .devices
                    .iter()
                    .find(|d| d.id == s.device_id)
                    .and_then(|d| d.serial_number.clone()),
                device_name: s.device_name.clone(),
                ip_address: s.ip_address.clone(),
                status: s.status,
                toner_level: s.toner_level,
                toner_alert: s.alerts.toner_alert,
                offline_alert: s.alerts.offline_alert,
                last_updated: s.last_updated,
                last_online: state
                    .usage_logs
                    .iter()
                    .filter(|l| l.device_id == s.device_id && l.status == DeviceStatus::Online)
                    .map(|l| l.timestamp)
                    .max(),
            })
            .collect();
        alerts.sort_by(|a, b| a.device_name.cmp(&b.device_name));

        Ok(alerts)
    }
}

fn latest(snapshots: impl Iterator<Item = (usize, HistorySnapshot)>) -> Option<HistorySnapshot> {
    // Insertion order breaks timestamp ties, like the serial id does in SQL
    snapshots
        .max_by(|(ia, a), (ib, b)| a.timestamp.cmp(&b.timestamp).then(ia.cmp(ib)))
        .map(|(_, s)| s)
}

#[async_trait]
impl ReconcileTransaction for FleetState {
    async fn find_device_by_serial(&mut self, serial_number: &str) -> DomainResult<Option<DeviceId>> {
        Ok(self
            .devices
            .iter()
            .find(|d| d.serial_number.as_deref() == Some(serial_number))
            .map(|d| d.id))
    }

    async fn insert_device(&mut self, device: &NewDevice) -> DomainResult<DeviceId> {
        self.next_device_id += 1;
        let id = self.next_device_id;
        self.devices.push(Device {
            id,
            serial_number: Some(device.serial_number.clone()),
            mac_address: device.mac_address.clone(),
            first_seen: device.first_seen,
        });
        Ok(id)
    }

    async fn update_device_mac(&mut self, device_id: DeviceId, mac_address: &str) -> DomainResult<()> {
        if let Some(device) = self.devices.iter_mut().find(|d| d.id == device_id) {
            device.mac_address = Some(mac_address.to_string());
        }
        Ok(())
    }

    async fn latest_snapshot_by_name(&mut self, device_name: &str) -> DomainResult<Option<HistorySnapshot>> {
        Ok(latest(
            self.history
                .iter()
                .cloned()
                .enumerate()
                .filter(|(_, s)| s.device_name == device_name),
        ))
    }

    async fn latest_snapshot_for_device(&mut self, device_id: DeviceId) -> DomainResult<Option<HistorySnapshot>> {
        Ok(latest(
            self.history
                .iter()
                .cloned()
                .enumerate()
                .filter(|(_, s)| s.device_id == device_id),
        ))
    }

    async fn insert_snapshot(&mut self, snapshot: &HistorySnapshot) -> DomainResult<()> {
        self.history.push(snapshot.clone());
        Ok(())
    }

    async fn insert_usage_log(&mut self, log: &UsageLog) -> DomainResult<()> {
        self.usage_logs.push(log.clone());
        Ok(())
    }

    async fn upsert_current_state(&mut self, state: &CurrentState) -> DomainResult<()> {
        self.current_state.insert(state.device_id, state.clone());
        Ok(())
    }
}
