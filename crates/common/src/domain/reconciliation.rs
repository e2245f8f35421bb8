use crate::domain::device::{CurrentState, DeviceId, HistorySnapshot, UsageLog};
use crate::domain::fleet_telemetry::{
    NewDevice, ReconcileBatchInput, ReconcileSummary, ReconcileTransaction,
};
use crate::domain::result::DomainResult;
use crate::domain::telemetry_record::TelemetryRecord;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Apply one batch of telemetry records through `tx`
///
/// Per record: resolve a device id (serial first, then last-known display
/// name), append a history snapshot when the configuration moved, append a
/// usage log and replace the current-state row. Records that cannot be
/// resolved are reported in `unresolved` and write nothing. The first error
/// aborts the batch; committing or rolling back is the caller's job.
pub async fn reconcile_batch<T>(
    tx: &mut T,
    input: &ReconcileBatchInput,
) -> DomainResult<ReconcileSummary>
where
    T: ReconcileTransaction + ?Sized,
{
    let mut summary = ReconcileSummary::default();

    for record in &input.records {
        let Some(device_id) = resolve_device_id(tx, record, input.observed_at, &mut summary).await?
        else {
            debug!(device_name = %record.name, "no serial and no history, skipping");
            summary.unresolved.push(record.name.clone());
            continue;
        };

        let prior = tx.latest_snapshot_for_device(device_id).await?;
        if configuration_changed(prior.as_ref(), record) {
            let snapshot = HistorySnapshot::from_record(device_id, record, input.observed_at);
            tx.insert_snapshot(&snapshot).await?;
            summary.snapshots_written += 1;
            debug!(device_id, device_name = %record.name, "configuration snapshot recorded");
        }

        tx.insert_usage_log(&UsageLog::from_record(device_id, record, input.observed_at))
            .await?;

        let state = CurrentState::from_record(
            device_id,
            record,
            input.observed_at,
            input.toner_alert_threshold,
        );
        tx.upsert_current_state(&state).await?;

        summary.saved += 1;
    }

    Ok(summary)
}

async fn resolve_device_id<T>(
    tx: &mut T,
    record: &TelemetryRecord,
    observed_at: DateTime<Utc>,
    summary: &mut ReconcileSummary,
) -> DomainResult<Option<DeviceId>>
where
    T: ReconcileTransaction + ?Sized,
{
    let Some(serial_number) = record.natural_key() else {
        // Name fallback: collides if two devices ever share a display name
        let snapshot = tx.latest_snapshot_by_name(&record.name).await?;
        return Ok(snapshot.map(|s| s.device_id));
    };

    let mac_address = record.mac_address.as_deref().filter(|m| !m.is_empty());

    if let Some(device_id) = tx.find_device_by_serial(serial_number).await? {
        // MAC is re-assignable and not history-tracked on the device row
        if let Some(mac) = mac_address {
            tx.update_device_mac(device_id, mac).await?;
        }
        return Ok(Some(device_id));
    }

    let device_id = tx
        .insert_device(&NewDevice {
            serial_number: serial_number.to_string(),
            mac_address: mac_address.map(str::to_string),
            first_seen: observed_at,
        })
        .await?;
    summary.devices_created += 1;
    debug!(device_id, serial_number, "registered new device");

    Ok(Some(device_id))
}

/// Whether `record` differs materially from the latest snapshot
///
/// - no prior snapshot: changed
/// - address: compared after dropping a `/nn` suffix from the stored value;
///   present on one side only counts as changed
/// - hostname and MAC: only a new non-null value that differs counts
/// - name: any literal difference
pub fn configuration_changed(prior: Option<&HistorySnapshot>, record: &TelemetryRecord) -> bool {
    let Some(prior) = prior else {
        return true;
    };

    let prior_address = prior.ip_address.as_deref().filter(|a| !a.is_empty());
    let address_changed = match (record.effective_address(), prior_address) {
        (Some(new), Some(old)) => new != strip_prefix_length(old),
        (None, None) => false,
        _ => true,
    };

    let hostname_changed = record
        .hostname
        .as_deref()
        .is_some_and(|h| prior.hostname.as_deref() != Some(h));
    let mac_changed = record
        .mac_address
        .as_deref()
        .is_some_and(|m| prior.mac_address.as_deref() != Some(m));

    record.name != prior.device_name || address_changed || hostname_changed || mac_changed
}

fn strip_prefix_length(address: &str) -> &str {
    address.split_once('/').map_or(address, |(host, _)| host)
}
