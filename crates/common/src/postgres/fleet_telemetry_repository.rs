use crate::domain::{
    CurrentState, DeviceAlert, DeviceId, DeviceStatus, DomainError, DomainResult,
    FleetTelemetryRepository, HistorySnapshot, NewDevice, ReconcileBatchInput, ReconcileSummary,
    ReconcileTransaction, UsageLog, reconcile_batch,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, info, instrument, warn};

/// Device history row as stored in `device_history`
#[derive(Debug, Clone)]
pub struct HistorySnapshotRow {
    pub device_id: i64,
    pub device_name: String,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&Row> for HistorySnapshotRow {
    fn from(row: &Row) -> Self {
        Self {
            device_id: row.get("device_id"),
            device_name: row.get("device_name"),
            ip_address: row.get("ip_address"),
            mac_address: row.get("mac_address"),
            hostname: row.get("hostname"),
            timestamp: row.get("timestamp"),
        }
    }
}

impl From<HistorySnapshotRow> for HistorySnapshot {
    fn from(row: HistorySnapshotRow) -> Self {
        HistorySnapshot {
            device_id: row.device_id,
            device_name: row.device_name,
            ip_address: row.ip_address,
            mac_address: row.mac_address,
            hostname: row.hostname,
            timestamp: row.timestamp,
        }
    }
}

fn alert_from_row(row: &Row) -> DomainResult<DeviceAlert> {
    let status: String = row.get("status");

    Ok(DeviceAlert {
        device_id: row.get("device_id"),
        serial_number: row.get("serial_number"),
        device_name: row.get("device_name"),
        ip_address: row.get("ip_address"),
        status: status.parse::<DeviceStatus>()?,
        toner_level: row.get("toner_level"),
        toner_alert: row.get("toner_alert"),
        offline_alert: row.get("offline_alert"),
        last_updated: row.get("last_updated"),
        last_online: row.get("last_online"),
    })
}

fn db_error(e: tokio_postgres::Error) -> DomainError {
    DomainError::RepositoryError(e.into())
}

const SNAPSHOT_COLUMNS: &str =
    "device_id, device_name, ip_address, mac_address, hostname, timestamp";

/// Reconcile operations bound to one open database transaction
struct PostgresReconcileTransaction<'a> {
    tx: deadpool_postgres::Transaction<'a>,
}

#[async_trait]
impl<'a> ReconcileTransaction for PostgresReconcileTransaction<'a> {
    async fn find_device_by_serial(&mut self, serial_number: &str) -> DomainResult<Option<DeviceId>> {
        let row = self
            .tx
            .query_opt(
                "SELECT id FROM devices WHERE serial_number = $1",
                &[&serial_number],
            )
            .await
            .map_err(db_error)?;

        Ok(row.map(|r| r.get::<_, i64>(0)))
    }

    async fn insert_device(&mut self, device: &NewDevice) -> DomainResult<DeviceId> {
        let row = self
            .tx
            .query_one(
                "INSERT INTO devices (serial_number, mac_address, first_seen)
                 VALUES ($1, $2, $3)
                 RETURNING id",
                &[&device.serial_number, &device.mac_address, &device.first_seen],
            )
            .await
            .map_err(db_error)?;

        let id: i64 = row.get(0);
        info!(device_id = id, serial_number = %device.serial_number, "registered new device");
        Ok(id)
    }

    async fn update_device_mac(&mut self, device_id: DeviceId, mac_address: &str) -> DomainResult<()> {
        self.tx
            .execute(
                "UPDATE devices SET mac_address = $2 WHERE id = $1",
                &[&device_id, &mac_address],
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn latest_snapshot_by_name(&mut self, device_name: &str) -> DomainResult<Option<HistorySnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM device_history
             WHERE device_name = $1
             ORDER BY timestamp DESC, id DESC
             LIMIT 1"
        );
        let row = self
            .tx
            .query_opt(sql.as_str(), &[&device_name])
            .await
            .map_err(db_error)?;

        Ok(row.map(|r| HistorySnapshotRow::from(&r).into()))
    }

    async fn latest_snapshot_for_device(&mut self, device_id: DeviceId) -> DomainResult<Option<HistorySnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM device_history
             WHERE device_id = $1
             ORDER BY timestamp DESC, id DESC
             LIMIT 1"
        );
        let row = self
            .tx
            .query_opt(sql.as_str(), &[&device_id])
            .await
            .map_err(db_error)?;

        Ok(row.map(|r| HistorySnapshotRow::from(&r).into()))
    }

    async fn insert_snapshot(&mut self, snapshot: &HistorySnapshot) -> DomainResult<()> {
        self.tx
            .execute(
                "INSERT INTO device_history (device_id, device_name, ip_address, mac_address, hostname, timestamp)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &snapshot.device_id,
                    &snapshot.device_name,
                    &snapshot.ip_address,
                    &snapshot.mac_address,
                    &snapshot.hostname,
                    &snapshot.timestamp,
                ],
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn insert_usage_log(&mut self, log: &UsageLog) -> DomainResult<()> {
        self.tx
            .execute(
                "INSERT INTO device_logs (
                     device_id, timestamp, status, toner_level,
                     printer_copy_bw, printer_printer_bw, printer_fax_bw,
                     scanner_copy, scanner_bw, scanner_other
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                &[
                    &log.device_id,
                    &log.timestamp,
                    &log.status.as_str(),
                    &log.toner_level,
                    &log.print_counters.copy_bw,
                    &log.print_counters.printer_bw,
                    &log.print_counters.fax_bw,
                    &log.scan_counters.copy,
                    &log.scan_counters.black_white,
                    &log.scan_counters.other,
                ],
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn upsert_current_state(&mut self, state: &CurrentState) -> DomainResult<()> {
        self.tx
            .execute(
                "INSERT INTO device_current_state (
                     device_id, device_name, ip_address, mac_address, hostname, status, toner_level,
                     printer_copy_bw, printer_printer_bw, printer_fax_bw,
                     scanner_copy, scanner_bw, scanner_other,
                     last_updated, toner_alert, offline_alert
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                 ON CONFLICT (device_id) DO UPDATE SET
                     device_name = EXCLUDED.device_name,
                     ip_address = EXCLUDED.ip_address,
                     mac_address = EXCLUDED.mac_address,
                     hostname = EXCLUDED.hostname,
                     status = EXCLUDED.status,
                     toner_level = EXCLUDED.toner_level,
                     printer_copy_bw = EXCLUDED.printer_copy_bw,
                     printer_printer_bw = EXCLUDED.printer_printer_bw,
                     printer_fax_bw = EXCLUDED.printer_fax_bw,
                     scanner_copy = EXCLUDED.scanner_copy,
                     scanner_bw = EXCLUDED.scanner_bw,
                     scanner_other = EXCLUDED.scanner_other,
                     last_updated = EXCLUDED.last_updated,
                     toner_alert = EXCLUDED.toner_alert,
                     offline_alert = EXCLUDED.offline_alert",
                &[
                    &state.device_id,
                    &state.device_name,
                    &state.ip_address,
                    &state.mac_address,
                    &state.hostname,
                    &state.status.as_str(),
                    &state.toner_level,
                    &state.print_counters.copy_bw,
                    &state.print_counters.printer_bw,
                    &state.print_counters.fax_bw,
                    &state.scan_counters.copy,
                    &state.scan_counters.black_white,
                    &state.scan_counters.other,
                    &state.last_updated,
                    &state.alerts.toner_alert,
                    &state.alerts.offline_alert,
                ],
            )
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PostgresFleetTelemetryRepository {
    client: PostgresClient,
}

impl PostgresFleetTelemetryRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FleetTelemetryRepository for PostgresFleetTelemetryRepository {
    #[instrument(skip(self, input), fields(record_count = input.records.len()))]
    async fn reconcile(&self, input: ReconcileBatchInput) -> DomainResult<ReconcileSummary> {
        debug!("reconciling telemetry batch in database");

        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn.transaction().await.map_err(db_error)?;
        let mut batch = PostgresReconcileTransaction { tx };

        match reconcile_batch(&mut batch, &input).await {
            Ok(summary) => {
                batch.tx.commit().await.map_err(db_error)?;
                info!(
                    saved = summary.saved,
                    unresolved = summary.unresolved.len(),
                    snapshots = summary.snapshots_written,
                    "telemetry batch committed"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(error = %e, "telemetry batch failed, rolling back");
                if let Err(rollback_err) = batch.tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn list_active_alerts(&self) -> DomainResult<Vec<DeviceAlert>> {
        debug!("listing active alerts");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT device_id, serial_number, device_name, ip_address, status, toner_level,
                        toner_alert, offline_alert, last_updated, last_online
                 FROM devices_alert_view
                 ORDER BY device_name",
                &[],
            )
            .await
            .map_err(db_error)?;

        rows.iter().map(alert_from_row).collect()
    }
}
