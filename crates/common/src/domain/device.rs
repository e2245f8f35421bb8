use crate::domain::telemetry_record::{DeviceStatus, PrintCounters, ScanCounters, TelemetryRecord};
use chrono::{DateTime, Duration, Utc};

/// Store-assigned device identifier
pub type DeviceId = i64;

/// Durable identity of one physical printer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub serial_number: Option<String>,
    pub mac_address: Option<String>,
    pub first_seen: DateTime<Utc>,
}

/// Configuration fingerprint of a device at a point in time (append-only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySnapshot {
    pub device_id: DeviceId,
    pub device_name: String,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HistorySnapshot {
    pub fn from_record(device_id: DeviceId, record: &TelemetryRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            device_id,
            device_name: record.name.clone(),
            ip_address: record.address.clone(),
            mac_address: record.mac_address.clone(),
            hostname: record.hostname.clone(),
            timestamp,
        }
    }
}

/// One observation of a device's counters (append-only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageLog {
    pub device_id: DeviceId,
    pub timestamp: DateTime<Utc>,
    pub status: DeviceStatus,
    pub toner_level: Option<i32>,
    pub print_counters: PrintCounters,
    pub scan_counters: ScanCounters,
}

impl UsageLog {
    pub fn from_record(device_id: DeviceId, record: &TelemetryRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            device_id,
            timestamp,
            status: record.status,
            toner_level: record.toner_percent,
            print_counters: record.print_counters.unwrap_or_default(),
            scan_counters: record.scan_counters.unwrap_or_default(),
        }
    }
}

/// Alert flags derived from a single observation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceAlerts {
    pub toner_alert: bool,
    pub offline_alert: bool,
}

impl DeviceAlerts {
    /// Toner alert when the level is known and strictly below `toner_threshold`;
    /// offline alert when the device did not answer any endpoint.
    pub fn evaluate(record: &TelemetryRecord, toner_threshold: i32) -> Self {
        Self {
            toner_alert: record.toner_percent.is_some_and(|level| level < toner_threshold),
            offline_alert: record.status == DeviceStatus::Offline,
        }
    }
}

/// Latest-known view of a device; one row per device, replaced every cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentState {
    pub device_id: DeviceId,
    pub device_name: String,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub status: DeviceStatus,
    pub toner_level: Option<i32>,
    pub print_counters: PrintCounters,
    pub scan_counters: ScanCounters,
    pub last_updated: DateTime<Utc>,
    pub alerts: DeviceAlerts,
}

impl CurrentState {
    pub fn from_record(
        device_id: DeviceId,
        record: &TelemetryRecord,
        last_updated: DateTime<Utc>,
        toner_threshold: i32,
    ) -> Self {
        Self {
            device_id,
            device_name: record.name.clone(),
            ip_address: record.address.clone(),
            mac_address: record.mac_address.clone(),
            hostname: record.hostname.clone(),
            status: record.status,
            toner_level: record.toner_percent,
            print_counters: record.print_counters.unwrap_or_default(),
            scan_counters: record.scan_counters.unwrap_or_default(),
            last_updated,
            alerts: DeviceAlerts::evaluate(record, toner_threshold),
        }
    }
}

/// A device whose current state carries at least one alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAlert {
    pub device_id: DeviceId,
    pub serial_number: Option<String>,
    pub device_name: String,
    pub ip_address: Option<String>,
    pub status: DeviceStatus,
    pub toner_level: Option<i32>,
    pub toner_alert: bool,
    pub offline_alert: bool,
    pub last_updated: DateTime<Utc>,
    pub last_online: Option<DateTime<Utc>>,
}

impl DeviceAlert {
    /// Offline alert for a device not seen Online within `hours` of `now`
    /// (or never seen Online at all)
    pub fn is_long_offline(&self, hours: i64, now: DateTime<Utc>) -> bool {
        if !self.offline_alert {
            return false;
        }
        match self.last_online {
            Some(seen) => now - seen > Duration::hours(hours),
            None => true,
        }
    }
}
