use crate::domain::result::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reachability of a device during one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "Online",
            DeviceStatus::Offline => "Offline",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s {
            "Online" => Ok(DeviceStatus::Online),
            "Offline" => Ok(DeviceStatus::Offline),
            other => Err(DomainError::InvalidDeviceStatus(other.to_string())),
        }
    }
}

/// Black/white page counters from the print counter page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintCounters {
    pub copy_bw: Option<i64>,
    pub printer_bw: Option<i64>,
    pub fax_bw: Option<i64>,
}

/// Scan counters from the scan counter page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounters {
    pub copy: Option<i64>,
    pub black_white: Option<i64>,
    pub other: Option<i64>,
}

/// Best-effort telemetry for one directory entry
///
/// Every optional field is independent: a missing serial says nothing about
/// whether toner or counters were retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub name: String,
    pub address: Option<String>,
    pub status: DeviceStatus,
    pub hostname: Option<String>,
    pub serial_number: Option<String>,
    pub mac_address: Option<String>,
    pub toner_percent: Option<i32>,
    pub print_counters: Option<PrintCounters>,
    pub scan_counters: Option<ScanCounters>,
}

impl TelemetryRecord {
    /// Record for a device that could not be reached, with no detail fields
    pub fn offline(name: impl Into<String>, address: Option<String>) -> Self {
        Self {
            name: name.into(),
            address,
            status: DeviceStatus::Offline,
            hostname: None,
            serial_number: None,
            mac_address: None,
            toner_percent: None,
            print_counters: None,
            scan_counters: None,
        }
    }

    /// Address with empty strings treated as absent
    pub fn effective_address(&self) -> Option<&str> {
        self.address.as_deref().filter(|a| !a.is_empty())
    }

    /// Serial number usable as a natural key (non-empty)
    pub fn natural_key(&self) -> Option<&str> {
        self.serial_number.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        assert_eq!("Online".parse::<DeviceStatus>().unwrap(), DeviceStatus::Online);
        assert_eq!(DeviceStatus::Offline.to_string(), "Offline");
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let result = "Sleeping".parse::<DeviceStatus>();
        assert!(matches!(result, Err(DomainError::InvalidDeviceStatus(s)) if s == "Sleeping"));
    }

    #[test]
    fn test_offline_record_has_no_details() {
        let record = TelemetryRecord::offline("P1", None);
        assert_eq!(record.status, DeviceStatus::Offline);
        assert!(record.hostname.is_none());
        assert!(record.serial_number.is_none());
        assert!(record.toner_percent.is_none());
        assert!(record.print_counters.is_none());
        assert!(record.scan_counters.is_none());
    }

    #[test]
    fn test_empty_serial_is_not_a_natural_key() {
        let mut record = TelemetryRecord::offline("P1", Some(String::new()));
        record.serial_number = Some(String::new());
        assert!(record.natural_key().is_none());
        assert!(record.effective_address().is_none());
    }
}
