use common::domain::{PrintCounters, ScanCounters};
use once_cell::sync::Lazy;
use regex::Regex;

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("static telemetry pattern must compile")
}

static HOSTNAME: Lazy<Regex> = Lazy::new(|| pattern(r"_pp\.hostName\s*=\s*'([^']*)';"));
static SERIAL_NUMBER: Lazy<Regex> = Lazy::new(|| pattern(r"_pp\.serialNumber\s*=\s*'([^']*)';"));
static MAC_ADDRESS: Lazy<Regex> = Lazy::new(|| pattern(r"_pp\.macAddress\s*=\s*'([^']*)';"));

static TONER_LEVEL: Lazy<Regex> =
    Lazy::new(|| pattern(r"_pp\.Renaming\.push\(parseInt\('(\d+)',\s*10\)\);"));

static COPY_BW: Lazy<Regex> =
    Lazy::new(|| pattern(r"_pp\.copyBlackWhite\s*=\s*\('(\d+)'\)\.toString\(\);"));
static PRINTER_BW: Lazy<Regex> =
    Lazy::new(|| pattern(r"_pp\.printerBlackWhite\s*=\s*\('(\d+)'\)\.toString\(\);"));
static FAX_BW: Lazy<Regex> =
    Lazy::new(|| pattern(r"_pp\.faxBlackWhite\s*=\s*\('(\d+)'\)\.toString\(\);"));

static SCAN_COPY: Lazy<Regex> =
    Lazy::new(|| pattern(r"_pp\.scanCopy\s*=\s*parseInt\('(\d+)',\s*10\);"));
static SCAN_BW: Lazy<Regex> =
    Lazy::new(|| pattern(r"_pp\.scanBlackWhite\s*=\s*parseInt\('(\d+)',\s*10\);"));
static SCAN_OTHER: Lazy<Regex> =
    Lazy::new(|| pattern(r"_pp\.scanOther\s*=\s*parseInt\('(\d+)',\s*10\);"));

/// Identity fields from the device configuration page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub hostname: Option<String>,
    pub serial_number: Option<String>,
    pub mac_address: Option<String>,
}

fn first_capture<'a>(re: &Regex, body: &'a str) -> Option<&'a str> {
    re.captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn quoted(re: &Regex, body: &str) -> Option<String> {
    first_capture(re, body)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn number<T: std::str::FromStr>(re: &Regex, body: &str) -> Option<T> {
    first_capture(re, body).and_then(|v| v.parse().ok())
}

pub fn parse_identity(body: &str) -> DeviceIdentity {
    DeviceIdentity {
        hostname: quoted(&HOSTNAME, body),
        serial_number: quoted(&SERIAL_NUMBER, body),
        mac_address: quoted(&MAC_ADDRESS, body),
    }
}

/// First toner cartridge level, in percent
pub fn parse_toner_level(body: &str) -> Option<i32> {
    number(&TONER_LEVEL, body)
}

pub fn parse_print_counters(body: &str) -> PrintCounters {
    PrintCounters {
        copy_bw: number(&COPY_BW, body),
        printer_bw: number(&PRINTER_BW, body),
        fax_bw: number(&FAX_BW, body),
    }
}

pub fn parse_scan_counters(body: &str) -> ScanCounters {
    ScanCounters {
        copy: number(&SCAN_COPY, body),
        black_white: number(&SCAN_BW, body),
        other: number(&SCAN_OTHER, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY_PAGE: &str = r#"
        _pp.hostName = 'KM-4F-EAST';
        _pp.serialNumber = 'W2K1800123';
        _pp.macAddress = '00:17:C8:AA:BB:CC';
    "#;

    #[test]
    fn test_parse_identity_extracts_all_fields() {
        let identity = parse_identity(IDENTITY_PAGE);

        assert_eq!(identity.hostname.as_deref(), Some("KM-4F-EAST"));
        assert_eq!(identity.serial_number.as_deref(), Some("W2K1800123"));
        assert_eq!(identity.mac_address.as_deref(), Some("00:17:C8:AA:BB:CC"));
    }

    #[test]
    fn test_parse_identity_treats_empty_values_as_absent() {
        let identity = parse_identity("_pp.hostName = 'h1';\n_pp.serialNumber = '';");

        assert_eq!(identity.hostname.as_deref(), Some("h1"));
        assert_eq!(identity.serial_number, None);
        assert_eq!(identity.mac_address, None);
    }

    #[test]
    fn test_parse_toner_level_takes_first_cartridge() {
        let body = "_pp.Renaming.push(parseInt('7', 10));\n_pp.Renaming.push(parseInt('93', 10));";
        assert_eq!(parse_toner_level(body), Some(7));
        assert_eq!(parse_toner_level("<html>login</html>"), None);
    }

    #[test]
    fn test_parse_print_counters_with_missing_fax() {
        let body = "_pp.copyBlackWhite = ('1200').toString();\n_pp.printerBlackWhite=('5400').toString();";

        let counters = parse_print_counters(body);

        assert_eq!(counters.copy_bw, Some(1200));
        assert_eq!(counters.printer_bw, Some(5400));
        assert_eq!(counters.fax_bw, None);
    }

    #[test]
    fn test_parse_scan_counters() {
        let body = "_pp.scanCopy = parseInt('12', 10);\n_pp.scanBlackWhite = parseInt('340',10);\n_pp.scanOther = parseInt('0', 10);";

        let counters = parse_scan_counters(body);

        assert_eq!(counters.copy, Some(12));
        assert_eq!(counters.black_white, Some(340));
        assert_eq!(counters.other, Some(0));
    }

    #[test]
    fn test_counter_overflow_is_absent() {
        let body = "_pp.scanCopy = parseInt('99999999999999999999999', 10);";
        assert_eq!(parse_scan_counters(body).copy, None);
    }
}
