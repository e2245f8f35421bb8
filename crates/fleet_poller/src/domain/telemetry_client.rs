use crate::domain::{
    DevicePageFetcher, FetchResult, TelemetryPage, parse_identity, parse_print_counters,
    parse_scan_counters, parse_toner_level,
};
use common::domain::{DeviceStatus, TelemetryRecord};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Builds a best-effort TelemetryRecord for one device
///
/// The four pages are requested concurrently and parsed independently; a
/// failed page only blanks its own fields. The device is Online when any page
/// answered. Errors never escape this type.
pub struct TelemetryClient {
    fetcher: Arc<dyn DevicePageFetcher>,
}

impl TelemetryClient {
    pub fn new(fetcher: Arc<dyn DevicePageFetcher>) -> Self {
        Self { fetcher }
    }

    #[instrument(skip(self), fields(device_name = %name))]
    pub async fn fetch(&self, name: &str, address: Option<&str>) -> TelemetryRecord {
        let Some(address) = address.filter(|a| !a.is_empty()) else {
            debug!("no address in directory, reporting offline");
            return TelemetryRecord::offline(name, None);
        };

        let (identity, toner, print, scan) = tokio::join!(
            self.page(address, TelemetryPage::Identity),
            self.page(address, TelemetryPage::Toner),
            self.page(address, TelemetryPage::PrintCounters),
            self.page(address, TelemetryPage::ScanCounters),
        );

        let online = [&identity, &toner, &print, &scan]
            .iter()
            .any(|page| page.is_some());

        let mut record = TelemetryRecord::offline(name, Some(address.to_string()));
        if online {
            record.status = DeviceStatus::Online;
        }

        if let Some(body) = identity {
            let identity = parse_identity(&body);
            record.hostname = identity.hostname;
            record.serial_number = identity.serial_number;
            record.mac_address = identity.mac_address;
        }
        record.toner_percent = toner.as_deref().and_then(parse_toner_level);
        record.print_counters = print.as_deref().map(parse_print_counters);
        record.scan_counters = scan.as_deref().map(parse_scan_counters);

        debug!(status = %record.status, "telemetry fetched");
        record
    }

    async fn page(&self, address: &str, page: TelemetryPage) -> Option<String> {
        let result: FetchResult<String> = self.fetcher.fetch_page(address, page).await;
        match result {
            Ok(body) => Some(body),
            Err(e) => {
                debug!(address, ?page, error = %e, "page fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FetchError, MockDevicePageFetcher};
    use mockall::predicate::eq;

    fn body_for(page: TelemetryPage) -> String {
        match page {
            TelemetryPage::Identity => {
                "_pp.hostName = 'km-p1';\n_pp.serialNumber = 'S1';\n_pp.macAddress = '00:11:22:33:44:55';"
            }
            TelemetryPage::Toner => "_pp.Renaming.push(parseInt('42', 10));",
            TelemetryPage::PrintCounters => "_pp.copyBlackWhite = ('10').toString();",
            TelemetryPage::ScanCounters => "_pp.scanOther = parseInt('3', 10);",
        }
        .to_string()
    }

    #[tokio::test]
    async fn test_fetch_online_device_fills_all_fields() {
        let mut fetcher = MockDevicePageFetcher::new();
        fetcher
            .expect_fetch_page()
            .withf(|address: &str, _| address == "10.0.0.10")
            .times(4)
            .returning(|_, page| Ok(body_for(page)));

        let client = TelemetryClient::new(Arc::new(fetcher));
        let record = client.fetch("P1", Some("10.0.0.10")).await;

        assert_eq!(record.status, DeviceStatus::Online);
        assert_eq!(record.address.as_deref(), Some("10.0.0.10"));
        assert_eq!(record.hostname.as_deref(), Some("km-p1"));
        assert_eq!(record.serial_number.as_deref(), Some("S1"));
        assert_eq!(record.toner_percent, Some(42));
        assert_eq!(record.print_counters.unwrap().copy_bw, Some(10));
        assert_eq!(record.scan_counters.unwrap().other, Some(3));
    }

    #[tokio::test]
    async fn test_fetch_without_address_makes_no_request() {
        let mut fetcher = MockDevicePageFetcher::new();
        fetcher.expect_fetch_page().never();

        let client = TelemetryClient::new(Arc::new(fetcher));
        let record = client.fetch("KM-Test-Offline", None).await;

        assert_eq!(record.status, DeviceStatus::Offline);
        assert_eq!(record.address, None);
        assert_eq!(record.hostname, None);
        assert_eq!(record.serial_number, None);
        assert_eq!(record.toner_percent, None);
        assert!(record.print_counters.is_none());
        assert!(record.scan_counters.is_none());
    }

    #[tokio::test]
    async fn test_fetch_with_every_page_failing_is_offline() {
        let mut fetcher = MockDevicePageFetcher::new();
        fetcher
            .expect_fetch_page()
            .times(4)
            .returning(|_, _| Err(FetchError::Timeout));

        let client = TelemetryClient::new(Arc::new(fetcher));
        let record = client.fetch("P1", Some("10.0.0.10")).await;

        assert_eq!(record.status, DeviceStatus::Offline);
        assert_eq!(record.address.as_deref(), Some("10.0.0.10"));
        assert_eq!(record.serial_number, None);
        assert!(record.print_counters.is_none());
    }

    #[tokio::test]
    async fn test_failed_identity_page_keeps_other_fields() {
        let mut fetcher = MockDevicePageFetcher::new();
        fetcher
            .expect_fetch_page()
            .with(eq("10.0.0.10"), eq(TelemetryPage::Identity))
            .times(1)
            .returning(|_, _| Err(FetchError::HttpStatus { status: 500 }));
        fetcher
            .expect_fetch_page()
            .withf(|_, page: &TelemetryPage| *page != TelemetryPage::Identity)
            .times(3)
            .returning(|_, page| Ok(body_for(page)));

        let client = TelemetryClient::new(Arc::new(fetcher));
        let record = client.fetch("P1", Some("10.0.0.10")).await;

        assert_eq!(record.status, DeviceStatus::Online);
        assert_eq!(record.serial_number, None);
        assert_eq!(record.hostname, None);
        assert_eq!(record.toner_percent, Some(42));
        assert!(record.scan_counters.is_some());
    }
}
