use crate::domain::FetchResult;
use async_trait::async_trait;

/// Management pages read from each device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryPage {
    Identity,
    Toner,
    PrintCounters,
    ScanCounters,
}

impl TelemetryPage {
    /// Script model path that carries the page's data
    pub fn path(&self) -> &'static str {
        match self {
            TelemetryPage::Identity => {
                "/js/jssrc/model/dvcinfo/dvcconfig/DvcConfig_Config.model.htm?arg1=0"
            }
            TelemetryPage::Toner => "/js/jssrc/model/startwlm/Hme_Toner.model.htm",
            TelemetryPage::PrintCounters => {
                "/js/jssrc/model/dvcinfo/dvccounter/DvcInfo_Counter_PrnCounter.model.htm"
            }
            TelemetryPage::ScanCounters => {
                "/js/jssrc/model/dvcinfo/dvccounter/DvcInfo_Counter_ScanCounter.model.htm"
            }
        }
    }

    /// UI page the device expects as the referer for `path`
    pub fn referer(&self) -> &'static str {
        match self {
            TelemetryPage::Identity => "/dvcinfo/dvcconfig/DvcConfig_Config.htm?arg1=0",
            TelemetryPage::Toner => "/startwlm/Hme_Toner.htm",
            TelemetryPage::PrintCounters => "/dvcinfo/dvccounter/DvcInfo_Counter_PrnCounter.htm",
            TelemetryPage::ScanCounters => "/dvcinfo/dvccounter/DvcInfo_Counter_ScanCounter.htm",
        }
    }
}

/// Fetches the raw body of one management page from one device
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DevicePageFetcher: Send + Sync {
    async fn fetch_page(&self, address: &str, page: TelemetryPage) -> FetchResult<String>;
}
