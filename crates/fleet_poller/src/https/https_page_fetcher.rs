use crate::domain::{DevicePageFetcher, FetchError, FetchResult, TelemetryPage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{COOKIE, REFERER};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Settings for talking to device management interfaces
#[derive(Debug, Clone)]
pub struct HttpsFetcherConfig {
    pub request_timeout: Duration,
    pub session_cookie: String,
    /// Accept self-signed device certificates
    pub accept_invalid_certs: bool,
    /// PEM certificate to trust instead; disables `accept_invalid_certs`
    pub ca_cert_path: Option<PathBuf>,
    pub max_idle_per_host: usize,
}

impl Default for HttpsFetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            session_cookie: "rtl=0; css=1".to_string(),
            accept_invalid_certs: true,
            ca_cert_path: None,
            max_idle_per_host: 4,
        }
    }
}

fn device_url(address: &str, path: &str) -> String {
    format!("https://{address}{path}")
}

/// DevicePageFetcher over HTTPS with reqwest
pub struct HttpsPageFetcher {
    client: reqwest::Client,
    session_cookie: String,
}

impl HttpsPageFetcher {
    pub fn new(config: &HttpsFetcherConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host);

        builder = match &config.ca_cert_path {
            Some(path) => {
                let pem = std::fs::read(path)
                    .with_context(|| format!("reading CA certificate {}", path.display()))?;
                let cert = reqwest::Certificate::from_pem(&pem)
                    .with_context(|| format!("parsing CA certificate {}", path.display()))?;
                debug!(path = %path.display(), "trusting pinned device certificate");
                builder.add_root_certificate(cert)
            }
            None => builder.danger_accept_invalid_certs(config.accept_invalid_certs),
        };

        Ok(Self {
            client: builder.build().context("building HTTPS client")?,
            session_cookie: config.session_cookie.clone(),
        })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::HttpStatus {
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl DevicePageFetcher for HttpsPageFetcher {
    async fn fetch_page(&self, address: &str, page: TelemetryPage) -> FetchResult<String> {
        let response = self
            .client
            .get(device_url(address, page.path()))
            .header(REFERER, device_url(address, page.referer()))
            .header(COOKIE, &self.session_cookie)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}
