use common::domain::DomainError;
use common::postgres::PostgresConfig;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use fleet_poller::{FleetPollerConfig, HttpsFetcherConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // OpenTelemetry configuration
    #[serde(default)]
    pub otel_enabled: bool,

    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    // Device directory
    /// Print server whose queues are polled
    #[serde(default = "default_print_server_address")]
    pub print_server_address: String,

    /// JSON export of print-server queues
    #[serde(default = "default_directory_file")]
    pub directory_file: String,

    // Fetching
    /// Devices polled at the same time
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Timeout of each management-page request in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// Accept self-signed device certificates
    #[serde(default = "default_tls_accept_invalid_certs")]
    pub tls_accept_invalid_certs: bool,

    /// PEM certificate to pin instead of accepting any certificate
    #[serde(default)]
    pub tls_ca_cert_path: Option<String>,

    // Alerts
    /// Toner percentage below which a device is flagged
    #[serde(default = "default_toner_alert_threshold")]
    pub toner_alert_threshold: i32,

    /// Hours without an Online observation before an offline alert is long-running
    #[serde(default = "default_offline_alert_hours")]
    pub offline_alert_hours: i64,

    // Run mode
    /// Log fetch progress every N devices
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// Seconds between cycles; 0 runs a single cycle and exits
    #[serde(default)]
    pub poll_interval_secs: u64,

    /// Reconcile into memory instead of PostgreSQL
    #[serde(default)]
    pub dry_run: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "printfleet".to_string()
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "printfleet".to_string()
}

fn default_postgres_username() -> String {
    "printfleet".to_string()
}

fn default_postgres_password() -> String {
    "printfleet".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    5
}

fn default_print_server_address() -> String {
    "10.3.3.10".to_string()
}

fn default_directory_file() -> String {
    "printers.json".to_string()
}

fn default_max_concurrent_requests() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_session_cookie() -> String {
    "rtl=0; css=1".to_string()
}

fn default_tls_accept_invalid_certs() -> bool {
    true
}

fn default_toner_alert_threshold() -> i32 {
    10
}

fn default_offline_alert_hours() -> i64 {
    48
}

fn default_progress_interval() -> usize {
    10
}

/// Upper bound on devices polled at the same time
pub const MAX_CONCURRENT_REQUESTS_LIMIT: usize = 1024;

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("PRINTFLEET"))
            .build()?
            .try_deserialize()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_concurrent_requests == 0 {
            return Err(DomainError::InvalidConfiguration(
                "max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_requests > MAX_CONCURRENT_REQUESTS_LIMIT {
            return Err(DomainError::InvalidConfiguration(format!(
                "max_concurrent_requests must be at most {MAX_CONCURRENT_REQUESTS_LIMIT}, got {}",
                self.max_concurrent_requests
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(DomainError::InvalidConfiguration(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if !(0..=100).contains(&self.toner_alert_threshold) {
            return Err(DomainError::InvalidConfiguration(format!(
                "toner_alert_threshold must be a percentage, got {}",
                self.toner_alert_threshold
            )));
        }
        Ok(())
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
        }
    }

    pub fn fetcher_config(&self) -> HttpsFetcherConfig {
        HttpsFetcherConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            session_cookie: self.session_cookie.clone(),
            accept_invalid_certs: self.tls_accept_invalid_certs,
            ca_cert_path: self.tls_ca_cert_path.as_ref().map(PathBuf::from),
            max_idle_per_host: HttpsFetcherConfig::default().max_idle_per_host,
        }
    }

    pub fn poller_config(&self) -> FleetPollerConfig {
        FleetPollerConfig {
            print_server_address: self.print_server_address.clone(),
            max_concurrent_requests: self.max_concurrent_requests,
            toner_alert_threshold: self.toner_alert_threshold,
            offline_alert_hours: self.offline_alert_hours,
            progress_interval: self.progress_interval,
            poll_interval: (self.poll_interval_secs > 0)
                .then(|| Duration::from_secs(self.poll_interval_secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests run serially and don't interfere with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "PRINTFLEET_LOG_LEVEL",
        "PRINTFLEET_MAX_CONCURRENT_REQUESTS",
        "PRINTFLEET_POLL_INTERVAL_SECS",
        "PRINTFLEET_DRY_RUN",
        "PRINTFLEET_TLS_CA_CERT_PATH",
        "PRINTFLEET_TONER_ALERT_THRESHOLD",
    ];

    fn clear_env() {
        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            for var in VARS {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::from_env().unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.print_server_address, "10.3.3.10");
        assert_eq!(config.max_concurrent_requests, 10);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.toner_alert_threshold, 10);
        assert_eq!(config.offline_alert_hours, 48);
        assert!(config.tls_accept_invalid_certs);
        assert!(config.tls_ca_cert_path.is_none());
        assert!(!config.dry_run);
        assert!(config.poller_config().poll_interval.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("PRINTFLEET_LOG_LEVEL", "debug");
            std::env::set_var("PRINTFLEET_MAX_CONCURRENT_REQUESTS", "20");
            std::env::set_var("PRINTFLEET_POLL_INTERVAL_SECS", "300");
            std::env::set_var("PRINTFLEET_DRY_RUN", "true");
            std::env::set_var("PRINTFLEET_TLS_CA_CERT_PATH", "/etc/printfleet/device-ca.pem");
        }

        let config = ServiceConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.max_concurrent_requests, 20);
        assert!(config.dry_run);

        let poller = config.poller_config();
        assert_eq!(poller.poll_interval, Some(Duration::from_secs(300)));
        assert_eq!(poller.max_concurrent_requests, 20);

        let fetcher = config.fetcher_config();
        assert_eq!(
            fetcher.ca_cert_path,
            Some(PathBuf::from("/etc/printfleet/device-ca.pem"))
        );
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("PRINTFLEET_MAX_CONCURRENT_REQUESTS", "0");
        }

        let config = ServiceConfig::from_env().unwrap();
        clear_env();

        assert!(matches!(
            config.validate(),
            Err(DomainError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_oversized_concurrency_is_rejected() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var(
                "PRINTFLEET_MAX_CONCURRENT_REQUESTS",
                (MAX_CONCURRENT_REQUESTS_LIMIT + 1).to_string(),
            );
        }

        let config = ServiceConfig::from_env().unwrap();
        clear_env();

        assert!(matches!(
            config.validate(),
            Err(DomainError::InvalidConfiguration(_))
        ));

        let at_limit = ServiceConfig {
            max_concurrent_requests: MAX_CONCURRENT_REQUESTS_LIMIT,
            ..config
        };
        assert!(at_limit.validate().is_ok());
    }
}
