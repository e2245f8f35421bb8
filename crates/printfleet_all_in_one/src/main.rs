mod config;

use common::domain::{FleetTelemetryRepository, InMemoryFleetTelemetryRepository};
use common::postgres::{MigrationRunner, PostgresClient, PostgresFleetTelemetryRepository};
use common::telemetry::{TelemetryProviders, init_telemetry, shutdown_telemetry};
use config::ServiceConfig;
use fleet_poller::{FileDeviceDirectory, FleetPoller, HttpsPageFetcher};
use printfleet_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        print_server = %config.print_server_address,
        dry_run = config.dry_run,
        otel_enabled = config.otel_enabled,
        "starting printfleet poller"
    );
    debug!("Configuration: {:?}", config);

    let repository = match initialize_repository(&config).await {
        Ok(repo) => repo,
        Err(e) => {
            error!("Failed to initialize telemetry store: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let fetcher = match HttpsPageFetcher::new(&config.fetcher_config()) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(e) => {
            error!("Failed to build HTTPS client: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };
    if config.tls_ca_cert_path.is_none() && config.tls_accept_invalid_certs {
        warn!("device certificates are not verified");
    }

    let poller = FleetPoller::new(
        Arc::new(FileDeviceDirectory::new(&config.directory_file)),
        fetcher,
        repository,
        config.poller_config(),
    );

    let result = Runner::new()
        .with_named_process("fleet_poller", poller.into_runner_process())
        .with_closer(move || async move {
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await;

    if let Err(e) = result {
        eprintln!("printfleet exiting with error: {:#}", e);
        std::process::exit(1);
    }
}

async fn initialize_repository(
    config: &ServiceConfig,
) -> anyhow::Result<Arc<dyn FleetTelemetryRepository>> {
    if config.dry_run {
        info!("dry run, reconciling into memory");
        return Ok(Arc::new(InMemoryFleetTelemetryRepository::new()));
    }

    info!("Initializing PostgreSQL...");
    let client = PostgresClient::from_config(&config.postgres_config())?;
    client.ping().await?;
    MigrationRunner::new(client.clone()).run_migrations().await?;

    Ok(Arc::new(PostgresFleetTelemetryRepository::new(client)))
}
