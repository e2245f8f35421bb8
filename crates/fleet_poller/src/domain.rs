mod device_directory;
mod error;
mod fetch_orchestrator;
mod page_fetcher;
mod reconciliation_service;
mod scraper;
mod telemetry_client;

pub use device_directory::*;
pub use error::*;
pub use fetch_orchestrator::*;
pub use page_fetcher::*;
pub use reconciliation_service::*;
pub use scraper::*;
pub use telemetry_client::*;
