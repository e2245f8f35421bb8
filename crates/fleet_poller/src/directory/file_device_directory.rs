use crate::domain::{DeviceDirectory, DirectoryListing};
use async_trait::async_trait;
use common::domain::{DomainError, DomainResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, instrument};

static IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("static address pattern must compile")
});

/// One print queue as exported from a print server
#[derive(Debug, Clone, Deserialize)]
pub struct PrintQueue {
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Print-server queue exports keyed by server address
pub type QueueExport = HashMap<String, Vec<PrintQueue>>;

/// Turn exported queues into a directory listing
///
/// `\\server\P1` becomes `P1`; the address is the first dotted quad in the
/// queue comment, if any.
pub fn listing_from_queues(queues: &[PrintQueue]) -> DirectoryListing {
    queues
        .iter()
        .map(|queue| {
            let name = queue
                .name
                .rsplit('\\')
                .next()
                .unwrap_or(&queue.name)
                .to_string();
            let address = queue
                .comment
                .as_deref()
                .and_then(|c| IPV4.find(c))
                .map(|m| m.as_str().to_string());
            (name, address)
        })
        .collect()
}

/// DeviceDirectory backed by a JSON export of print-server queues
pub struct FileDeviceDirectory {
    path: PathBuf,
}

impl FileDeviceDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DeviceDirectory for FileDeviceDirectory {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn list_devices(&self, server_address: &str) -> DomainResult<DirectoryListing> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DomainError::DirectoryUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        let export: QueueExport = serde_json::from_str(&raw).map_err(|e| {
            DomainError::DirectoryUnavailable(format!("{}: {e}", self.path.display()))
        })?;

        let queues = export.get(server_address).ok_or_else(|| {
            DomainError::DirectoryUnavailable(format!("no queues exported for {server_address}"))
        })?;

        let listing = listing_from_queues(queues);
        debug!(devices = listing.len(), "directory listed");
        Ok(listing)
    }
}
