use async_trait::async_trait;
use common::domain::DomainResult;
use std::collections::BTreeMap;

/// Display name to optional network address
pub type DirectoryListing = BTreeMap<String, Option<String>>;

/// Source of candidate devices for a print server
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn list_devices(&self, server_address: &str) -> DomainResult<DirectoryListing>;
}
