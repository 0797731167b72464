use async_trait::async_trait;
use thiserror::Error;

use crate::core::process_id::ProcessId;

/// Failures of an owner lookup. All of them make the resolver fail open.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("Registry request failed: {0}")]
    Request(String),

    #[error("Registry returned status {0}")]
    Status(u16),

    #[error("Malformed registry response: {0}")]
    Malformed(String),
}

/// OwnerRegistry defines the port for resolving the owner address of a process
#[async_trait]
pub trait OwnerRegistry: Send + Sync + 'static {
    /// Look up the owner of `process_id`.
    ///
    /// `Ok(None)` means the registry does not know the process.
    async fn lookup_owner(&self, process_id: &ProcessId) -> Result<Option<String>, RegistryError>;
}
