use async_trait::async_trait;

use crate::core::process_id::ProcessId;

/// Process id -> owner address cache with expiry.
///
/// Implementations must not hold internal locks across the caller's awaits:
/// `get` returns an owned copy.
#[async_trait]
pub trait OwnerCache: Send + Sync + 'static {
    /// Cached owner, or `None` when absent or past its time-to-live.
    async fn get(&self, process_id: &ProcessId) -> Option<String>;

    /// Insert or refresh the owner; the entry's age restarts at zero.
    async fn put(&self, process_id: &ProcessId, owner: String);
}
