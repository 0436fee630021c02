//! Inbound callback surface for lateral operations.

use async_trait::async_trait;

use crate::cache::{CacheElement, CacheKey};
use crate::error::Result;

/// Receives the operations peers broadcast to this node.
///
/// Implementations apply them locally and must not re-broadcast.
#[async_trait]
pub trait LateralListener: Send + Sync {
    async fn on_update(&self, element: CacheElement) -> Result<()>;

    /// Returns whether something was removed.
    async fn on_remove(&self, region: &str, key: &CacheKey) -> Result<bool>;

    async fn on_remove_all(&self, region: &str) -> Result<()>;

    /// Answers a peer's lookup.
    async fn on_get(&self, region: &str, key: &CacheKey) -> Result<Option<CacheElement>>;
}
