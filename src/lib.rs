//! Region Cache - in-process caching engine of a distributed cache
//!
//! Region-scoped stores with pluggable eviction, a shared background
//! shrinker scheduler and bounded-time joining of a lateral propagation group.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod lateral;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheElement, CacheKey, CacheManager, MemoryStore};
pub use config::{Config, LateralConfig, RegionConfig};
pub use error::{CacheError, Result};
