//! Cache Module
//!
//! Region-scoped in-memory caching: keys, elements, eviction-ordered storage,
//! the memory store façade and the manager that owns every region.

mod element;
mod key;
mod manager;
mod ordered;
mod policy;
mod stats;
mod store;


// Re-export public types
pub use element::{CacheElement, ElementAttributes};
pub use key::{CacheKey, GroupAttrName, GroupId};
pub use manager::{CacheManager, RegionListener, RegionRegistry};
pub use ordered::EvictionOrderedStore;
pub use policy::{EvictionPolicy, EvictionPolicyKind, Fifo, Lru, Mru, VictimEnd};
pub use stats::{CacheStats, StoreStatistics};
pub use store::{MemoryStore, SecondaryStore, StoreStatus};
