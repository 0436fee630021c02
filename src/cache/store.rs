//! Memory Store Module
//!
//! Region-scoped cache façade over an [`EvictionOrderedStore`]. Owns the
//! region lifecycle, group-key scans, capacity overflow and the hook that
//! hands elements to the secondary store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheElement, CacheKey, CacheStats, EvictionOrderedStore, GroupId, StoreStatistics,
};
use crate::config::RegionConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{ScheduledTask, SharedScheduler, Shrinker};

// == Secondary Store ==
/// Overflow target owned by the cache hub (for example a disk tier).
#[async_trait]
pub trait SecondaryStore: Send + Sync {
    async fn spill_to_secondary(&self, element: CacheElement) -> std::io::Result<()>;
}

/// Region lifecycle. A store exists only once initialized, so it starts ALIVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Alive,
    Disposed,
}

#[derive(Debug)]
struct StoreInner {
    status: StoreStatus,
    map: EvictionOrderedStore<CacheKey, CacheElement>,
    stats: CacheStats,
}

struct ShrinkerRegistration {
    task: ScheduledTask,
    shrinker: Arc<Shrinker>,
}

// == Memory Store ==
/// In-memory store for one region.
///
/// All state sits behind one `RwLock`. Single-key operations hold it for one
/// key's work; full scans (`remove_all`, `key_array`, `group_keys`) hold it
/// exclusively for the whole scan. The lock is never held across a call into
/// the secondary store.
pub struct MemoryStore {
    config: RegionConfig,
    inner: RwLock<StoreInner>,
    secondary: Option<Arc<dyn SecondaryStore>>,
    scheduler: SharedScheduler,
    shrinker: Mutex<Option<ShrinkerRegistration>>,
}

impl MemoryStore {
    // == Initialize ==
    /// Builds an ALIVE store for `config.region_name`.
    ///
    /// The eviction policy comes from `config.eviction_policy`. When the region
    /// enables shrinking, the store takes a share of `scheduler` and registers
    /// a [`Shrinker`] at the configured interval.
    pub fn initialize(
        config: RegionConfig,
        secondary: Option<Arc<dyn SecondaryStore>>,
        scheduler: SharedScheduler,
    ) -> Result<Arc<Self>> {
        let map =
            EvictionOrderedStore::with_policy(config.max_size(), config.eviction_policy.build());
        let store = Arc::new(Self {
            inner: RwLock::new(StoreInner {
                status: StoreStatus::Alive,
                map,
                stats: CacheStats::new(),
            }),
            secondary,
            scheduler,
            shrinker: Mutex::new(None),
            config,
        });

        if store.config.use_memory_shrinker {
            store.scheduler.acquire()?;
            let shrinker = Arc::new(Shrinker::new(
                store.config.region_name.clone(),
                Arc::downgrade(&store),
            ));
            let task = match store
                .scheduler
                .execute_periodically(store.config.shrinker_interval(), shrinker.clone())
            {
                Ok(task) => task,
                Err(e) => {
                    store.scheduler.release();
                    return Err(e);
                }
            };
            *store.registration() = Some(ShrinkerRegistration { task, shrinker });
        }

        info!(
            region = %store.config.region_name,
            policy = ?store.config.eviction_policy,
            max_objects = store.config.max_objects,
            shrinker = store.config.use_memory_shrinker,
            "Memory store initialized"
        );
        Ok(store)
    }

    fn registration(&self) -> std::sync::MutexGuard<'_, Option<ShrinkerRegistration>> {
        self.shrinker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_alive(&self, inner: &StoreInner) -> Result<()> {
        match inner.status {
            StoreStatus::Alive => Ok(()),
            StoreStatus::Disposed => Err(CacheError::Disposed(self.config.region_name.clone())),
        }
    }

    pub fn region(&self) -> &str {
        &self.config.region_name
    }

    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    pub async fn status(&self) -> StoreStatus {
        self.inner.read().await.status
    }

    /// The region's shrinker, if one is registered.
    pub fn shrinker(&self) -> Option<Arc<Shrinker>> {
        self.registration().as_ref().map(|r| r.shrinker.clone())
    }

    // == Get ==
    /// Touching lookup: promotes the element, refreshes its last access time
    /// and counts a hit or a miss.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<CacheElement>> {
        let mut inner = self.inner.write().await;
        self.ensure_alive(&inner)?;

        let found = inner.map.get_mut(key).map(|element| {
            element.attributes.touch();
            element.clone()
        });
        match found {
            Some(element) => {
                inner.stats.record_hit();
                debug!(region = %self.config.region_name, %key, "MemoryCache hit");
                Ok(Some(element))
            }
            None => {
                inner.stats.record_miss();
                debug!(region = %self.config.region_name, %key, "MemoryCache miss");
                Ok(None)
            }
        }
    }

    // == Get Quiet ==
    /// Lookup that leaves recency order, access time and counters untouched.
    pub async fn get_quiet(&self, key: &CacheKey) -> Result<Option<CacheElement>> {
        let inner = self.inner.read().await;
        self.ensure_alive(&inner)?;
        Ok(inner.map.peek(key).cloned())
    }

    // == Get Multiple ==
    /// Calls [`get`](Self::get) for each key; misses are left out.
    pub async fn get_multiple<'a, I>(&self, keys: I) -> Result<HashMap<CacheKey, CacheElement>>
    where
        I: IntoIterator<Item = &'a CacheKey>,
    {
        let mut found = HashMap::new();
        for key in keys {
            if let Some(element) = self.get(key).await? {
                found.insert(key.clone(), element);
            }
        }
        Ok(found)
    }

    // == Update ==
    /// Inserts or replaces `element` by key.
    ///
    /// A new key arriving at a full store first frees `spool_chunk_size`
    /// victims (at least one) in policy order. Victims go to the secondary
    /// store after the lock is released; the first spill failure is returned.
    pub async fn update(&self, element: CacheElement) -> Result<()> {
        if element.region != self.config.region_name {
            return Err(CacheError::InvalidRequest(format!(
                "Element for region '{}' sent to region '{}'",
                element.region, self.config.region_name
            )));
        }

        let victims = {
            let mut inner = self.inner.write().await;
            self.ensure_alive(&inner)?;

            let mut victims = Vec::new();
            let full = inner
                .map
                .max_size()
                .is_some_and(|max| inner.map.len() >= max);
            if full && !inner.map.contains(&element.key) {
                for _ in 0..self.config.spool_chunk_size.max(1) {
                    match inner.map.pop_victim() {
                        Some((_, victim)) => victims.push(victim),
                        None => break,
                    }
                }
            }

            if let Some((_, victim)) = inner.map.put(element.key.clone(), element) {
                victims.push(victim);
            }
            for _ in &victims {
                inner.stats.record_eviction();
            }
            victims
        };

        self.spill_all(victims).await
    }

    async fn spill_all(&self, victims: Vec<CacheElement>) -> Result<()> {
        let mut first_error = None;
        for victim in victims {
            let key = victim.key.clone();
            if let Err(e) = self.waterfall(victim).await {
                warn!(
                    region = %self.config.region_name,
                    %key,
                    error = %e,
                    "Failed to spool evicted element"
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // == Remove ==
    /// Removes `key`; returns whether it was present.
    pub async fn remove(&self, key: &CacheKey) -> Result<bool> {
        let mut inner = self.inner.write().await;
        self.ensure_alive(&inner)?;
        let removed = inner.map.remove(key).is_some();
        debug!(region = %self.config.region_name, %key, removed, "MemoryCache remove");
        Ok(removed)
    }

    /// Removes `key` only if `predicate` holds for the element currently stored.
    pub async fn remove_if<F>(&self, key: &CacheKey, predicate: F) -> Result<bool>
    where
        F: FnOnce(&CacheElement) -> bool,
    {
        let mut inner = self.inner.write().await;
        self.ensure_alive(&inner)?;
        Ok(inner.map.remove_if(key, predicate).is_some())
    }

    // == Remove All ==
    /// Clears the region in one exclusive step.
    pub async fn remove_all(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        self.ensure_alive(&inner)?;
        let cleared = inner.map.len();
        inner.map.clear();
        info!(region = %self.config.region_name, cleared, "MemoryCache removeAll");
        Ok(())
    }

    // == Free Elements ==
    /// Pushes up to `count` elements out of memory in eviction order, handing
    /// each to the secondary store. Returns the number removed from memory.
    pub async fn free_elements(&self, count: usize) -> Result<usize> {
        let victims = {
            let mut inner = self.inner.write().await;
            self.ensure_alive(&inner)?;
            let mut victims = Vec::with_capacity(count.min(inner.map.len()));
            while victims.len() < count {
                match inner.map.pop_victim() {
                    Some((_, victim)) => victims.push(victim),
                    None => break,
                }
            }
            victims
        };

        let freed = victims.len();
        self.spill_all(victims).await?;
        Ok(freed)
    }

    // == Snapshots ==
    /// Snapshot of every live key, least recent first.
    pub async fn key_array(&self) -> Result<Vec<CacheKey>> {
        let inner = self.inner.write().await;
        self.ensure_alive(&inner)?;
        Ok(inner.map.keys().cloned().collect())
    }

    /// Snapshot of every live element, least recent first.
    pub async fn entries(&self) -> Result<Vec<CacheElement>> {
        let inner = self.inner.read().await;
        self.ensure_alive(&inner)?;
        Ok(inner.map.entries().map(|(_, element)| element.clone()).collect())
    }

    // == Group Keys ==
    /// Attribute names of the live group keys of `group` in this region.
    pub async fn group_keys(&self, group: &str) -> Result<HashSet<String>> {
        let group_id = GroupId::new(self.config.region_name.clone(), group);
        let inner = self.inner.write().await;
        self.ensure_alive(&inner)?;
        Ok(inner
            .map
            .keys()
            .filter_map(|key| key.attr_in(&group_id))
            .map(String::from)
            .collect())
    }

    // == Waterfall ==
    /// Hands `element` to the hub's secondary store.
    ///
    /// Returns whether the element was handed off. Without a secondary store
    /// the element is simply dropped and `false` is returned.
    pub async fn waterfall(&self, element: CacheElement) -> Result<bool> {
        let Some(secondary) = &self.secondary else {
            debug!(
                region = %self.config.region_name,
                key = %element.key,
                "No secondary store, element dropped"
            );
            return Ok(false);
        };
        secondary.spill_to_secondary(element).await?;
        self.inner.write().await.stats.record_spool();
        Ok(true)
    }

    // == Size / Statistics ==
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Point-in-time statistics snapshot.
    pub async fn statistics(&self) -> StoreStatistics {
        let last_shrink = self.shrinker().and_then(|s| s.last_run());
        let inner = self.inner.read().await;
        StoreStatistics {
            type_name: inner.map.policy().name().to_string(),
            region: self.config.region_name.clone(),
            size: inner.map.len(),
            counters: inner.stats.clone(),
            last_shrink,
        }
    }

    // == Dispose ==
    /// Stops this region's shrinker, gives back its scheduler share and moves
    /// the region to DISPOSED. Repeated calls are no-ops.
    pub async fn dispose(&self) -> Result<()> {
        {
            let mut inner = self.inner.write().await;
            if inner.status == StoreStatus::Disposed {
                return Ok(());
            }
            inner.status = StoreStatus::Disposed;
        }

        let registration = self.registration().take();
        if let Some(registration) = registration {
            registration.task.cancel();
            self.scheduler.release();
        }

        info!(region = %self.config.region_name, "Memory store disposed");
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("region", &self.config.region_name)
            .field("policy", &self.config.eviction_policy)
            .field("max_objects", &self.config.max_objects)
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ElementAttributes, EvictionPolicyKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSecondary {
        spilled: Mutex<Vec<CacheKey>>,
        fail: bool,
    }

    #[async_trait]
    impl SecondaryStore for RecordingSecondary {
        async fn spill_to_secondary(&self, element: CacheElement) -> std::io::Result<()> {
            if self.fail {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk unavailable"));
            }
            self.spilled.lock().unwrap().push(element.key);
            Ok(())
        }
    }

    fn config(max_objects: usize) -> RegionConfig {
        RegionConfig {
            max_objects,
            spool_chunk_size: 1,
            ..RegionConfig::new("testRegion")
        }
    }

    fn store(max_objects: usize) -> Arc<MemoryStore> {
        MemoryStore::initialize(config(max_objects), None, SharedScheduler::new()).unwrap()
    }

    fn element(key: &str, value: &str) -> CacheElement {
        CacheElement::new("testRegion", key, value)
    }

    #[tokio::test]
    async fn test_update_and_get() {
        let store = store(100);
        store.update(element("key1", "value1")).await.unwrap();

        let found = store.get(&"key1".into()).await.unwrap().unwrap();
        assert_eq!(found.value, "value1");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_miss_is_not_an_error() {
        let store = store(100);
        assert!(store.get(&"nope".into()).await.unwrap().is_none());
        assert!(store.get_quiet(&"nope".into()).await.unwrap().is_none());
        assert!(!store.remove(&"nope".into()).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_touches_but_get_quiet_does_not() {
        let store = store(3);
        for k in ["a", "b", "c"] {
            store.update(element(k, k)).await.unwrap();
        }

        store.get_quiet(&"a".into()).await.unwrap();
        store.update(element("d", "d")).await.unwrap();
        assert!(store.get_quiet(&"a".into()).await.unwrap().is_none());

        store.get(&"b".into()).await.unwrap();
        store.update(element("e", "e")).await.unwrap();
        assert!(store.get_quiet(&"b".into()).await.unwrap().is_some());
        assert!(store.get_quiet(&"c".into()).await.unwrap().is_none());

        let stats = store.statistics().await;
        assert_eq!(stats.counters.hits, 1);
        assert_eq!(stats.counters.misses, 0);
    }

    #[tokio::test]
    async fn test_get_refreshes_last_access() {
        let store = store(10);
        let mut attrs = ElementAttributes::new();
        attrs.last_access = chrono::Utc::now() - chrono::Duration::seconds(100);
        store
            .update(element("k", "v").with_attributes(attrs.clone()))
            .await
            .unwrap();

        let quiet = store.get_quiet(&"k".into()).await.unwrap().unwrap();
        assert_eq!(quiet.attributes.last_access, attrs.last_access);

        let touched = store.get(&"k".into()).await.unwrap().unwrap();
        assert!(touched.attributes.last_access > attrs.last_access);
    }

    #[tokio::test]
    async fn test_get_multiple() {
        let store = store(100);
        store.update(element("a", "1")).await.unwrap();
        store.update(element("b", "2")).await.unwrap();

        let keys = vec![CacheKey::plain("a"), CacheKey::plain("b"), CacheKey::plain("zz")];
        let found = store.get_multiple(&keys).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[&CacheKey::plain("b")].value, "2");

        let none: Vec<CacheKey> = Vec::new();
        assert!(store.get_multiple(&none).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bound_holds_and_victims_spill() {
        let secondary = Arc::new(RecordingSecondary::default());
        let store =
            MemoryStore::initialize(config(5), Some(secondary.clone()), SharedScheduler::new())
                .unwrap();

        for i in 0..8 {
            store.update(element(&format!("k{}", i), "v")).await.unwrap();
            assert!(store.len().await <= 5);
        }

        let spilled = secondary.spilled.lock().unwrap().clone();
        assert_eq!(
            spilled,
            vec![CacheKey::plain("k0"), CacheKey::plain("k1"), CacheKey::plain("k2")]
        );
        let stats = store.statistics().await;
        assert_eq!(stats.counters.evictions, 3);
        assert_eq!(stats.counters.spooled, 3);
    }

    #[tokio::test]
    async fn test_spool_chunk_frees_several() {
        let cfg = RegionConfig {
            spool_chunk_size: 3,
            ..config(5)
        };
        let store = MemoryStore::initialize(cfg, None, SharedScheduler::new()).unwrap();

        for i in 0..6 {
            store.update(element(&format!("k{}", i), "v")).await.unwrap();
        }
        assert_eq!(store.len().await, 3);
        assert_eq!(
            store.key_array().await.unwrap(),
            vec![CacheKey::plain("k3"), CacheKey::plain("k4"), CacheKey::plain("k5")]
        );
    }

    #[tokio::test]
    async fn test_spill_failure_is_io_error() {
        let secondary = Arc::new(RecordingSecondary {
            fail: true,
            ..Default::default()
        });
        let store =
            MemoryStore::initialize(config(1), Some(secondary), SharedScheduler::new()).unwrap();

        store.update(element("a", "1")).await.unwrap();
        let result = store.update(element("b", "2")).await;
        assert!(matches!(result, Err(CacheError::Io(_))));
        // The triggering insert itself still happened
        assert!(store.get_quiet(&"b".into()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_free_elements() {
        let secondary = Arc::new(RecordingSecondary::default());
        let store =
            MemoryStore::initialize(config(0), Some(secondary.clone()), SharedScheduler::new())
                .unwrap();
        for i in 0..4 {
            store.update(element(&format!("k{}", i), "v")).await.unwrap();
        }

        assert_eq!(store.free_elements(3).await.unwrap(), 3);
        assert_eq!(store.len().await, 1);
        assert_eq!(secondary.spilled.lock().unwrap().len(), 3);
        assert_eq!(store.free_elements(10).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_all_then_empty() {
        let store = store(100);
        for i in 0..10 {
            store.update(element(&format!("k{}", i), "v")).await.unwrap();
        }
        store.remove_all().await.unwrap();

        assert_eq!(store.len().await, 0);
        assert!(store.key_array().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_group_keys() {
        let store = store(100);
        let grouped = [
            ("testRegion", "g1", "color", "red"),
            ("testRegion", "g1", "size", "xl"),
            ("testRegion", "g2", "shape", "round"),
            ("otherRegion", "g1", "weight", "1kg"),
        ];
        for (key_region, group, attr, value) in grouped {
            let key = CacheKey::group(key_region, group, attr);
            store
                .update(CacheElement::new("testRegion", key, value))
                .await
                .unwrap();
        }
        store.update(element("color", "plain")).await.unwrap();

        let keys = store.group_keys("g1").await.unwrap();
        let expected: HashSet<String> = ["color", "size"].iter().map(|s| s.to_string()).collect();
        assert_eq!(keys, expected);
        assert!(store.group_keys("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_region_rejected() {
        let store = store(10);
        let result = store.update(CacheElement::new("elsewhere", "k", "v")).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_statistics_type_name_follows_policy() {
        let cfg = RegionConfig {
            eviction_policy: EvictionPolicyKind::Fifo,
            ..config(10)
        };
        let store = MemoryStore::initialize(cfg, None, SharedScheduler::new()).unwrap();
        let stats = store.statistics().await;
        assert_eq!(stats.type_name, "FIFO Memory Cache");
        assert_eq!(stats.size, 0);
        assert!(stats.last_shrink.is_none());
    }

    #[tokio::test]
    async fn test_dispose_is_terminal_and_idempotent() {
        let store = store(10);
        store.update(element("k", "v")).await.unwrap();

        store.dispose().await.unwrap();
        store.dispose().await.unwrap();

        assert_eq!(store.status().await, StoreStatus::Disposed);
        assert!(matches!(store.get(&"k".into()).await, Err(CacheError::Disposed(_))));
        assert!(matches!(store.update(element("k", "v")).await, Err(CacheError::Disposed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shrinker_registration_lifecycle() {
        let scheduler = SharedScheduler::new();
        let cfg = RegionConfig {
            use_memory_shrinker: true,
            shrinker_interval_secs: 1,
            ..config(10)
        };
        let a = MemoryStore::initialize(cfg.clone(), None, scheduler.clone()).unwrap();
        let b = MemoryStore::initialize(
            RegionConfig {
                region_name: "other".into(),
                ..cfg
            },
            None,
            scheduler.clone(),
        )
        .unwrap();

        assert_eq!(scheduler.users(), 2);
        assert_eq!(scheduler.task_count(), 2);
        assert!(a.shrinker().is_some());

        a.dispose().await.unwrap();
        assert!(scheduler.is_running());
        assert_eq!(scheduler.task_count(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(b.shrinker().unwrap().last_run().is_some());

        b.dispose().await.unwrap();
        assert!(!scheduler.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_leave_bound_intact() {
        let store = store(50);
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    for i in 0..100 {
                        store
                            .update(element(&format!("t{}-{}", t, i), "v"))
                            .await
                            .unwrap();
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 800);
        assert_eq!(store.len().await, 50);
    }
}
