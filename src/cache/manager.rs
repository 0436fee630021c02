//! Cache Manager Module
//!
//! Owns the shared scheduler, every region's memory store and the optional
//! lateral dispatcher, and tears them down in that order's reverse.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{CacheElement, CacheKey, MemoryStore, SecondaryStore};
use crate::config::{LateralConfig, RegionConfig};
use crate::error::{CacheError, Result};
use crate::lateral::{GroupTransport, LateralConnector, LateralListener, RpcDispatcher};
use crate::tasks::SharedScheduler;

/// Region name -> store, shared between the manager and its lateral listener.
pub type RegionRegistry = Arc<RwLock<HashMap<String, Arc<MemoryStore>>>>;

// == Cache Manager ==
pub struct CacheManager {
    defaults: RegionConfig,
    scheduler: SharedScheduler,
    regions: RegionRegistry,
    secondary: Option<Arc<dyn SecondaryStore>>,
    dispatcher: RwLock<Option<Arc<RpcDispatcher>>>,
}

impl CacheManager {
    /// Creates a manager; `defaults` is the template for regions created by name.
    pub fn new(defaults: RegionConfig) -> Self {
        Self {
            defaults,
            scheduler: SharedScheduler::new(),
            regions: Arc::new(RwLock::new(HashMap::new())),
            secondary: None,
            dispatcher: RwLock::new(None),
        }
    }

    /// Attaches the overflow target handed to every region created afterwards.
    pub fn with_secondary(mut self, secondary: Arc<dyn SecondaryStore>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn scheduler(&self) -> &SharedScheduler {
        &self.scheduler
    }

    // == Regions ==
    /// Initializes a region from `config`, or returns the existing one.
    pub async fn add_region(&self, config: RegionConfig) -> Result<Arc<MemoryStore>> {
        if config.region_name.is_empty() {
            return Err(CacheError::InvalidRequest("Region name cannot be empty".into()));
        }

        let mut regions = self.regions.write().await;
        if let Some(existing) = regions.get(&config.region_name) {
            return Ok(existing.clone());
        }

        let name = config.region_name.clone();
        let store =
            MemoryStore::initialize(config, self.secondary.clone(), self.scheduler.clone())?;
        regions.insert(name, store.clone());
        Ok(store)
    }

    /// Returns region `name`, creating it from the defaults on first use.
    pub async fn region(&self, name: &str) -> Result<Arc<MemoryStore>> {
        if let Some(store) = self.get_region(name).await {
            return Ok(store);
        }
        self.add_region(RegionConfig {
            region_name: name.to_string(),
            ..self.defaults.clone()
        })
        .await
    }

    pub async fn get_region(&self, name: &str) -> Option<Arc<MemoryStore>> {
        self.regions.read().await.get(name).cloned()
    }

    /// Region names, sorted.
    pub async fn region_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.regions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Disposes and forgets region `name`. Returns whether it existed.
    pub async fn dispose_region(&self, name: &str) -> Result<bool> {
        let removed = self.regions.write().await.remove(name);
        match removed {
            Some(store) => {
                store.dispose().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // == Lateral ==
    /// Listener that applies peer operations to this manager's regions.
    pub fn listener(&self) -> Arc<RegionListener> {
        Arc::new(RegionListener {
            regions: self.regions.clone(),
        })
    }

    /// Joins the lateral group described by `config`.
    ///
    /// Returns whether a dispatcher is now attached. Failure leaves the
    /// manager fully functional without propagation.
    pub async fn connect_lateral(
        &self,
        transport: Arc<dyn GroupTransport>,
        config: &LateralConfig,
    ) -> bool {
        let connector = LateralConnector::new(transport);
        let dispatcher = connector
            .connect(&config.group_name, self.listener(), config, config.connect_timeout())
            .await;

        let connected = dispatcher.is_some();
        *self.dispatcher.write().await = dispatcher.map(Arc::new);
        connected
    }

    pub async fn dispatcher(&self) -> Option<Arc<RpcDispatcher>> {
        self.dispatcher.read().await.clone()
    }

    // == Propagating Operations ==
    /// Updates the element locally, then broadcasts it to peers.
    ///
    /// Propagation is fire-and-forget: a failed broadcast is logged only.
    pub async fn put(&self, element: CacheElement) -> Result<()> {
        let store = self.region(&element.region).await?;
        store.update(element.clone()).await?;
        if let Some(dispatcher) = self.dispatcher().await {
            if let Err(e) = dispatcher.broadcast_update(element).await {
                warn!(error = %e, "Lateral update broadcast failed");
            }
        }
        Ok(())
    }

    /// Removes `key` locally, then broadcasts the removal.
    pub async fn remove(&self, region: &str, key: &CacheKey) -> Result<bool> {
        let store = self
            .get_region(region)
            .await
            .ok_or_else(|| CacheError::NotFound(format!("region '{}'", region)))?;
        let removed = store.remove(key).await?;
        if let Some(dispatcher) = self.dispatcher().await {
            if let Err(e) = dispatcher.broadcast_remove(region, key).await {
                warn!(error = %e, "Lateral remove broadcast failed");
            }
        }
        Ok(removed)
    }

    /// Clears `region` locally, then broadcasts the clear.
    pub async fn remove_all(&self, region: &str) -> Result<()> {
        let store = self
            .get_region(region)
            .await
            .ok_or_else(|| CacheError::NotFound(format!("region '{}'", region)))?;
        store.remove_all().await?;
        if let Some(dispatcher) = self.dispatcher().await {
            if let Err(e) = dispatcher.broadcast_remove_all(region).await {
                warn!(error = %e, "Lateral removeAll broadcast failed");
            }
        }
        Ok(())
    }

    // == Shutdown ==
    /// Leaves the group, disposes every region and stops the scheduler.
    pub async fn shutdown(&self) {
        self.dispatcher.write().await.take();

        let stores: Vec<Arc<MemoryStore>> =
            self.regions.write().await.drain().map(|(_, s)| s).collect();
        for store in stores {
            if let Err(e) = store.dispose().await {
                warn!(region = %store.region(), error = %e, "Region dispose failed");
            }
        }

        self.scheduler.shutdown();
        info!("Cache manager shut down");
    }
}

// == Region Listener ==
/// Applies peer operations to local regions without re-broadcasting them.
///
/// Operations for regions this node does not have are ignored.
pub struct RegionListener {
    regions: RegionRegistry,
}

impl RegionListener {
    async fn store(&self, region: &str) -> Option<Arc<MemoryStore>> {
        let store = self.regions.read().await.get(region).cloned();
        if store.is_none() {
            debug!(region, "Lateral operation for unknown region ignored");
        }
        store
    }
}

#[async_trait]
impl LateralListener for RegionListener {
    async fn on_update(&self, element: CacheElement) -> Result<()> {
        match self.store(&element.region).await {
            Some(store) => store.update(element).await,
            None => Ok(()),
        }
    }

    async fn on_remove(&self, region: &str, key: &CacheKey) -> Result<bool> {
        match self.store(region).await {
            Some(store) => store.remove(key).await,
            None => Ok(false),
        }
    }

    async fn on_remove_all(&self, region: &str) -> Result<()> {
        match self.store(region).await {
            Some(store) => store.remove_all().await,
            None => Ok(()),
        }
    }

    /// Peer reads use the quiet path so they never reorder local eviction.
    async fn on_get(&self, region: &str, key: &CacheKey) -> Result<Option<CacheElement>> {
        match self.store(region).await {
            Some(store) => store.get_quiet(key).await,
            None => Ok(None),
        }
    }
}
