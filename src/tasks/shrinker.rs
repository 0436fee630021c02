//! Memory Shrinker
//!
//! Periodic task that reclaims expired and idle elements from one region.
//! Registered with the shared scheduler when the region enables it.

use std::sync::{Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheElement, MemoryStore};
use crate::error::{CacheError, Result};
use crate::tasks::PeriodicTask;

// == Run Statistics ==
/// Outcome of one shrinker pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShrinkerRunStats {
    /// Keys present in the snapshot
    pub scanned: usize,
    /// Elements actually removed
    pub freed: usize,
    /// Elements handed to the secondary store
    pub spooled: usize,
    /// Hand-offs that failed; those elements stay in memory
    pub spool_failures: usize,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Whether `element` should leave memory at `now`.
///
/// Either its own attributes expire it, or it has sat unread longer than the
/// region's memory idle bound.
pub fn is_reclaimable(
    element: &CacheElement,
    now: DateTime<Utc>,
    max_memory_idle: Option<Duration>,
) -> bool {
    if element.is_expired(now) {
        return true;
    }
    !element.attributes.is_eternal
        && max_memory_idle.is_some_and(|max| element.attributes.idle_time(now) > max)
}

// == Shrink ==
/// Runs one pass over `store`.
///
/// Works from a key snapshot and re-reads every element before acting on it,
/// so keys removed meanwhile are skipped. The final removal re-checks the
/// current element under the store lock, so an element refreshed after the
/// snapshot is never evicted.
pub async fn shrink(store: &MemoryStore) -> Result<ShrinkerRunStats> {
    let config = store.config();
    let max_memory_idle = config.max_memory_idle();
    let now = Utc::now();

    let keys = store.key_array().await?;
    let mut stats = ShrinkerRunStats {
        scanned: keys.len(),
        ..ShrinkerRunStats::default()
    };

    for key in keys {
        if config
            .max_spool_per_run
            .is_some_and(|limit| stats.spooled >= limit)
        {
            debug!(
                region = %store.region(),
                spooled = stats.spooled,
                "Spool limit reached for this run"
            );
            break;
        }

        let Some(element) = store.get_quiet(&key).await? else {
            continue;
        };
        if !is_reclaimable(&element, now, max_memory_idle) {
            continue;
        }

        if config.spool_on_shrink {
            match store.waterfall(element).await {
                Ok(true) => stats.spooled += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        region = %store.region(),
                        %key,
                        error = %e,
                        "Failed to spool element during shrink"
                    );
                    stats.spool_failures += 1;
                    continue;
                }
            }
        }

        let removed = store
            .remove_if(&key, |current| is_reclaimable(current, now, max_memory_idle))
            .await?;
        if removed {
            stats.freed += 1;
        }
    }

    stats.finished_at = Some(Utc::now());
    Ok(stats)
}

// == Shrinker Task ==
/// Scheduler registration target for one region.
///
/// Holds the store weakly: a store dropped without `dispose` turns the
/// remaining runs into no-ops instead of being kept alive by its own timer.
pub struct Shrinker {
    region: String,
    store: Weak<MemoryStore>,
    last_run: Mutex<Option<ShrinkerRunStats>>,
}

impl Shrinker {
    pub fn new(region: impl Into<String>, store: Weak<MemoryStore>) -> Self {
        Self {
            region: region.into(),
            store,
            last_run: Mutex::new(None),
        }
    }

    pub fn last_run(&self) -> Option<ShrinkerRunStats> {
        self.last_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs one pass immediately and records its statistics.
    pub async fn run_now(&self) -> Result<ShrinkerRunStats> {
        let Some(store) = self.store.upgrade() else {
            debug!(region = %self.region, "Shrinker target dropped, nothing to do");
            return Ok(ShrinkerRunStats::default());
        };

        let stats = shrink(&store).await?;

        if stats.freed > 0 || stats.spool_failures > 0 {
            info!(
                region = %self.region,
                freed = stats.freed,
                spooled = stats.spooled,
                spool_failures = stats.spool_failures,
                "Memory shrink completed"
            );
        } else {
            debug!(
                region = %self.region,
                scanned = stats.scanned,
                "Memory shrink: nothing to free"
            );
        }

        *self.last_run.lock().unwrap_or_else(PoisonError::into_inner) = Some(stats.clone());
        Ok(stats)
    }
}

#[async_trait]
impl PeriodicTask for Shrinker {
    fn name(&self) -> String {
        format!("shrinker:{}", self.region)
    }

    async fn run(&self) -> Result<()> {
        match self.run_now().await {
            Ok(_) => Ok(()),
            // A run racing the region's dispose has nothing left to do
            Err(CacheError::Disposed(_)) => {
                debug!(region = %self.region, "Region disposed during shrink");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
