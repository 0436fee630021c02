//! Eviction Policy Module
//!
//! Strategy objects that decide how accesses reorder the recency list and
//! which end of it is sacrificed when a bounded store is full.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// End of the recency order a policy evicts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VictimEnd {
    /// Least recently promoted entry
    Oldest,
    /// Most recently promoted entry
    Newest,
}

// == Eviction Policy ==
/// Ordering rules plugged into an [`EvictionOrderedStore`](super::EvictionOrderedStore).
pub trait EvictionPolicy: fmt::Debug + Send + Sync {
    /// Name reported in statistics.
    fn name(&self) -> &'static str;

    /// Whether a touching read moves the entry to the newest position.
    fn promotes_on_read(&self) -> bool;

    /// Whether replacing an existing key moves it to the newest position.
    fn promotes_on_write(&self) -> bool;

    fn victim(&self) -> VictimEnd;
}

/// Least recently used.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lru;

impl EvictionPolicy for Lru {
    fn name(&self) -> &'static str {
        "LRU Memory Cache"
    }

    fn promotes_on_read(&self) -> bool {
        true
    }

    fn promotes_on_write(&self) -> bool {
        true
    }

    fn victim(&self) -> VictimEnd {
        VictimEnd::Oldest
    }
}

/// Most recently used. The victim is chosen before a new key goes in, so the
/// incoming entry is never its own victim.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mru;

impl EvictionPolicy for Mru {
    fn name(&self) -> &'static str {
        "MRU Memory Cache"
    }

    fn promotes_on_read(&self) -> bool {
        true
    }

    fn promotes_on_write(&self) -> bool {
        true
    }

    fn victim(&self) -> VictimEnd {
        VictimEnd::Newest
    }
}

/// First in, first out. Neither reads nor replacements reorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fifo;

impl EvictionPolicy for Fifo {
    fn name(&self) -> &'static str {
        "FIFO Memory Cache"
    }

    fn promotes_on_read(&self) -> bool {
        false
    }

    fn promotes_on_write(&self) -> bool {
        false
    }

    fn victim(&self) -> VictimEnd {
        VictimEnd::Oldest
    }
}

// == Policy Selector ==
/// Configuration-level selector for the eviction policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicyKind {
    #[default]
    Lru,
    Mru,
    Fifo,
}

impl EvictionPolicyKind {
    pub fn build(self) -> Box<dyn EvictionPolicy> {
        match self {
            EvictionPolicyKind::Lru => Box::new(Lru),
            EvictionPolicyKind::Mru => Box::new(Mru),
            EvictionPolicyKind::Fifo => Box::new(Fifo),
        }
    }
}

impl FromStr for EvictionPolicyKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicyKind::Lru),
            "mru" => Ok(EvictionPolicyKind::Mru),
            "fifo" => Ok(EvictionPolicyKind::Fifo),
            other => Err(CacheError::InvalidRequest(format!(
                "Unknown eviction policy: {}",
                other
            ))),
        }
    }
}
