//! Cache Element Module
//!
//! Defines the stored element and the attributes the shrinker compares
//! against wall-clock bounds.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;

// == Element Attributes ==
/// Timing and sizing metadata carried by every element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementAttributes {
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last time the element was read through a touching path
    pub last_access: DateTime<Utc>,
    /// Maximum time between accesses, None = unbounded
    pub max_idle: Option<Duration>,
    /// Maximum age, None = unbounded
    pub max_life: Option<Duration>,
    /// Eternal elements ignore both bounds
    pub is_eternal: bool,
    /// Size hint in bytes
    pub size: usize,
}

impl ElementAttributes {
    /// Attributes for an element created now with no bounds.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_access: now,
            max_idle: None,
            max_life: None,
            is_eternal: false,
            size: 0,
        }
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    pub fn with_max_life(mut self, max_life: Duration) -> Self {
        self.max_life = Some(max_life);
        self
    }

    pub fn eternal(mut self) -> Self {
        self.is_eternal = true;
        self
    }

    // == Touch ==
    /// Marks the element as accessed now.
    pub fn touch(&mut self) {
        self.last_access = Utc::now();
    }

    /// Time since the last access, zero if the clock went backwards.
    pub fn idle_time(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_access).to_std().unwrap_or(Duration::ZERO)
    }

    /// Time since creation, zero if the clock went backwards.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    // == Is Expired ==
    /// Checks the element's own bounds at `now`.
    ///
    /// An element is expired once its age exceeds `max_life` or its idle time
    /// exceeds `max_idle`. Eternal elements never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.is_eternal {
            return false;
        }
        let too_old = self.max_life.is_some_and(|max| self.age(now) > max);
        let too_idle = self.max_idle.is_some_and(|max| self.idle_time(now) > max);
        too_old || too_idle
    }
}

impl Default for ElementAttributes {
    fn default() -> Self {
        Self::new()
    }
}

// == Cache Element ==
/// A value stored in one region under one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheElement {
    /// Owning region
    pub region: String,
    pub key: CacheKey,
    pub value: String,
    pub attributes: ElementAttributes,
}

impl CacheElement {
    // == Constructor ==
    /// Creates an element with fresh, unbounded attributes.
    pub fn new(
        region: impl Into<String>,
        key: impl Into<CacheKey>,
        value: impl Into<String>,
    ) -> Self {
        let value = value.into();
        let attributes = ElementAttributes {
            size: value.len(),
            ..ElementAttributes::new()
        };
        Self {
            region: region.into(),
            key: key.into(),
            value,
            attributes,
        }
    }

    pub fn with_attributes(mut self, attributes: ElementAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.attributes.is_expired(now)
    }
}
