//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::time::Duration;

use serde::Deserialize;

use crate::cache::{CacheElement, ElementAttributes};

/// Maximum accepted key length in bytes.
pub const MAX_KEY_LENGTH: usize = 256;

/// Request body for storing an element (PUT /regions/:region/items)
///
/// # Fields
/// - `key`: Plain key to store the value under
/// - `value`: The value to store
/// - `max_idle_secs`: Optional idle bound in seconds
/// - `max_life_secs`: Optional lifetime bound in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct PutItemRequest {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub max_idle_secs: Option<u64>,
    #[serde(default)]
    pub max_life_secs: Option<u64>,
}

impl PutItemRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        None
    }

    /// Builds the element stored in `region`.
    pub fn into_element(self, region: &str) -> CacheElement {
        let mut attributes = ElementAttributes {
            size: self.value.len(),
            ..ElementAttributes::new()
        };
        attributes.max_idle = self.max_idle_secs.map(Duration::from_secs);
        attributes.max_life = self.max_life_secs.map(Duration::from_secs);
        CacheElement::new(region, self.key, self.value).with_attributes(attributes)
    }
}
