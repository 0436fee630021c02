//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheElement, ElementAttributes, StoreStatistics};

/// Response body for GET /regions
#[derive(Debug, Clone, Serialize)]
pub struct RegionsResponse {
    pub regions: Vec<StoreStatistics>,
}

/// Response body for GET /regions/:region/keys
#[derive(Debug, Clone, Serialize)]
pub struct KeysResponse {
    pub region: String,
    /// Keys in eviction order, least recent first
    pub keys: Vec<String>,
}

/// Response body for GET /regions/:region/items/:key
#[derive(Debug, Clone, Serialize)]
pub struct ItemResponse {
    pub region: String,
    pub key: String,
    pub value: String,
    pub attributes: ElementAttributes,
}

impl From<CacheElement> for ItemResponse {
    fn from(element: CacheElement) -> Self {
        Self {
            region: element.region,
            key: element.key.to_string(),
            value: element.value,
            attributes: element.attributes,
        }
    }
}

/// Response body for GET /regions/:region/groups/:group
#[derive(Debug, Clone, Serialize)]
pub struct GroupKeysResponse {
    pub region: String,
    pub group: String,
    /// Sorted attribute names
    pub attr_names: Vec<String>,
}

/// Response body for mutating operations
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Whether a lateral dispatcher is attached
    pub lateral: bool,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(lateral: bool) -> Self {
        Self {
            status: "healthy".to_string(),
            lateral,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_response_from_element() {
        let resp = ItemResponse::from(CacheElement::new("r", "my_key", "my_value"));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("my_key"));
        assert!(json.contains("my_value"));
        assert!(json.contains("created_at"));
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy(false);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("\"lateral\":false"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Something went wrong"));
    }
}
