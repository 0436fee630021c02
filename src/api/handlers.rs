//! API Handlers
//!
//! HTTP request handlers for the region admin endpoints. Reads go through
//! the quiet path so inspecting a region never changes its eviction order.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::{CacheKey, CacheManager, MemoryStore};
use crate::error::{CacheError, Result};
use crate::models::{
    GroupKeysResponse, HealthResponse, ItemResponse, KeysResponse, MessageResponse,
    PutItemRequest, RegionsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Region hub; also owns the scheduler and lateral dispatcher
    pub manager: Arc<CacheManager>,
}

impl AppState {
    pub fn new(manager: Arc<CacheManager>) -> Self {
        Self { manager }
    }

    /// Creates a manager from configuration and initializes every configured region.
    pub async fn from_config(config: &crate::config::Config) -> Result<Self> {
        let manager = Arc::new(CacheManager::new(config.region_defaults.clone()));
        for name in &config.regions {
            manager.add_region(config.region(name)).await?;
        }
        Ok(Self::new(manager))
    }

    async fn existing_region(&self, region: &str) -> Result<Arc<MemoryStore>> {
        self.manager
            .get_region(region)
            .await
            .ok_or_else(|| CacheError::NotFound(format!("region '{}'", region)))
    }
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let lateral = state.manager.dispatcher().await.is_some();
    Json(HealthResponse::healthy(lateral))
}

/// Handler for GET /regions
///
/// Returns statistics for every region, sorted by name.
pub async fn list_regions_handler(State(state): State<AppState>) -> Json<RegionsResponse> {
    let mut regions = Vec::new();
    for name in state.manager.region_names().await {
        if let Some(store) = state.manager.get_region(&name).await {
            regions.push(store.statistics().await);
        }
    }
    Json(RegionsResponse { regions })
}

/// Handler for GET /regions/:region/keys
pub async fn region_keys_handler(
    State(state): State<AppState>,
    Path(region): Path<String>,
) -> Result<Json<KeysResponse>> {
    let store = state.existing_region(&region).await?;
    let keys = store
        .key_array()
        .await?
        .iter()
        .map(ToString::to_string)
        .collect();
    Ok(Json(KeysResponse { region, keys }))
}

/// Handler for GET /regions/:region/items/:key
pub async fn get_item_handler(
    State(state): State<AppState>,
    Path((region, key)): Path<(String, String)>,
) -> Result<Json<ItemResponse>> {
    let store = state.existing_region(&region).await?;
    let element = store
        .get_quiet(&CacheKey::plain(key.clone()))
        .await?
        .ok_or_else(|| CacheError::NotFound(format!("key '{}'", key)))?;
    Ok(Json(element.into()))
}

/// Handler for PUT /regions/:region/items
///
/// Creates the region from the defaults when it does not exist yet.
pub async fn put_item_handler(
    State(state): State<AppState>,
    Path(region): Path<String>,
    Json(req): Json<PutItemRequest>,
) -> Result<Json<MessageResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let key = req.key.clone();
    state.manager.put(req.into_element(&region)).await?;
    Ok(Json(MessageResponse::new(format!(
        "Key '{}' stored in region '{}'",
        key, region
    ))))
}

/// Handler for DELETE /regions/:region/items/:key
pub async fn delete_item_handler(
    State(state): State<AppState>,
    Path((region, key)): Path<(String, String)>,
) -> Result<Json<MessageResponse>> {
    let removed = state
        .manager
        .remove(&region, &CacheKey::plain(key.clone()))
        .await?;
    if !removed {
        return Err(CacheError::NotFound(format!("key '{}'", key)));
    }
    Ok(Json(MessageResponse::new(format!("Key '{}' deleted", key))))
}

/// Handler for DELETE /regions/:region
///
/// Clears the region; the region itself stays registered.
pub async fn clear_region_handler(
    State(state): State<AppState>,
    Path(region): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.manager.remove_all(&region).await?;
    Ok(Json(MessageResponse::new(format!(
        "Region '{}' cleared",
        region
    ))))
}

/// Handler for GET /regions/:region/groups/:group
pub async fn group_keys_handler(
    State(state): State<AppState>,
    Path((region, group)): Path<(String, String)>,
) -> Result<Json<GroupKeysResponse>> {
    let store = state.existing_region(&region).await?;
    let mut attr_names: Vec<String> = store.group_keys(&group).await?.into_iter().collect();
    attr_names.sort();
    Ok(Json(GroupKeysResponse {
        region,
        group,
        attr_names,
    }))
}
