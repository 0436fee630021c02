//! API Routes
//!
//! Configures the Axum router with the region admin endpoints.

use axum::{
    routing::{delete, get, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_region_handler, delete_item_handler, get_item_handler, group_keys_handler,
    health_handler, list_regions_handler, put_item_handler, region_keys_handler, AppState,
};

/// Creates the admin router.
///
/// # Endpoints
/// - `GET /health` - Health check
/// - `GET /regions` - Statistics per region
/// - `DELETE /regions/:region` - Remove every element of a region
/// - `GET /regions/:region/keys` - Keys in eviction order
/// - `PUT /regions/:region/items` - Store an element
/// - `GET /regions/:region/items/:key` - Read an element without touching it
/// - `DELETE /regions/:region/items/:key` - Remove an element
/// - `GET /regions/:region/groups/:group` - Attribute names of a group
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/regions", get(list_regions_handler))
        .route("/regions/:region", delete(clear_region_handler))
        .route("/regions/:region/keys", get(region_keys_handler))
        .route("/regions/:region/items", put(put_item_handler))
        .route(
            "/regions/:region/items/:key",
            get(get_item_handler).delete(delete_item_handler),
        )
        .route("/regions/:region/groups/:group", get(group_keys_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
