//! API Module
//!
//! HTTP handlers and routing for the region admin API.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /regions` - Per-region statistics
//! - `GET|PUT|DELETE /regions/:region/...` - Inspect and mutate one region

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
