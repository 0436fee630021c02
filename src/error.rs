//! Error types for the region cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the region cache.
///
/// Lookup misses are not errors; `NotFound` is only produced by the admin
/// surface when it has to turn an absent element into a 404.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key or region not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Failure on the secondary-store (spill) path
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation attempted on a disposed region
    #[error("Region disposed: {0}")]
    Disposed(String),

    /// The shared scheduler could not accept work
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Group channel or dispatcher failure
    #[error("Lateral error: {0}")]
    Lateral(String),

    /// Wire frame could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Disposed(_) | CacheError::Lateral(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Io(_)
            | CacheError::Scheduler(_)
            | CacheError::Serialization(_)
            | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the region cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: CacheError = io.into();
        assert!(matches!(err, CacheError::Io(_)));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_status_mapping() {
        let resp = CacheError::NotFound("k".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = CacheError::Disposed("r".into()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = CacheError::InvalidRequest("bad".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
