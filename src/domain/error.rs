//! Error taxonomy with HTTP status mapping
//!
//! Errors in best-effort side effects (broadcast, notification, contact
//! lookup) never surface here; they are logged at the call site and the
//! operation still succeeds. Only primary-path failures become EngineError.

use hyper::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Auth,

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limit exceeded, wait before sending another alert")]
    RateLimited,

    #[error("storage error: {0}")]
    Store(#[from] crate::io::store::StoreError),
}

impl EngineError {
    pub fn status(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Auth => StatusCode::UNAUTHORIZED,
            EngineError::Forbidden => StatusCode::FORBIDDEN,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(EngineError::Validation("lat".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(EngineError::Auth.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(EngineError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(EngineError::NotFound("alert".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(EngineError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
