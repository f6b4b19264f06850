//! Proxy error types

use crate::filters::FilterError;
use thiserror::Error;

/// Routing collaborator errors
///
/// These are transport-level failures. An Access-Reject received from the
/// upstream server is a reply, not an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// No reply within the try budget
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Network or encoding failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Destination group not known to the router
    #[error("Unknown proxy group: {0}")]
    UnknownGroup(String),
}

/// Proxy delegation errors
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Route error: {0}")]
    Route(#[from] RouteError),
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;
