use crate::filters::FilterError;
use crate::provision::ProvisionError;
use crate::proxy::{ProxyError, RouteError};
use radius_model::Code;
use thiserror::Error;

/// Request-level failures
///
/// Any of these means no reply is produced for the request.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Proxy error: {0}")]
    ProxyFailed(RouteError),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Unsupported packet code: {0:?}")]
    UnsupportedCode(Code),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl From<ProxyError> for EngineError {
    fn from(e: ProxyError) -> Self {
        match e {
            ProxyError::Filter(e) => EngineError::Filter(e),
            ProxyError::Route(e) => EngineError::ProxyFailed(e),
        }
    }
}
