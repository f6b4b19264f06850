//! Upstream RADIUS delegation
//!
//! - [`RadiusRouter`] - routing collaborator delivering packets to a server group
//! - [`RoutePolicy`] - per-call timeout, try budget and shared secret
//! - [`ProxyDelegate`] - filtered forwarding with fail-open/fail-closed handling

pub mod delegate;
pub mod error;
pub mod router;

pub use delegate::{ProxyDelegate, ProxyOutcome, UPSTREAM_REJECT_PREFIX};
pub use error::{ProxyError, ProxyResult, RouteError};
pub use router::{RadiusRouter, RoutePolicy};
