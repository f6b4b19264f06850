use super::RouteError;
use async_trait::async_trait;
use radius_model::Packet;
use std::time::Duration;

/// Delivery parameters for one routed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Overall tries across the group
    pub tries: u32,
    /// Tries per server before failing over
    pub server_tries: u32,
    /// Shared secret override; `None` uses the router's own
    pub secret: Option<String>,
}

impl RoutePolicy {
    /// Build from configured retry counts; tries are `1 + retries`
    pub fn new(timeout: Duration, retries: u32, server_retries: u32) -> Self {
        RoutePolicy {
            timeout,
            tries: retries.saturating_add(1),
            server_tries: server_retries.saturating_add(1),
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: Option<String>) -> Self {
        self.secret = secret;
        self
    }
}

/// Routing collaborator
///
/// Retries and server selection happen inside the router; callers see a
/// single reply or a single error.
#[async_trait]
pub trait RadiusRouter: Send + Sync {
    async fn route(
        &self,
        packet: Packet,
        group: &str,
        policy: &RoutePolicy,
    ) -> Result<Packet, RouteError>;
}
