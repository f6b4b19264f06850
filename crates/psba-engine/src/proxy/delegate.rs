//! Access request delegation
//!
//! Forwards a filtered copy of the request to an upstream group and turns
//! the outcome into either a set of reply attributes or a reject reason.

use super::{ProxyError, ProxyResult, RadiusRouter, RoutePolicy};
use crate::filters::RadiusFilters;
use radius_model::{AttributeSet, Code, Packet};
use std::sync::Arc;
use tracing::{debug, warn};

pub const UPSTREAM_REJECT_PREFIX: &str = "rejected by upstream radius: ";

/// Result of delegating an access request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyOutcome {
    /// Upstream accepted; inbound-filtered reply attributes
    Accepted(AttributeSet),
    /// Upstream rejected; reject reason carrying its Reply-Message
    Rejected(String),
}

pub struct ProxyDelegate<'a> {
    router: &'a Arc<dyn RadiusRouter>,
    filters: &'a RadiusFilters,
}

impl<'a> ProxyDelegate<'a> {
    pub fn new(router: &'a Arc<dyn RadiusRouter>, filters: &'a RadiusFilters) -> Self {
        ProxyDelegate { router, filters }
    }

    /// Apply `filter` and route the copy to `group`
    pub async fn forward(
        &self,
        request: &Packet,
        group: &str,
        filter: Option<&str>,
        policy: &RoutePolicy,
    ) -> ProxyResult<Packet> {
        let outbound = self.filters.apply(request, filter)?;
        debug!(group = %group, "Sending proxy request");
        Ok(self.router.route(outbound, group, policy).await?)
    }

    /// Delegate an access request
    ///
    /// With `accept_on_error` a transport failure is logged and replaced by
    /// an empty accept; otherwise it is returned to the caller.
    pub async fn authenticate(
        &self,
        request: &Packet,
        group: &str,
        filter_out: Option<&str>,
        filter_in: Option<&str>,
        policy: &RoutePolicy,
        accept_on_error: bool,
    ) -> ProxyResult<ProxyOutcome> {
        let reply = match self.forward(request, group, filter_out, policy).await {
            Ok(reply) => reply,
            Err(ProxyError::Route(e)) if accept_on_error => {
                warn!(group = %group, error = %e, "Ignoring proxy error");
                Packet::response_to(request, true)
            }
            Err(e) => return Err(e),
        };

        if reply.code == Code::AccessReject {
            let message = reply.get_string_avp("Reply-Message");
            debug!(group = %group, message = %message, "Upstream reject");
            return Ok(ProxyOutcome::Rejected(format!(
                "{}{}",
                UPSTREAM_REJECT_PREFIX, message
            )));
        }

        let filtered = self.filters.apply(&reply, filter_in)?;
        debug!(group = %group, attributes = %filtered.avps, "Filtered proxy reply");
        Ok(ProxyOutcome::Accepted(filtered.avps))
    }
}
