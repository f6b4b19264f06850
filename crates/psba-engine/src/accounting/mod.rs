//! Accounting classification and dispatch
//!
//! Every accounting request is classified as service or session accounting,
//! written to the CDR writers whose checker selects it, copied to the
//! matching copy targets, and optionally proxied inline. None of these
//! outcomes affect the reply: an Accounting-Response is always returned.

pub mod cdr;
pub mod file;

pub use cdr::{CdrError, CdrWriter};
pub use file::FileCdrWriter;

use crate::context::RequestContext;
use crate::engine::PolicySnapshot;
use crate::identity::{ClientType, PSA_SERVICE_NAME};
use crate::proxy::{ProxyDelegate, RadiusRouter, RoutePolicy};
use radius_model::Packet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub const HW_SERVICE_INFO: &str = "HW-Service-Info";
pub const ALC_SUB_SERV_ACTIVATE: &str = "Alc-Sub-Serv-Activate";
pub const REDBACK_SERVICE_NAME: &str = "Redback-Service-Name";
const CISCO_SERVICE_NAME_KEY: &str = "servicename";

/// A CDR writer and the checker selecting its packets
#[derive(Clone)]
pub struct CdrBinding {
    pub writer: Arc<dyn CdrWriter>,
    pub checker: String,
}

/// Service name carried by an accounting request, if any
///
/// Relay clients carry it in Class. Otherwise the vendor encodings are
/// tried in order and the first non-empty one wins.
pub fn service_name(request: &Packet, client_type: ClientType) -> Option<String> {
    let text = |name: &str| {
        request
            .get_avp(name)
            .map(|v| v.as_text_lossy())
            .filter(|s| !s.is_empty())
    };

    if client_type == ClientType::Relay {
        return text("Class");
    }

    // Huawei prefixes the service name with a one-character flag
    let huawei = text(HW_SERVICE_INFO)
        .filter(|s| s.chars().count() > 1)
        .map(|s| s.chars().skip(1).collect::<String>());

    huawei
        .or_else(|| text(ALC_SUB_SERV_ACTIVATE))
        .or_else(|| {
            request
                .get_cisco_avpair(CISCO_SERVICE_NAME_KEY)
                .filter(|s| !s.is_empty())
        })
        .or_else(|| text(REDBACK_SERVICE_NAME))
}

pub struct AccountingDispatcher<'a> {
    snapshot: &'a PolicySnapshot,
    router: &'a Arc<dyn RadiusRouter>,
}

impl<'a> AccountingDispatcher<'a> {
    pub fn new(snapshot: &'a PolicySnapshot, router: &'a Arc<dyn RadiusRouter>) -> Self {
        AccountingDispatcher { snapshot, router }
    }

    /// Process one accounting request and build its response
    ///
    /// Returns only after every copy sub-task has finished.
    pub async fn dispatch(&self, mut request: Packet, ctx: &RequestContext) -> Packet {
        let service = service_name(&request, ctx.identity.client_type);
        if let Some(name) = &service {
            request.add(PSA_SERVICE_NAME, name.as_str());
        }
        debug!(
            service = service.as_deref().unwrap_or("-"),
            kind = if service.is_some() { "service" } else { "session" },
            "Classified accounting request"
        );

        self.write_cdrs(&request).await;

        let mut copies = self.spawn_copies(&request);

        if let Some(group) = &ctx.config.proxy_group {
            let enabled = if service.is_some() {
                ctx.config.proxy_service_accounting
            } else {
                ctx.config.proxy_session_accounting
            };
            if enabled {
                self.proxy_inline(&request, group, ctx).await;
            }
        }

        while let Some(joined) = copies.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Accounting copy task failed");
            }
        }

        Packet::response_to(&request, true)
    }

    async fn write_cdrs(&self, request: &Packet) {
        for binding in &self.snapshot.cdr_writers {
            if !self.snapshot.checkers.matches(request, &binding.checker) {
                continue;
            }
            if let Err(e) = binding.writer.write(request).await {
                warn!(checker = %binding.checker, error = %e, "CDR write failed");
            }
        }
    }

    fn spawn_copies(&self, request: &Packet) -> JoinSet<()> {
        let config = &self.snapshot.config;
        let mut copies = JoinSet::new();

        for target in &config.copy_targets {
            if !self.snapshot.checkers.matches(request, &target.checker) {
                continue;
            }

            let packet = match config.filters.apply(request, target.filter.as_deref()) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!(target = %target.name, error = %e, "Accounting copy not sent");
                    continue;
                }
            };
            let secret = config
                .proxy_groups
                .get(&target.proxy_group)
                .and_then(|g| g.secret.clone());
            let policy = RoutePolicy::new(
                Duration::from_millis(target.timeout_millis),
                target.retries,
                target.server_retries,
            )
            .with_secret(secret);

            let router = Arc::clone(self.router);
            let name = target.name.clone();
            let group = target.proxy_group.clone();
            copies.spawn(async move {
                match router.route(packet, &group, &policy).await {
                    Ok(_) => debug!(target = %name, group = %group, "Accounting copy sent"),
                    Err(e) => warn!(target = %name, group = %group, error = %e, "Accounting copy failed"),
                }
            });
        }

        copies
    }

    async fn proxy_inline(&self, request: &Packet, group: &str, ctx: &RequestContext) {
        let config = &self.snapshot.config;
        let secret = config.proxy_groups.get(group).and_then(|g| g.secret.clone());
        let policy = RoutePolicy::new(
            ctx.config.proxy_timeout(),
            ctx.config.proxy_retries,
            ctx.config.proxy_server_retries,
        )
        .with_secret(secret);

        let delegate = ProxyDelegate::new(self.router, &config.filters);
        match delegate
            .forward(request, group, ctx.config.acct_proxy_filter_out.as_deref(), &policy)
            .await
        {
            Ok(reply) => debug!(group = %group, code = ?reply.code, "Accounting proxied"),
            Err(e) => warn!(group = %group, error = %e, "Accounting proxy failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radius_model::{CISCO_AVPAIR, Code};

    fn request(avps: &[(&str, &str)]) -> Packet {
        let mut packet = Packet::new(Code::AccountingRequest, 9, [0u8; 16]);
        for (name, value) in avps {
            packet.add(*name, *value);
        }
        packet
    }

    #[test]
    fn test_huawei_service_info_drops_flag() {
        let packet = request(&[(HW_SERVICE_INFO, "Ngold")]);
        assert_eq!(service_name(&packet, ClientType::Huawei), Some("gold".to_string()));

        let packet = request(&[(HW_SERVICE_INFO, "N")]);
        assert_eq!(service_name(&packet, ClientType::Huawei), None);
    }

    #[test]
    fn test_vendor_precedence() {
        let packet = request(&[
            (REDBACK_SERVICE_NAME, "redback"),
            (CISCO_AVPAIR, "servicename=cisco"),
            (ALC_SUB_SERV_ACTIVATE, "alu"),
        ]);
        assert_eq!(service_name(&packet, ClientType::Default), Some("alu".to_string()));

        let packet = request(&[(REDBACK_SERVICE_NAME, "redback"), (CISCO_AVPAIR, "servicename=cisco")]);
        assert_eq!(service_name(&packet, ClientType::Cisco), Some("cisco".to_string()));

        let packet = request(&[(REDBACK_SERVICE_NAME, "redback")]);
        assert_eq!(service_name(&packet, ClientType::Default), Some("redback".to_string()));
    }

    #[test]
    fn test_relay_reads_class() {
        let packet = request(&[("Class", "turbo"), (ALC_SUB_SERV_ACTIVATE, "alu")]);
        assert_eq!(service_name(&packet, ClientType::Relay), Some("turbo".to_string()));

        let packet = request(&[(ALC_SUB_SERV_ACTIVATE, "alu")]);
        assert_eq!(service_name(&packet, ClientType::Relay), None);
    }

    #[test]
    fn test_session_accounting_has_no_service() {
        let packet = request(&[("User-Name", "alice"), (CISCO_AVPAIR, "client-mac-address=x")]);
        assert_eq!(service_name(&packet, ClientType::Default), None);
    }
}
