//! Policy engine
//!
//! [`PolicyEngine`] is built once at startup and shared by every request
//! handler. The configuration lives in a [`PolicySnapshot`] that is replaced
//! whole on reload; requests in flight keep the snapshot they started with.

use crate::accounting::{AccountingDispatcher, CdrBinding, FileCdrWriter};
use crate::auth::LocalAuthenticator;
use crate::checks::RadiusCheckers;
use crate::composer::{AttributeComposer, TemplateFiller};
use crate::config::{ConfigError, PolicyConfig};
use crate::context::RequestContext;
use crate::error::EngineError;
use crate::identity::IdentityResolver;
use crate::plan_cache::PlanParameterCache;
use crate::provision::{ClientRecord, Lookup, ProvisioningLookup, ProvisioningStore};
use crate::proxy::{ProxyDelegate, ProxyOutcome, RadiusRouter, RoutePolicy};
use crate::resolver::{CLIENT_NOT_FOUND, Decision, ProfileResolver, Resolution};
use arc_swap::ArcSwap;
use chrono::Utc;
use radius_model::{AttributeSet, Code, Packet};
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span};

pub const REPLY_MESSAGE: &str = "Reply-Message";

/// Validated configuration with its compiled collaborators
pub struct PolicySnapshot {
    pub config: PolicyConfig,
    pub checkers: RadiusCheckers,
    pub cdr_writers: Vec<CdrBinding>,
}

impl PolicySnapshot {
    /// Validate `config` and attach already-built CDR writers
    pub fn new(config: PolicyConfig, cdr_writers: Vec<CdrBinding>) -> Result<Self, ConfigError> {
        let checkers = config.validate()?;

        for (index, binding) in cdr_writers.iter().enumerate() {
            if !checkers.contains(&binding.checker) {
                return Err(ConfigError::MissingReference {
                    kind: "checker",
                    name: binding.checker.clone(),
                    referrer: format!("CDR writer #{}", index),
                });
            }
        }

        Ok(PolicySnapshot {
            config,
            checkers,
            cdr_writers,
        })
    }

    /// Validate `config` and build a file writer for each configured CDR writer
    pub fn build(config: PolicyConfig) -> Result<Self, ConfigError> {
        let writers = config
            .cdr_writers
            .iter()
            .map(|spec| CdrBinding {
                writer: Arc::new(FileCdrWriter::new(spec)),
                checker: spec.checker.clone(),
            })
            .collect();
        Self::new(config, writers)
    }
}

pub struct PolicyEngine {
    snapshot: ArcSwap<PolicySnapshot>,
    identity: IdentityResolver,
    templates: TemplateFiller,
    store: Arc<dyn ProvisioningStore>,
    router: Arc<dyn RadiusRouter>,
    plans: Arc<PlanParameterCache>,
}

impl PolicyEngine {
    pub fn new(
        snapshot: PolicySnapshot,
        store: Arc<dyn ProvisioningStore>,
        router: Arc<dyn RadiusRouter>,
        plans: Arc<PlanParameterCache>,
    ) -> Result<Self, EngineError> {
        Ok(PolicyEngine {
            snapshot: ArcSwap::from_pointee(snapshot),
            identity: IdentityResolver::new()?,
            templates: TemplateFiller::new()?,
            store,
            router,
            plans,
        })
    }

    /// Swap in a new configuration for subsequent requests
    pub fn reload(&self, snapshot: PolicySnapshot) {
        self.snapshot.store(Arc::new(snapshot));
        info!("Policy configuration reloaded");
    }

    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.snapshot.load_full()
    }

    pub fn plans(&self) -> &Arc<PlanParameterCache> {
        &self.plans
    }

    /// Decide the reply for one request
    ///
    /// An error means no reply must be sent.
    pub async fn handle(&self, request: Packet) -> Result<Packet, EngineError> {
        let span = info_span!("request", code = ?request.code, id = request.identifier);

        async move {
            let result = self.dispatch(request).await;
            match &result {
                Ok(reply) => debug!(code = ?reply.code, "Reply ready"),
                Err(e) => error!(error = %e, "Request failed; no reply"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, mut request: Packet) -> Result<Packet, EngineError> {
        if !matches!(request.code, Code::AccessRequest | Code::AccountingRequest) {
            return Err(EngineError::UnsupportedCode(request.code));
        }

        let snapshot = self.snapshot.load_full();
        let identity = self.identity.resolve(&mut request);
        let ctx = RequestContext::build(identity, &snapshot.config);

        if request.code == Code::AccountingRequest {
            let dispatcher = AccountingDispatcher::new(&snapshot, &self.router);
            return Ok(dispatcher.dispatch(request, &ctx).await);
        }
        self.access(&snapshot, &request, &ctx).await
    }

    async fn access(
        &self,
        snapshot: &PolicySnapshot,
        request: &Packet,
        ctx: &RequestContext,
    ) -> Result<Packet, EngineError> {
        let config = &snapshot.config;
        let identity = &ctx.identity;

        let lookup = ProvisioningLookup::new(self.store.as_ref(), &config.special_users)
            .find(
                &ctx.config.provision_type,
                &identity.access_id,
                identity.access_port,
                &identity.user_name,
            )
            .await?;

        let (record, mut resolution) = match lookup {
            Lookup::Found(record) => {
                let resolution = Resolution::for_record(&record);
                (record, resolution)
            }
            Lookup::Skipped => (ClientRecord::default(), Resolution::default()),
            Lookup::NotFound => {
                let record = ClientRecord {
                    user_name: Some(identity.user_name.clone()),
                    ..Default::default()
                };
                let mut resolution = Resolution::default();
                match &ctx.config.permissive_profile {
                    Some(profile) => {
                        debug!(profile = %profile, "Unknown client; applying permissive profile");
                        resolution.basic_profile = Some(profile.clone());
                    }
                    None => resolution.reject(CLIENT_NOT_FOUND),
                }
                (record, resolution)
            }
        };

        if let Some(reason) = LocalAuthenticator::new(&config.special_users).check(
            ctx.config.auth_local,
            request,
            &identity.user_name,
            &record,
        ) {
            resolution.reject(reason);
        }

        let resolver = ProfileResolver::new(&ctx.config, Utc::now());
        resolver.resolve(&record, &mut resolution);

        let mut proxy_attrs = AttributeSet::new();
        if let Some(group) = &ctx.config.proxy_group
            && !resolution.is_rejected()
        {
            let secret = config.proxy_groups.get(group).and_then(|g| g.secret.clone());
            let policy = RoutePolicy::new(
                ctx.config.proxy_timeout(),
                ctx.config.proxy_retries,
                ctx.config.proxy_server_retries,
            )
            .with_secret(secret);

            let outcome = ProxyDelegate::new(&self.router, &config.filters)
                .authenticate(
                    request,
                    group,
                    ctx.config.auth_proxy_filter_out.as_deref(),
                    ctx.config.auth_proxy_filter_in.as_deref(),
                    &policy,
                    ctx.config.accept_on_proxy_error,
                )
                .await?;
            match outcome {
                ProxyOutcome::Accepted(attrs) => proxy_attrs = attrs,
                ProxyOutcome::Rejected(reason) => resolution.reject(reason),
            }
        }

        match resolver.finish(resolution) {
            Decision::Reject(reason) => {
                info!(user = %identity.user_name, reason = %reason, "Access rejected");
                let mut reply = Packet::response_to(request, false);
                reply.add(REPLY_MESSAGE, reason);
                Ok(reply)
            }
            Decision::Compose(resolution) => {
                let parameters = self.plans.parameters(&resolution.plan_name);
                let attributes =
                    AttributeComposer::new(&config.profiles, &parameters, &self.templates)
                        .compose(ctx, &resolution, &record, &proxy_attrs)?;
                info!(
                    user = %identity.user_name,
                    plan = %resolution.plan_name,
                    basic = resolution.basic_profile.as_deref().unwrap_or("-"),
                    addon = resolution.addon_profile.as_deref().unwrap_or("-"),
                    "Access accepted"
                );
                let mut reply = Packet::response_to(request, true);
                reply.avps = attributes;
                Ok(reply)
            }
        }
    }
}
