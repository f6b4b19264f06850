//! Broadband Subscriber Policy Engine
//!
//! This crate decides the reply for subscriber RADIUS requests on top of the
//! `radius-model` packet model. Transport, wire encoding and the relational
//! store live outside; the engine talks to them through the
//! [`ProvisioningStore`], [`RadiusRouter`], [`CdrWriter`] and
//! [`PlanParameterSource`] traits.
//!
//! # Features
//!
//! - Access line identity from vendor attributes and pseudowire port ids
//! - Provisioning lookup with database, file and no-op backends
//! - Profile selection with plan/addon overrides, notification, blocking and realm rules
//! - Optional upstream proxying with fail-open or fail-closed policy
//! - Layered reply composition with non-overridable attributes
//! - Accounting classification, CDR writing and concurrent copy fan-out
//!
//! # Example
//!
//! ```rust,no_run
//! use psba_engine::{
//!     MemoryProvisioningStore, PlanParameterCache, PolicyConfig, PolicyEngine, PolicySnapshot,
//!     RadiusRouter, RouteError, RoutePolicy, StaticPlanParameters,
//! };
//! use radius_model::{Code, Packet};
//! use std::sync::Arc;
//!
//! struct Offline;
//!
//! #[async_trait::async_trait]
//! impl RadiusRouter for Offline {
//!     async fn route(&self, _: Packet, _: &str, _: &RoutePolicy) -> Result<Packet, RouteError> {
//!         Err(RouteError::Transport("offline".to_string()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PolicyConfig::from_file("psba.json")?;
//!     let plans = PlanParameterCache::new(Arc::new(StaticPlanParameters::default())).await;
//!     let engine = PolicyEngine::new(
//!         PolicySnapshot::build(config)?,
//!         Arc::new(MemoryProvisioningStore::new()),
//!         Arc::new(Offline),
//!         plans,
//!     )?;
//!
//!     let mut request = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
//!     request.add("User-Name", "alice@isp.example");
//!     let reply = engine.handle(request).await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```

pub mod accounting;
pub mod auth;
pub mod checks;
pub mod composer;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod filters;
pub mod identity;
pub mod plan_cache;
pub mod profile;
pub mod provision;
pub mod proxy;
pub mod resolver;

pub use accounting::{AccountingDispatcher, CdrBinding, CdrError, CdrWriter, FileCdrWriter};
pub use checks::{Condition, RadiusCheckers};
pub use config::{ConfigError, HandlerConfig, PolicyConfig, Properties};
pub use context::RequestContext;
pub use engine::{PolicyEngine, PolicySnapshot};
pub use error::EngineError;
pub use filters::{AvpFilter, FilterError, RadiusFilters};
pub use identity::{AccessIdentity, ClientType, IdentityResolver};
pub use plan_cache::{
    PlanCacheError, PlanParameter, PlanParameterCache, PlanParameterSource, PlanParameters,
    StaticPlanParameters,
};
pub use profile::{Profile, ProfileStore};
pub use provision::{
    ClientRecord, MemoryProvisioningStore, ProvisionError, ProvisioningStore, SpecialUser,
    SpecialUsers,
};
pub use proxy::{ProxyDelegate, ProxyError, ProxyOutcome, RadiusRouter, RouteError, RoutePolicy};
pub use resolver::{Decision, ProfileResolver, Resolution};
