use crate::config::{HandlerConfig, PolicyConfig, Properties, RealmEntry};
use crate::identity::{AccessIdentity, ClientType};
use radius_model::AttributeSet;
use std::net::IpAddr;
use tracing::debug;

/// Per-request merged configuration
///
/// Built once from the identity and the active policy; immutable afterwards.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub identity: AccessIdentity,
    /// Merged properties, realm > client line > global
    pub properties: Properties,
    pub config: HandlerConfig,
    /// Global reply attributes overridden by the realm's
    pub radius_attrs: AttributeSet,
    /// Realm then global non-overridable attributes
    pub non_overridable_attrs: AttributeSet,
}

impl RequestContext {
    pub fn build(mut identity: AccessIdentity, policy: &PolicyConfig) -> RequestContext {
        let empty_realm = RealmEntry::default();
        let realm = policy.realm(&identity.realm).unwrap_or(&empty_realm);

        let client_line = identity
            .nas_ip_address
            .parse::<IpAddr>()
            .ok()
            .and_then(|ip| policy.find_client(ip));
        let empty_properties = Properties::new();
        let client_properties = client_line.map(|c| &c.properties).unwrap_or(&empty_properties);

        let properties = policy
            .properties
            .override_with(&client_properties.override_with(&realm.properties));
        let config = HandlerConfig::from_properties(&properties);

        if let Some(tag) = &config.radius_client_type {
            identity.client_type = ClientType::from_tag(tag);
        }

        let radius_attrs = policy.radius_attrs.override_with(&realm.reply_items);
        let non_overridable_attrs = realm
            .non_overridable_reply_items
            .add(&policy.non_overridable_radius_attrs);

        debug!(
            realm = %identity.realm,
            client_line = client_line.and_then(|c| c.name.as_deref()).unwrap_or("-"),
            client_type = %identity.client_type,
            config = %properties,
            "Merged request configuration"
        );

        RequestContext {
            identity,
            properties,
            config,
            radius_attrs,
            non_overridable_attrs,
        }
    }
}
