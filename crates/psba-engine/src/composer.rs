//! Reply attribute composition
//!
//! Layers the attribute sources from lowest to highest priority:
//!
//! ```text
//! realm/global base -> basic profile -> addon profile -> proxy reply
//! ```
//!
//! Overridable items of each layer are merged with `override_with`, so a
//! later layer replaces same-named attributes of earlier ones. Non-overridable
//! items are collected separately with `add` and appended at the end, which
//! keeps them out of reach of every later override. The Class attribute and
//! the fixed address assignments of the client record come last.

use crate::context::RequestContext;
use crate::error::EngineError;
use crate::plan_cache::PlanParameter;
use crate::profile::{Profile, ProfileStore};
use crate::provision::ClientRecord;
use crate::resolver::Resolution;
use radius_model::{AttributeSet, Avp, AvpValue};
use regex::{Captures, Regex};
use std::net::IpAddr;
use tracing::debug;

pub const CLASS: &str = "Class";
pub const FRAMED_IP_ADDRESS: &str = "Framed-IP-Address";
pub const DELEGATED_IPV6_PREFIX: &str = "Delegated-IPv6-Prefix";
pub const FRAMED_IPV6_PREFIX: &str = "Framed-IPv6-Prefix";

const PLACEHOLDER_PATTERN: &str = r"\$\{([^}]*)\}";

/// Fills `${Name}` placeholders from plan parameters
pub struct TemplateFiller {
    placeholder: Regex,
}

impl TemplateFiller {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(TemplateFiller {
            placeholder: Regex::new(PLACEHOLDER_PATTERN)?,
        })
    }

    /// Replace `${Name}` with the parameter `Name`; unknown names stay
    pub fn fill(&self, template: &str, parameters: &[PlanParameter]) -> String {
        self.placeholder
            .replace_all(template, |caps: &Captures| {
                match parameters.iter().find(|p| p.name == caps[1]) {
                    Some(parameter) => parameter.value.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

pub struct AttributeComposer<'a> {
    profiles: &'a ProfileStore,
    parameters: &'a [PlanParameter],
    templates: &'a TemplateFiller,
}

impl<'a> AttributeComposer<'a> {
    /// `parameters` belong to the effective plan and fill `${Name}` templates
    pub fn new(
        profiles: &'a ProfileStore,
        parameters: &'a [PlanParameter],
        templates: &'a TemplateFiller,
    ) -> Self {
        AttributeComposer {
            profiles,
            parameters,
            templates,
        }
    }

    pub fn compose(
        &self,
        ctx: &RequestContext,
        resolution: &Resolution,
        record: &ClientRecord,
        proxy_attrs: &AttributeSet,
    ) -> Result<AttributeSet, EngineError> {
        let basic = self.profile(resolution.basic_profile.as_deref())?;
        let addon = self.profile(resolution.addon_profile.as_deref())?;

        let mut overridable = ctx.radius_attrs.clone();
        let mut non_overridable = ctx.non_overridable_attrs.clone();
        for profile in [basic, addon].into_iter().flatten() {
            overridable = overridable.override_with(&self.expand(&profile.reply_items));
            non_overridable = non_overridable.add(&self.expand(&profile.non_overridable_reply_items));
        }
        overridable = overridable.override_with(proxy_attrs);

        let mut reply = overridable.add(&non_overridable);
        reply.push(Avp::new(CLASS, class_value(resolution, record)));

        for (name, value) in [
            (FRAMED_IP_ADDRESS, &record.ipv4_address),
            (DELEGATED_IPV6_PREFIX, &record.ipv6_delegated_prefix),
            (FRAMED_IPV6_PREFIX, &record.ipv6_wan_prefix),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                reply.replace(Avp::new(name, fixed_value(value)));
            }
        }

        debug!(
            basic = resolution.basic_profile.as_deref().unwrap_or("-"),
            addon = resolution.addon_profile.as_deref().unwrap_or("-"),
            plan = %resolution.plan_name,
            attributes = %reply,
            "Composed reply attributes"
        );
        Ok(reply)
    }

    fn profile(&self, name: Option<&str>) -> Result<Option<&'a Profile>, EngineError> {
        match name {
            None => Ok(None),
            Some(name) => self
                .profiles
                .get(name)
                .map(Some)
                .ok_or_else(|| EngineError::ProfileNotFound(name.to_string())),
        }
    }

    fn expand(&self, items: &AttributeSet) -> AttributeSet {
        if self.parameters.is_empty() {
            return items.clone();
        }
        items.map_values(|value| match value {
            AvpValue::String(s) if s.contains("${") => {
                AvpValue::String(self.templates.fill(s, self.parameters))
            }
            other => other.clone(),
        })
    }
}

/// `P:<plan>#C:<external id>` plus `#A:<addon>` when an addon applies
pub fn class_value(resolution: &Resolution, record: &ClientRecord) -> String {
    let mut class = format!("P:{}#C:{}", resolution.plan_name, record.external_client_id);
    if let Some(addon) = &resolution.addon_profile {
        class.push_str("#A:");
        class.push_str(addon);
    }
    class
}

fn fixed_value(value: &str) -> AvpValue {
    match value.parse::<IpAddr>() {
        Ok(addr) => AvpValue::Address(addr),
        Err(_) => AvpValue::from(value),
    }
}
