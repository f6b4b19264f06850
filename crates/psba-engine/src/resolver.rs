//! Profile resolution
//!
//! Chooses the basic and addon profiles for an access request. The rules
//! run in ascending priority and each one may overwrite what earlier rules
//! decided:
//!
//! 1. baseline `standard` profile when the client has a plan
//! 2. plan override
//! 3. notification
//! 4. addon override
//! 5. blocking
//! 6. realm forced profile
//!
//! The proxy delegate may then add an upstream reject reason, and
//! [`ProfileResolver::finish`] settles any reject reason into either a
//! terminal Access-Reject or the configured reject profile.

use crate::config::HandlerConfig;
use crate::profile::STANDARD_PROFILE;
use crate::provision::{BlockingStatus, ClientRecord};
use chrono::{DateTime, Utc};
use tracing::debug;

pub const CLIENT_NOT_FOUND: &str = "client not found";
pub const BLOCKED_USER: &str = "blocked user";

/// Working state of the resolution for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub basic_profile: Option<String>,
    pub addon_profile: Option<String>,
    /// Effective plan, after any override
    pub plan_name: String,
    pub reject_reason: Option<String>,
}

impl Resolution {
    pub fn for_record(record: &ClientRecord) -> Self {
        Resolution {
            plan_name: record.plan_name.clone(),
            ..Default::default()
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.reject_reason.is_some()
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.reject_reason = Some(reason.into());
    }

    fn set_basic(&mut self, profile: &str) {
        self.basic_profile = Some(profile.to_string());
        self.addon_profile = None;
    }

    fn set_addon(&mut self, profile: &str) {
        self.addon_profile = Some(profile.to_string());
    }

    fn apply(&mut self, profile: &str, as_addon: bool) {
        if as_addon {
            self.set_addon(profile);
        } else {
            self.set_basic(profile);
        }
    }
}

/// Final decision after reject resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Terminal Access-Reject carrying this message
    Reject(String),
    /// Compose the reply from these profiles
    Compose(Resolution),
}

pub struct ProfileResolver<'a> {
    config: &'a HandlerConfig,
    now: DateTime<Utc>,
}

fn active(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expiry.is_some_and(|e| e > now)
}

impl<'a> ProfileResolver<'a> {
    pub fn new(config: &'a HandlerConfig, now: DateTime<Utc>) -> Self {
        ProfileResolver { config, now }
    }

    /// Run the priority chain; does nothing once a reject reason is set
    pub fn resolve(&self, record: &ClientRecord, resolution: &mut Resolution) {
        if resolution.is_rejected() {
            return;
        }
        let config = self.config;

        if record.has_plan() {
            resolution.basic_profile = Some(STANDARD_PROFILE.to_string());
        }

        if active(record.plan_override_expiry, self.now)
            && let Some(plan) = record.plan_override.as_deref().filter(|p| !p.is_empty())
        {
            debug!(plan = %plan, "Applying plan override");
            resolution.plan_name = plan.to_string();
        }

        if active(record.notification_expiry, self.now) {
            debug!(
                profile = %config.notification_profile,
                addon = config.notification_is_addon,
                "Applying notification profile"
            );
            resolution.apply(&config.notification_profile, config.notification_is_addon);
        }

        if active(record.addon_override_expiry, self.now)
            && let Some(addon) = record.addon_override.as_deref().filter(|a| !a.is_empty())
        {
            debug!(profile = %addon, "Applying addon override");
            resolution.set_addon(addon);
        }

        if record.blocking_status == BlockingStatus::Blocked {
            match &config.blocking_profile {
                Some(profile) => {
                    debug!(profile = %profile, addon = config.blocking_is_addon, "Applying blocking profile");
                    resolution.apply(profile, config.blocking_is_addon);
                }
                None => {
                    debug!("Blocked user without blocking profile");
                    resolution.reject(BLOCKED_USER);
                }
            }
        }

        if let Some(profile) = &config.realm_profile {
            debug!(profile = %profile, "Applying realm profile");
            resolution.set_basic(profile);
        }
    }

    /// Settle the reject reason, if any
    pub fn finish(&self, mut resolution: Resolution) -> Decision {
        let Some(reason) = resolution.reject_reason.clone() else {
            return Decision::Compose(resolution);
        };

        match &self.config.reject_profile {
            None => Decision::Reject(reason),
            Some(profile) => {
                // an addon needs a basic profile to ride on
                let as_addon = self.config.reject_is_addon && resolution.basic_profile.is_some();
                debug!(
                    reason = %reason,
                    profile = %profile,
                    addon = as_addon,
                    "Applying reject profile"
                );
                resolution.apply(profile, as_addon);
                Decision::Compose(resolution)
            }
        }
    }
}
