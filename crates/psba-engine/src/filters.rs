//! Named attribute filters
//!
//! Filters sanitize packets before they leave for an upstream server and
//! replies before their attributes are merged into ours.

use radius_model::{AttributeSet, Packet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Unknown filter: {0}")]
    Unknown(String),
}

/// Filter definition
///
/// Applied in order: `allow` (when non-empty, keep only these names),
/// `remove`, then `force` (replace or append fixed attributes).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvpFilter {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
    #[serde(default)]
    pub force: AttributeSet,
}

impl AvpFilter {
    fn apply(&self, packet: &Packet) -> Packet {
        let kept: AttributeSet = packet
            .avps
            .iter()
            .filter(|a| self.allow.is_empty() || self.allow.contains(&a.name))
            .filter(|a| !self.remove.contains(&a.name))
            .cloned()
            .collect();

        let mut filtered = packet.clone();
        filtered.avps = kept.override_with(&self.force);
        filtered
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RadiusFilters {
    filters: HashMap<String, AvpFilter>,
}

impl RadiusFilters {
    pub fn new(filters: HashMap<String, AvpFilter>) -> Self {
        RadiusFilters { filters }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Return a filtered copy of `packet`
    ///
    /// No filter name means pass-through.
    pub fn apply(&self, packet: &Packet, name: Option<&str>) -> Result<Packet, FilterError> {
        match name {
            None => Ok(packet.clone()),
            Some(name) => self
                .filters
                .get(name)
                .map(|f| f.apply(packet))
                .ok_or_else(|| FilterError::Unknown(name.to_string())),
        }
    }
}
