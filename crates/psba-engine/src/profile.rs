//! Service profiles
//!
//! A profile is a named bundle of reply attributes. Overridable items are
//! merged with [`AttributeSet::override_with`] and can be replaced by later
//! layers; non-overridable items are appended and always reach the reply.

use radius_model::AttributeSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Basic profile assigned to every client that has a plan
pub const STANDARD_PROFILE: &str = "standard";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub reply_items: AttributeSet,
    #[serde(default)]
    pub non_overridable_reply_items: AttributeSet,
}

/// Named profiles, keyed by profile name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileStore {
    profiles: HashMap<String, Profile>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, profile: Profile) {
        self.profiles.insert(name.into(), profile);
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl FromIterator<(String, Profile)> for ProfileStore {
    fn from_iter<I: IntoIterator<Item = (String, Profile)>>(iter: I) -> Self {
        ProfileStore {
            profiles: iter.into_iter().collect(),
        }
    }
}
