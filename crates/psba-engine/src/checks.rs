//! Named packet checkers
//!
//! A checker is a list of conditions over a packet; it matches when all of
//! them hold. Checkers select which accounting packets are written to each
//! CDR writer and which are copied to each copy target. Names are resolved
//! when the policy is loaded, so request-time code never sees a missing one.

use crate::config::ConfigError;
use radius_model::Packet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// A single checker condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Attribute is present
    Present { attribute: String },
    /// Attribute is absent
    Absent { attribute: String },
    /// First occurrence renders exactly as `value`
    Equals { attribute: String, value: String },
    /// First occurrence matches the regular expression `pattern`
    Matches { attribute: String, pattern: String },
    /// Packet code equals `code`
    Code { code: u8 },
}

#[derive(Debug)]
enum CompiledCondition {
    Present(String),
    Absent(String),
    Equals(String, String),
    Matches(String, Regex),
    Code(u8),
}

impl CompiledCondition {
    fn compile(checker: &str, condition: &Condition) -> Result<Self, ConfigError> {
        Ok(match condition {
            Condition::Present { attribute } => CompiledCondition::Present(attribute.clone()),
            Condition::Absent { attribute } => CompiledCondition::Absent(attribute.clone()),
            Condition::Equals { attribute, value } => {
                CompiledCondition::Equals(attribute.clone(), value.clone())
            }
            Condition::Matches { attribute, pattern } => {
                let regex = Regex::new(pattern).map_err(|e| {
                    ConfigError::Invalid(format!(
                        "Checker '{}' has invalid pattern '{}': {}",
                        checker, pattern, e
                    ))
                })?;
                CompiledCondition::Matches(attribute.clone(), regex)
            }
            Condition::Code { code } => CompiledCondition::Code(*code),
        })
    }

    fn holds(&self, packet: &Packet) -> bool {
        match self {
            CompiledCondition::Present(name) => packet.get_avp(name).is_some(),
            CompiledCondition::Absent(name) => packet.get_avp(name).is_none(),
            CompiledCondition::Equals(name, value) => packet
                .get_avp(name)
                .map(|v| v.to_string() == *value)
                .unwrap_or(false),
            CompiledCondition::Matches(name, regex) => packet
                .get_avp(name)
                .map(|v| regex.is_match(&v.to_string()))
                .unwrap_or(false),
            CompiledCondition::Code(code) => packet.code.as_u8() == *code,
        }
    }
}

/// Compiled set of named checkers
#[derive(Debug, Default)]
pub struct RadiusCheckers {
    checkers: HashMap<String, Vec<CompiledCondition>>,
}

impl RadiusCheckers {
    /// Compile checkers from configuration
    pub fn build(config: &HashMap<String, Vec<Condition>>) -> Result<Self, ConfigError> {
        let mut checkers = HashMap::with_capacity(config.len());
        for (name, conditions) in config {
            let compiled = conditions
                .iter()
                .map(|c| CompiledCondition::compile(name, c))
                .collect::<Result<Vec<_>, _>>()?;
            checkers.insert(name.clone(), compiled);
        }
        Ok(RadiusCheckers { checkers })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checkers.contains_key(name)
    }

    /// Whether `packet` satisfies every condition of checker `name`
    ///
    /// An empty checker matches everything.
    pub fn matches(&self, packet: &Packet, name: &str) -> bool {
        match self.checkers.get(name) {
            Some(conditions) => conditions.iter().all(|c| c.holds(packet)),
            None => {
                warn!(checker = %name, "Checker not loaded; treating as no match");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radius_model::Code;

    fn checkers() -> RadiusCheckers {
        let config: HashMap<String, Vec<Condition>> = serde_json::from_str(
            r#"{
                "all": [],
                "service": [{"op": "present", "attribute": "PSA-ServiceName"}],
                "session": [{"op": "absent", "attribute": "PSA-ServiceName"}],
                "local-nas": [
                    {"op": "code", "code": 4},
                    {"op": "matches", "attribute": "NAS-IP-Address", "pattern": "^127\\."}
                ],
                "gold": [{"op": "equals", "attribute": "PSA-ServiceName", "value": "gold"}]
            }"#,
        )
        .unwrap();
        RadiusCheckers::build(&config).unwrap()
    }

    fn accounting(service: Option<&str>) -> Packet {
        let mut packet = Packet::new(Code::AccountingRequest, 1, [0u8; 16]);
        packet.add("NAS-IP-Address", "127.0.0.1");
        if let Some(service) = service {
            packet.add("PSA-ServiceName", service);
        }
        packet
    }

    #[test]
    fn test_presence_conditions() {
        let checkers = checkers();
        assert!(checkers.matches(&accounting(Some("gold")), "service"));
        assert!(!checkers.matches(&accounting(Some("gold")), "session"));
        assert!(checkers.matches(&accounting(None), "session"));
    }

    #[test]
    fn test_empty_checker_matches_everything() {
        assert!(checkers().matches(&accounting(None), "all"));
    }

    #[test]
    fn test_code_and_regex_conditions() {
        let checkers = checkers();
        assert!(checkers.matches(&accounting(None), "local-nas"));

        let mut access = accounting(None);
        access.code = Code::AccessRequest;
        assert!(!checkers.matches(&access, "local-nas"));
    }

    #[test]
    fn test_equals_condition() {
        let checkers = checkers();
        assert!(checkers.matches(&accounting(Some("gold")), "gold"));
        assert!(!checkers.matches(&accounting(Some("silver")), "gold"));
    }

    #[test]
    fn test_unknown_checker_does_not_match() {
        assert!(!checkers().matches(&accounting(None), "missing"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut config = HashMap::new();
        config.insert(
            "bad".to_string(),
            vec![Condition::Matches {
                attribute: "User-Name".to_string(),
                pattern: "[unclosed".to_string(),
            }],
        );
        assert!(RadiusCheckers::build(&config).is_err());
    }
}
