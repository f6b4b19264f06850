use crate::checks::{Condition, RadiusCheckers};
use crate::filters::{AvpFilter, RadiusFilters};
use crate::profile::{Profile, ProfileStore, STANDARD_PROFILE};
use crate::provision::{SpecialUser, SpecialUsers};
use ipnetwork::IpNetwork;
use radius_model::{AttributeSet, Avp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("{kind} '{name}' referenced by {referrer} is not defined")]
    MissingReference {
        kind: &'static str,
        name: String,
        referrer: String,
    },
}

/// String-keyed configuration properties
///
/// Used at three levels (global, client line, realm) and merged per request
/// with [`Properties::override_with`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, Value>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value; empty strings count as unset
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Merge `other` over these properties; keys of `other` win
    pub fn override_with(&self, other: &Properties) -> Properties {
        let mut merged = self.0.clone();
        merged.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Properties(merged)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", rendered.join(", "))
    }
}

/// Local credential check mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Check against the provisioned record
    Provision,
    /// Check against the special users registry
    File,
    /// No local check
    None,
}

impl AuthMode {
    pub fn parse(value: &str) -> Option<AuthMode> {
        match value {
            "provision" => Some(AuthMode::Provision),
            "file" => Some(AuthMode::File),
            "none" => Some(AuthMode::None),
            _ => None,
        }
    }
}

fn default_provision_type() -> String {
    "database".to_string()
}

fn default_notification_profile() -> String {
    "notification".to_string()
}

fn default_proxy_timeout_millis() -> u64 {
    5000
}

/// Typed view of the merged per-request properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    pub provision_type: String,
    pub auth_local: AuthMode,
    pub permissive_profile: Option<String>,
    pub notification_profile: String,
    pub notification_is_addon: bool,
    pub blocking_profile: Option<String>,
    pub blocking_is_addon: bool,
    pub realm_profile: Option<String>,
    pub reject_profile: Option<String>,
    pub reject_is_addon: bool,
    /// Upstream group; `None` when unset or explicitly "none"
    pub proxy_group: Option<String>,
    pub proxy_timeout_millis: u64,
    pub proxy_retries: u32,
    pub proxy_server_retries: u32,
    pub accept_on_proxy_error: bool,
    pub auth_proxy_filter_out: Option<String>,
    pub auth_proxy_filter_in: Option<String>,
    pub acct_proxy_filter_out: Option<String>,
    pub proxy_session_accounting: bool,
    pub proxy_service_accounting: bool,
    /// Forced client type tag; `None` means detect from the request
    pub radius_client_type: Option<String>,
}

impl HandlerConfig {
    pub fn from_properties(props: &Properties) -> HandlerConfig {
        let owned = |key: &str| props.get_str(key).map(str::to_string);
        let flag = |key: &str| props.get_bool(key).unwrap_or(false);
        let count = |key: &str| {
            props
                .get_u64(key)
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                .unwrap_or(0)
        };

        HandlerConfig {
            provision_type: owned("provision_type").unwrap_or_else(default_provision_type),
            auth_local: props
                .get_str("auth_local")
                .and_then(AuthMode::parse)
                .unwrap_or(AuthMode::Provision),
            permissive_profile: owned("permissive_profile"),
            notification_profile: owned("notification_profile")
                .unwrap_or_else(default_notification_profile),
            notification_is_addon: flag("notification_is_addon"),
            blocking_profile: owned("blocking_profile"),
            blocking_is_addon: flag("blocking_is_addon"),
            realm_profile: owned("realm_profile"),
            reject_profile: owned("reject_profile"),
            reject_is_addon: flag("reject_is_addon"),
            proxy_group: owned("proxy_group").filter(|g| g != "none"),
            proxy_timeout_millis: props
                .get_u64("proxy_timeout_millis")
                .unwrap_or_else(default_proxy_timeout_millis),
            proxy_retries: count("proxy_retries"),
            proxy_server_retries: count("proxy_server_retries"),
            accept_on_proxy_error: flag("accept_on_proxy_error"),
            auth_proxy_filter_out: owned("auth_proxy_filter_out"),
            auth_proxy_filter_in: owned("auth_proxy_filter_in"),
            acct_proxy_filter_out: owned("acct_proxy_filter_out"),
            proxy_session_accounting: flag("proxy_session_accounting"),
            proxy_service_accounting: flag("proxy_service_accounting"),
            radius_client_type: owned("radius_client_type"),
        }
    }

    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_millis(self.proxy_timeout_millis)
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        HandlerConfig::from_properties(&Properties::new())
    }
}

/// Client line configuration, matched against NAS-IP-Address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiusClient {
    /// NAS IP address or network (supports CIDR notation)
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub properties: Properties,
}

fn default_enabled() -> bool {
    true
}

impl RadiusClient {
    /// Parse the client address as an IP network
    pub fn parse_network(&self) -> Result<IpNetwork, ConfigError> {
        if let Ok(network) = self.address.parse::<IpNetwork>() {
            return Ok(network);
        }
        if let Ok(ip) = self.address.parse::<IpAddr>() {
            return Ok(IpNetwork::from(ip));
        }
        Err(ConfigError::Invalid(format!(
            "Invalid client address: {}",
            self.address
        )))
    }

    pub fn matches(&self, nas_ip: IpAddr) -> Result<bool, ConfigError> {
        Ok(self.parse_network()?.contains(nas_ip))
    }
}

/// Per-realm overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealmEntry {
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub reply_items: AttributeSet,
    #[serde(default)]
    pub non_overridable_reply_items: AttributeSet,
}

/// Upstream server group known to the router
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyGroup {
    #[serde(default)]
    pub servers: Vec<String>,
    /// Shared secret override for the whole group
    #[serde(default)]
    pub secret: Option<String>,
}

/// Destination receiving asynchronous copies of accounting packets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyTarget {
    pub name: String,
    pub proxy_group: String,
    pub checker: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default = "default_proxy_timeout_millis")]
    pub timeout_millis: u64,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub server_retries: u32,
}

/// CDR output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CdrFormat {
    Json,
    Csv,
}

fn default_rotate_seconds() -> u64 {
    3600
}

fn default_file_prefix() -> String {
    "cdr".to_string()
}

/// CDR writer declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdrWriterSpec {
    /// Directory receiving the CDR files
    pub path: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    pub format: CdrFormat,
    /// Attributes to write; empty means all
    #[serde(default)]
    pub attributes: Vec<String>,
    pub checker: String,
    #[serde(default = "default_rotate_seconds")]
    pub rotate_seconds: u64,
}

fn default_plan_refresh_seconds() -> u64 {
    60
}

/// Policy engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    /// Plan parameter refresh period in seconds (default: 60)
    #[serde(default = "default_plan_refresh_seconds")]
    pub plan_refresh_seconds: u64,

    /// Global handler properties
    #[serde(default)]
    pub properties: Properties,

    /// Global reply attributes
    #[serde(default)]
    pub radius_attrs: AttributeSet,

    #[serde(default)]
    pub non_overridable_radius_attrs: AttributeSet,

    #[serde(default)]
    pub clients: Vec<RadiusClient>,

    #[serde(default)]
    pub realms: HashMap<String, RealmEntry>,

    #[serde(default)]
    pub profiles: ProfileStore,

    #[serde(default)]
    pub checkers: HashMap<String, Vec<Condition>>,

    #[serde(default)]
    pub filters: RadiusFilters,

    #[serde(default)]
    pub proxy_groups: HashMap<String, ProxyGroup>,

    #[serde(default)]
    pub copy_targets: Vec<CopyTarget>,

    #[serde(default)]
    pub cdr_writers: Vec<CdrWriterSpec>,

    #[serde(default)]
    pub special_users: SpecialUsers,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let mut profiles = ProfileStore::new();
        profiles.insert(STANDARD_PROFILE, Profile::default());

        PolicyConfig {
            log_level: None,
            plan_refresh_seconds: default_plan_refresh_seconds(),
            properties: Properties::new(),
            radius_attrs: AttributeSet::new(),
            non_overridable_radius_attrs: AttributeSet::new(),
            clients: vec![],
            realms: HashMap::new(),
            profiles,
            checkers: HashMap::new(),
            filters: RadiusFilters::default(),
            proxy_groups: HashMap::new(),
            copy_targets: vec![],
            cdr_writers: vec![],
            special_users: SpecialUsers::default(),
        }
    }
}

impl PolicyConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: PolicyConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Find the client line for a NAS address
    ///
    /// Returns the first enabled client whose network contains `nas_ip`.
    pub fn find_client(&self, nas_ip: IpAddr) -> Option<&RadiusClient> {
        for client in &self.clients {
            if !client.enabled {
                continue;
            }
            if let Ok(true) = client.matches(nas_ip) {
                return Some(client);
            }
        }
        None
    }

    pub fn realm(&self, realm: &str) -> Option<&RealmEntry> {
        self.realms.get(realm)
    }

    /// Check every name reference in the configuration
    ///
    /// Returns the compiled checkers so callers don't build them twice.
    pub fn validate(&self) -> Result<RadiusCheckers, ConfigError> {
        if !self.profiles.contains(STANDARD_PROFILE) {
            return Err(ConfigError::MissingReference {
                kind: "profile",
                name: STANDARD_PROFILE.to_string(),
                referrer: "plan assignment".to_string(),
            });
        }

        for client in &self.clients {
            client.parse_network()?;
        }

        let checkers = RadiusCheckers::build(&self.checkers)?;

        for target in &self.copy_targets {
            let referrer = format!("copy target '{}'", target.name);
            self.require(checkers.contains(&target.checker), "checker", &target.checker, &referrer)?;
            if let Some(filter) = &target.filter {
                self.require(self.filters.contains(filter), "filter", filter, &referrer)?;
            }
            self.require(
                self.proxy_groups.contains_key(&target.proxy_group),
                "proxy group",
                &target.proxy_group,
                &referrer,
            )?;
        }

        for (index, writer) in self.cdr_writers.iter().enumerate() {
            let referrer = format!("CDR writer #{}", index);
            self.require(checkers.contains(&writer.checker), "checker", &writer.checker, &referrer)?;
        }

        self.validate_properties(&self.properties, "global properties")?;
        for client in &self.clients {
            let referrer = format!("client '{}'", client.address);
            self.validate_properties(&client.properties, &referrer)?;
        }
        for (name, realm) in &self.realms {
            let referrer = format!("realm '{}'", name);
            self.validate_properties(&realm.properties, &referrer)?;
        }

        Ok(checkers)
    }

    fn validate_properties(&self, props: &Properties, referrer: &str) -> Result<(), ConfigError> {
        if let Some(mode) = props.get_str("auth_local")
            && AuthMode::parse(mode).is_none()
        {
            return Err(ConfigError::Invalid(format!(
                "Unknown auth_local mode '{}' in {}",
                mode, referrer
            )));
        }

        for key in [
            "permissive_profile",
            "notification_profile",
            "blocking_profile",
            "realm_profile",
            "reject_profile",
        ] {
            if let Some(name) = props.get_str(key) {
                self.require(self.profiles.contains(name), "profile", name, referrer)?;
            }
        }

        for key in [
            "auth_proxy_filter_out",
            "auth_proxy_filter_in",
            "acct_proxy_filter_out",
        ] {
            if let Some(name) = props.get_str(key) {
                self.require(self.filters.contains(name), "filter", name, referrer)?;
            }
        }

        if let Some(group) = props.get_str("proxy_group")
            && group != "none"
        {
            self.require(self.proxy_groups.contains_key(group), "proxy group", group, referrer)?;
        }

        Ok(())
    }

    fn require(
        &self,
        present: bool,
        kind: &'static str,
        name: &str,
        referrer: &str,
    ) -> Result<(), ConfigError> {
        if present {
            Ok(())
        } else {
            Err(ConfigError::MissingReference {
                kind,
                name: name.to_string(),
                referrer: referrer.to_string(),
            })
        }
    }

    /// Create an example configuration file
    pub fn example() -> Self {
        let mut properties = Properties::new();
        properties
            .set("provision_type", "database")
            .set("auth_local", "provision")
            .set("notification_profile", "notification")
            .set("notification_is_addon", true)
            .set("blocking_profile", "blocked")
            .set("blocking_is_addon", true)
            .set("proxy_timeout_millis", 3000)
            .set("proxy_retries", 1)
            .set("auth_proxy_filter_out", "strip-internal")
            .set("acct_proxy_filter_out", "strip-internal");

        let mut client_properties = Properties::new();
        client_properties.set("permissive_profile", "permissive");

        let mut realm_properties = Properties::new();
        realm_properties
            .set("provision_type", "file")
            .set("auth_local", "file")
            .set("realm_profile", "wholesale");

        let mut profiles = ProfileStore::new();
        profiles.insert(
            STANDARD_PROFILE,
            Profile {
                reply_items: [
                    Avp::new("Filter-Id", "${FilterId}"),
                    Avp::new("Session-Timeout", 86400),
                ]
                .into_iter()
                .collect(),
                non_overridable_reply_items: AttributeSet::new(),
            },
        );
        profiles.insert(
            "notification",
            Profile {
                reply_items: [Avp::new("Filter-Id", "notification")].into_iter().collect(),
                non_overridable_reply_items: AttributeSet::new(),
            },
        );
        profiles.insert(
            "blocked",
            Profile {
                reply_items: [Avp::new("Filter-Id", "blocked")].into_iter().collect(),
                non_overridable_reply_items: [Avp::new("Idle-Timeout", 300)].into_iter().collect(),
            },
        );
        profiles.insert(
            "permissive",
            Profile {
                reply_items: [Avp::new("Filter-Id", "captive")].into_iter().collect(),
                non_overridable_reply_items: AttributeSet::new(),
            },
        );
        profiles.insert("wholesale", Profile::default());

        let mut realms = HashMap::new();
        realms.insert(
            "wholesale.example".to_string(),
            RealmEntry {
                properties: realm_properties,
                reply_items: [Avp::new("Acct-Interim-Interval", 900)].into_iter().collect(),
                non_overridable_reply_items: AttributeSet::new(),
            },
        );

        let mut checkers = HashMap::new();
        checkers.insert(
            "service".to_string(),
            vec![Condition::Present {
                attribute: "PSA-ServiceName".to_string(),
            }],
        );
        checkers.insert(
            "session".to_string(),
            vec![Condition::Absent {
                attribute: "PSA-ServiceName".to_string(),
            }],
        );

        let mut filters = HashMap::new();
        filters.insert(
            "strip-internal".to_string(),
            AvpFilter {
                allow: vec![],
                remove: vec![
                    "PSA-AccessId".to_string(),
                    "PSA-AccessPort".to_string(),
                    "PSA-MAC-Address".to_string(),
                ],
                force: AttributeSet::new(),
            },
        );

        let mut proxy_groups = HashMap::new();
        proxy_groups.insert(
            "billing".to_string(),
            ProxyGroup {
                servers: vec!["10.1.1.1:1813".to_string()],
                secret: None,
            },
        );

        let mut special_users = SpecialUsers::default();
        special_users.insert(
            "test@wholesale.example",
            SpecialUser {
                password: "secret".to_string(),
                plan_name: "test".to_string(),
                external_client_id: "test-client".to_string(),
            },
        );

        PolicyConfig {
            log_level: Some("info".to_string()),
            plan_refresh_seconds: 60,
            properties,
            radius_attrs: [Avp::new("Acct-Interim-Interval", 3600)].into_iter().collect(),
            non_overridable_radius_attrs: AttributeSet::new(),
            clients: vec![RadiusClient {
                address: "10.0.0.0/8".to_string(),
                name: Some("BRAS pool".to_string()),
                enabled: true,
                properties: client_properties,
            }],
            realms,
            profiles,
            checkers,
            filters: RadiusFilters::new(filters),
            proxy_groups,
            copy_targets: vec![CopyTarget {
                name: "billing-copy".to_string(),
                proxy_group: "billing".to_string(),
                checker: "session".to_string(),
                filter: Some("strip-internal".to_string()),
                timeout_millis: 2000,
                retries: 0,
                server_retries: 0,
            }],
            cdr_writers: vec![
                CdrWriterSpec {
                    path: PathBuf::from("/var/log/psba/session"),
                    file_prefix: "session".to_string(),
                    format: CdrFormat::Json,
                    attributes: vec![],
                    checker: "session".to_string(),
                    rotate_seconds: 3600,
                },
                CdrWriterSpec {
                    path: PathBuf::from("/var/log/psba/service"),
                    file_prefix: "service".to_string(),
                    format: CdrFormat::Csv,
                    attributes: vec![],
                    checker: "service".to_string(),
                    rotate_seconds: 3600,
                },
            ],
            special_users,
        }
    }
}
