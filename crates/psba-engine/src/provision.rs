//! Provisioning lookup
//!
//! Resolves the client record for an access line through one of three
//! backends selected by the merged `provision_type` property:
//!
//! - `database`: keyed lookup by access id and port in a [`ProvisioningStore`]
//! - `file`: lookup by user name in the [`SpecialUsers`] registry
//! - `none`: lookup skipped

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Unknown provision backend: {0}")]
    UnknownBackend(String),
    #[error("Provisioning store error: {0}")]
    Store(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockingStatus {
    #[default]
    None,
    Notify,
    Blocked,
}

/// Client and point-of-use data for one access line
///
/// A read-only snapshot fetched per request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientRecord {
    pub client_id: i64,
    pub external_client_id: String,
    pub isp: Option<String>,
    pub plan_name: String,
    pub blocking_status: BlockingStatus,
    pub plan_override: Option<String>,
    pub plan_override_expiry: Option<DateTime<Utc>>,
    pub addon_override: Option<String>,
    pub addon_override_expiry: Option<DateTime<Utc>>,
    pub notification_expiry: Option<DateTime<Utc>>,
    pub access_id: String,
    pub access_port: i64,
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub ipv4_address: Option<String>,
    pub ipv6_delegated_prefix: Option<String>,
    pub ipv6_wan_prefix: Option<String>,
    /// Synthesized from the special users registry
    pub special: bool,
}

impl ClientRecord {
    pub fn has_plan(&self) -> bool {
        !self.plan_name.is_empty()
    }
}

/// Relational store collaborator
#[async_trait]
pub trait ProvisioningStore: Send + Sync {
    /// Find the record for an access line; `None` when not provisioned
    async fn find_client(
        &self,
        access_id: &str,
        access_port: i64,
    ) -> Result<Option<ClientRecord>, ProvisionError>;
}

/// In-memory store keyed by access id and port
#[derive(Debug, Clone, Default)]
pub struct MemoryProvisioningStore {
    records: HashMap<(String, i64), ClientRecord>,
}

impl MemoryProvisioningStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = ClientRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn insert(&mut self, record: ClientRecord) {
        self.records
            .insert((record.access_id.clone(), record.access_port), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ProvisioningStore for MemoryProvisioningStore {
    async fn find_client(
        &self,
        access_id: &str,
        access_port: i64,
    ) -> Result<Option<ClientRecord>, ProvisionError> {
        Ok(self
            .records
            .get(&(access_id.to_string(), access_port))
            .cloned())
    }
}

/// Special user entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialUser {
    pub password: String,
    #[serde(default)]
    pub plan_name: String,
    #[serde(default)]
    pub external_client_id: String,
}

/// Registry of special users, keyed by lower-cased user name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecialUsers {
    users: HashMap<String, SpecialUser>,
}

impl SpecialUsers {
    pub fn insert(&mut self, user_name: impl Into<String>, user: SpecialUser) {
        self.users.insert(user_name.into(), user);
    }

    pub fn get(&self, user_name: &str) -> Option<&SpecialUser> {
        self.users.get(user_name)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Outcome of a provisioning lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(ClientRecord),
    NotFound,
    /// Backend is `none`
    Skipped,
}

pub struct ProvisioningLookup<'a> {
    store: &'a dyn ProvisioningStore,
    special_users: &'a SpecialUsers,
}

impl<'a> ProvisioningLookup<'a> {
    pub fn new(store: &'a dyn ProvisioningStore, special_users: &'a SpecialUsers) -> Self {
        ProvisioningLookup {
            store,
            special_users,
        }
    }

    pub async fn find(
        &self,
        backend: &str,
        access_id: &str,
        access_port: i64,
        user_name: &str,
    ) -> Result<Lookup, ProvisionError> {
        let lookup = match backend {
            "database" => match self.store.find_client(access_id, access_port).await? {
                Some(record) => Lookup::Found(record),
                None => Lookup::NotFound,
            },
            "file" => match self.special_users.get(user_name) {
                Some(user) => Lookup::Found(ClientRecord {
                    plan_name: user.plan_name.clone(),
                    external_client_id: user.external_client_id.clone(),
                    special: true,
                    ..Default::default()
                }),
                None => Lookup::NotFound,
            },
            "none" => Lookup::Skipped,
            other => return Err(ProvisionError::UnknownBackend(other.to_string())),
        };

        debug!(
            backend = %backend,
            access_id = %access_id,
            access_port = access_port,
            found = matches!(lookup, Lookup::Found(_)),
            "Provisioning lookup"
        );
        Ok(lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryProvisioningStore {
        MemoryProvisioningStore::from_records([ClientRecord {
            client_id: 1,
            external_client_id: "ext-1".to_string(),
            plan_name: "fiber-100".to_string(),
            access_id: "10.0.0.1".to_string(),
            access_port: 4097,
            ..Default::default()
        }])
    }

    fn special_users() -> SpecialUsers {
        let mut users = SpecialUsers::default();
        users.insert(
            "test@lab",
            SpecialUser {
                password: "pw".to_string(),
                plan_name: "lab".to_string(),
                external_client_id: "lab-1".to_string(),
            },
        );
        users
    }

    #[tokio::test]
    async fn test_database_backend() {
        let store = store();
        let users = special_users();
        let lookup = ProvisioningLookup::new(&store, &users);

        match lookup.find("database", "10.0.0.1", 4097, "alice").await.unwrap() {
            Lookup::Found(record) => assert_eq!(record.plan_name, "fiber-100"),
            other => panic!("unexpected lookup {:?}", other),
        }
        assert_eq!(
            lookup.find("database", "10.0.0.1", 1, "alice").await.unwrap(),
            Lookup::NotFound
        );
    }

    #[tokio::test]
    async fn test_file_backend_marks_special() {
        let store = store();
        let users = special_users();
        let lookup = ProvisioningLookup::new(&store, &users);

        match lookup.find("file", "", 0, "test@lab").await.unwrap() {
            Lookup::Found(record) => {
                assert!(record.special);
                assert_eq!(record.plan_name, "lab");
                assert_eq!(record.external_client_id, "lab-1");
                assert_eq!(record.password, None);
            }
            other => panic!("unexpected lookup {:?}", other),
        }
        assert_eq!(
            lookup.find("file", "", 0, "nobody").await.unwrap(),
            Lookup::NotFound
        );
    }

    #[tokio::test]
    async fn test_none_and_unknown_backends() {
        let store = store();
        let users = special_users();
        let lookup = ProvisioningLookup::new(&store, &users);

        assert_eq!(lookup.find("none", "", 0, "x").await.unwrap(), Lookup::Skipped);
        assert!(matches!(
            lookup.find("ldap", "", 0, "x").await,
            Err(ProvisionError::UnknownBackend(name)) if name == "ldap"
        ));
    }

    #[test]
    fn test_record_defaults_from_json() {
        let record: ClientRecord = serde_json::from_str(
            r#"{"plan_name": "gold", "blocking_status": "blocked",
                "notification_expiry": "2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(record.has_plan());
        assert_eq!(record.blocking_status, BlockingStatus::Blocked);
        assert!(record.notification_expiry.is_some());
        assert_eq!(record.password, None);
    }
}
