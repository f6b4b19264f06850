//! Shared collaborators for the engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use psba_engine::{
    CdrBinding, CdrError, CdrWriter, ClientRecord, MemoryProvisioningStore, PlanParameter,
    PlanParameterCache, PlanParameters, PolicyConfig, PolicyEngine, PolicySnapshot, RadiusRouter,
    RouteError, RoutePolicy, StaticPlanParameters,
};
use radius_model::{Code, Packet};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a scripted upstream group answers
#[derive(Clone)]
pub enum Upstream {
    Accept(Vec<(&'static str, &'static str)>),
    Reject(&'static str),
    Fail(RouteError),
    /// Accept after a delay
    Slow(Duration),
}

/// A routed request as seen by the router
#[derive(Clone)]
pub struct Sent {
    pub group: String,
    pub packet: Packet,
    pub policy: RoutePolicy,
}

#[derive(Default)]
pub struct ScriptedRouter {
    upstream: HashMap<String, Upstream>,
    pub sent: Mutex<Vec<Sent>>,
    pub completed: AtomicUsize,
}

impl ScriptedRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, group: &str, upstream: Upstream) -> Self {
        self.upstream.insert(group.to_string(), upstream);
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, group: &str) -> Vec<Sent> {
        self.sent().into_iter().filter(|s| s.group == group).collect()
    }
}

#[async_trait]
impl RadiusRouter for ScriptedRouter {
    async fn route(&self, packet: Packet, group: &str, policy: &RoutePolicy) -> Result<Packet, RouteError> {
        self.sent.lock().unwrap().push(Sent {
            group: group.to_string(),
            packet: packet.clone(),
            policy: policy.clone(),
        });

        let result = match self.upstream.get(group) {
            None => Err(RouteError::UnknownGroup(group.to_string())),
            Some(Upstream::Fail(e)) => Err(e.clone()),
            Some(Upstream::Reject(message)) => {
                let mut reply = Packet::response_to(&packet, false);
                reply.add("Reply-Message", *message);
                Ok(reply)
            }
            Some(Upstream::Accept(avps)) => {
                let mut reply = Packet::response_to(&packet, true);
                for (name, value) in avps {
                    reply.add(*name, *value);
                }
                Ok(reply)
            }
            Some(Upstream::Slow(delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(Packet::response_to(&packet, true))
            }
        };
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// CDR writer keeping every packet in memory
#[derive(Default)]
pub struct RecordingWriter {
    pub packets: Mutex<Vec<Packet>>,
}

impl RecordingWriter {
    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().unwrap().clone()
    }
}

#[async_trait]
impl CdrWriter for RecordingWriter {
    async fn write(&self, packet: &Packet) -> Result<(), CdrError> {
        self.packets.lock().unwrap().push(packet.clone());
        Ok(())
    }
}

pub fn binding(writer: &Arc<RecordingWriter>, checker: &str) -> CdrBinding {
    CdrBinding {
        writer: writer.clone(),
        checker: checker.to_string(),
    }
}

pub fn config(value: serde_json::Value) -> PolicyConfig {
    let config: PolicyConfig = serde_json::from_value(value).expect("test config parses");
    config.validate().expect("test config is valid");
    config
}

/// Plan parameters from `(plan, name, value)` rows
pub fn plans(rows: &[(&str, &str, &str)]) -> PlanParameters {
    let mut parameters = PlanParameters::new();
    for (plan, name, value) in rows {
        parameters
            .entry(plan.to_string())
            .or_insert_with(Vec::new)
            .push(PlanParameter::new(*name, *value));
    }
    parameters
}

pub async fn engine(
    config: PolicyConfig,
    writers: Vec<CdrBinding>,
    records: Vec<ClientRecord>,
    router: Arc<ScriptedRouter>,
    parameters: PlanParameters,
) -> PolicyEngine {
    let plans = PlanParameterCache::new(Arc::new(StaticPlanParameters(parameters))).await;
    PolicyEngine::new(
        PolicySnapshot::new(config, writers).expect("snapshot builds"),
        Arc::new(MemoryProvisioningStore::from_records(records)),
        router,
        plans,
    )
    .expect("engine builds")
}

pub fn access_request(user: &str, password: &str, nas_ip: &str, nas_port: i64) -> Packet {
    let mut packet = Packet::new(Code::AccessRequest, 42, [7u8; 16]);
    packet
        .add("User-Name", user)
        .add("User-Password", password)
        .add("NAS-IP-Address", nas_ip)
        .add("NAS-Port", nas_port);
    packet
}

pub fn accounting_request(user: &str, nas_ip: &str, nas_port: i64) -> Packet {
    let mut packet = Packet::new(Code::AccountingRequest, 43, [9u8; 16]);
    packet
        .add("User-Name", user)
        .add("Acct-Status-Type", 3)
        .add("Acct-Session-Id", "sess-1")
        .add("NAS-IP-Address", nas_ip)
        .add("NAS-Port", nas_port);
    packet
}
