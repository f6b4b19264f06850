use super::Code;
use crate::attributes::{AttributeSet, Avp, AvpValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Name of the vendor-specific attribute carrying `key=value` pairs
pub const CISCO_AVPAIR: &str = "Cisco-AVPair";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid packet code: {0}")]
    InvalidCode(u8),
    #[error("Invalid packet document: {0}")]
    Document(#[from] serde_json::Error),
}

/// RADIUS packet after decoding
///
/// Mirrors the RFC 2865 header (code, identifier, authenticator) with the
/// attribute list already resolved to names and typed values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Packet type
    pub code: Code,
    /// Packet identifier for matching requests/responses
    #[serde(default)]
    pub identifier: u8,
    /// Request or Response Authenticator
    #[serde(default)]
    pub authenticator: [u8; 16],
    /// Attributes, in wire order
    #[serde(default)]
    pub avps: AttributeSet,
}

impl Packet {
    pub fn new(code: Code, identifier: u8, authenticator: [u8; 16]) -> Self {
        Packet {
            code,
            identifier,
            authenticator,
            avps: AttributeSet::new(),
        }
    }

    /// Parse a packet from its JSON document form
    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build the response skeleton for `request`
    ///
    /// Access requests get Access-Accept or Access-Reject depending on
    /// `accept`; accounting requests always get Accounting-Response.
    pub fn response_to(request: &Packet, accept: bool) -> Packet {
        let code = match request.code {
            Code::AccountingRequest => Code::AccountingResponse,
            _ if accept => Code::AccessAccept,
            _ => Code::AccessReject,
        };
        Packet::new(code, request.identifier, request.authenticator)
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<AvpValue>) -> &mut Self {
        self.avps.push(Avp::new(name, value));
        self
    }

    /// Replace all occurrences of `name`, or append it if absent
    pub fn replace(&mut self, name: impl Into<String>, value: impl Into<AvpValue>) -> &mut Self {
        self.avps.replace(Avp::new(name, value));
        self
    }

    pub fn remove(&mut self, name: &str) -> usize {
        self.avps.remove_all(name)
    }

    /// Find first attribute by name
    pub fn get_avp(&self, name: &str) -> Option<&AvpValue> {
        self.avps.get(name)
    }

    /// Find all attributes by name
    pub fn get_all_avps(&self, name: &str) -> Vec<&AvpValue> {
        self.avps.get_all(name)
    }

    /// String rendering of the first attribute, empty if absent
    pub fn get_string_avp(&self, name: &str) -> String {
        self.avps.get(name).map(|v| v.to_string()).unwrap_or_default()
    }

    /// Integer value of the first attribute, 0 if absent or not numeric
    pub fn get_int_avp(&self, name: &str) -> i64 {
        self.avps.get(name).and_then(|v| v.as_integer()).unwrap_or(0)
    }

    /// Decoded password attribute as text
    ///
    /// The codec layer has already undone the RFC 2865 hiding, so octets
    /// here are the cleartext bytes.
    pub fn get_password_avp(&self, name: &str) -> Option<String> {
        self.avps.get(name).map(|v| v.as_text_lossy())
    }

    /// Value of the first `Cisco-AVPair` whose key is `key`
    pub fn get_cisco_avpair(&self, key: &str) -> Option<String> {
        self.avps
            .get_all(CISCO_AVPAIR)
            .into_iter()
            .filter_map(|v| v.as_str())
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:?} [id {}]", self.code, self.identifier)?;
        for avp in &self.avps {
            writeln!(f, "    {}", avp)?;
        }
        Ok(())
    }
}
