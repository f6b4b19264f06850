use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Typed attribute value
///
/// Deserialized untagged: JSON numbers become [`AvpValue::Integer`], strings
/// that parse as an IP address become [`AvpValue::Address`], any other string
/// is kept as [`AvpValue::String`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AvpValue {
    Integer(i64),
    Address(IpAddr),
    String(String),
    Octets(Vec<u8>),
}

impl AvpValue {
    /// Borrow the value as a string slice, if it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AvpValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as an integer
    ///
    /// String values holding a decimal number are accepted too, since some
    /// dictionaries carry counters as text.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AvpValue::Integer(n) => Some(*n),
            AvpValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interpret the value as an IP address
    pub fn as_address(&self) -> Option<IpAddr> {
        match self {
            AvpValue::Address(addr) => Some(*addr),
            AvpValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Raw bytes, lossily decoded as UTF-8 for octet values
    pub fn as_text_lossy(&self) -> String {
        match self {
            AvpValue::Octets(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for AvpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvpValue::Integer(n) => write!(f, "{}", n),
            AvpValue::Address(addr) => write!(f, "{}", addr),
            AvpValue::String(s) => f.write_str(s),
            AvpValue::Octets(bytes) => {
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for AvpValue {
    fn from(value: &str) -> Self {
        AvpValue::String(value.to_string())
    }
}

impl From<String> for AvpValue {
    fn from(value: String) -> Self {
        AvpValue::String(value)
    }
}

impl From<i64> for AvpValue {
    fn from(value: i64) -> Self {
        AvpValue::Integer(value)
    }
}

impl From<i32> for AvpValue {
    fn from(value: i32) -> Self {
        AvpValue::Integer(value as i64)
    }
}

impl From<u32> for AvpValue {
    fn from(value: u32) -> Self {
        AvpValue::Integer(value as i64)
    }
}

impl From<IpAddr> for AvpValue {
    fn from(value: IpAddr) -> Self {
        AvpValue::Address(value)
    }
}

impl From<Vec<u8>> for AvpValue {
    fn from(value: Vec<u8>) -> Self {
        AvpValue::Octets(value)
    }
}

/// A single attribute-value pair
///
/// Names may repeat inside a packet or an [`AttributeSet`](super::AttributeSet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avp {
    pub name: String,
    pub value: AvpValue,
}

impl Avp {
    pub fn new(name: impl Into<String>, value: impl Into<AvpValue>) -> Self {
        Avp {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Avp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            AvpValue::String(s) => write!(f, "{} = \"{}\"", self.name, s),
            other => write!(f, "{} = {}", self.name, other),
        }
    }
}
