//! RADIUS Packet Model
//!
//! This crate provides the name-keyed packet model the policy engine works
//! against. Wire encoding, dictionaries and password decryption belong to the
//! codec layer in front of it; by the time a [`Packet`] reaches this model its
//! attributes are already resolved to names and typed values.
//!
//! # Features
//!
//! - Ordered attribute sets with override and append merge operators
//! - Typed attribute values (integer, address, string, octets)
//! - Vendor-specific `Cisco-AVPair` lookup
//! - Response construction from a request
//!
//! # Example
//!
//! ```rust
//! use radius_model::{AttributeSet, Avp, Code, Packet};
//!
//! let mut request = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
//! request.add("User-Name", "alice@example.net");
//! request.add("NAS-Port", 12);
//!
//! let global: AttributeSet = vec![Avp::new("Session-Timeout", 3600)].into_iter().collect();
//! let realm: AttributeSet = vec![Avp::new("Session-Timeout", 600)].into_iter().collect();
//! assert_eq!(global.override_with(&realm).get("Session-Timeout").unwrap().to_string(), "600");
//!
//! let response = Packet::response_to(&request, true);
//! assert_eq!(response.code, Code::AccessAccept);
//! ```

pub mod attributes;
pub mod packet;

pub use attributes::{AttributeSet, Avp, AvpValue};
pub use packet::{CISCO_AVPAIR, Code, ModelError, Packet};
