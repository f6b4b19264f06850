//! Access line identity
//!
//! Derives the subscriber identity from a raw request: device type, user
//! name and realm, MAC address and the `(access id, access port)` pair used
//! as the provisioning key. The resolved values are appended to the request
//! as `PSA-*` attributes so lookups, CDRs and proxied copies can see them.

use radius_model::Packet;
use regex::Regex;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

pub const PSA_ACCESS_ID: &str = "PSA-AccessId";
pub const PSA_ACCESS_PORT: &str = "PSA-AccessPort";
pub const PSA_MAC_ADDRESS: &str = "PSA-MAC-Address";
pub const PSA_SERVICE_NAME: &str = "PSA-ServiceName";

/// Realm used when the user name carries no `@domain` suffix
pub const NO_REALM: &str = "NONE";

pub const HW_USER_MAC: &str = "HW-User-MAC";
pub const ALC_CLIENT_HARDWARE_ADDR: &str = "Alc-Client-Hardware-Addr";
pub const UNISPHERE_PPPOE_DESCRIPTION: &str = "Unisphere-PPPoE-Description";

/// Pseudowire port identifier: `ip:[svlan-]cvlan`
const PSEUDOWIRE_PATTERN: &str = r"^([0-9]+\.[0-9]+\.[0-9]+\.[0-9]+):(?:([0-9]+)-)?([0-9]+)$";

/// Access port stride per outer VLAN
const SVLAN_STRIDE: i64 = 4096;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Malformed pseudowire identifier: {0}")]
    Pseudowire(String),
}

/// Access device family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientType {
    Huawei,
    Alu,
    Cisco,
    Mx,
    /// Secondary server relaying requests it already processed
    Relay,
    Default,
}

impl ClientType {
    /// Detect from vendor-specific markers, first match wins
    pub fn detect(request: &Packet) -> ClientType {
        if request.get_avp(HW_USER_MAC).is_some() {
            ClientType::Huawei
        } else if request.get_avp(ALC_CLIENT_HARDWARE_ADDR).is_some() {
            ClientType::Alu
        } else if request.get_avp(radius_model::CISCO_AVPAIR).is_some() {
            ClientType::Cisco
        } else if request.get_avp(UNISPHERE_PPPOE_DESCRIPTION).is_some() {
            ClientType::Mx
        } else {
            ClientType::Default
        }
    }

    /// Parse a configured tag such as "HUAWEI" or "SRC"
    pub fn from_tag(tag: &str) -> ClientType {
        match tag.to_ascii_uppercase().as_str() {
            "HUAWEI" => ClientType::Huawei,
            "ALU" => ClientType::Alu,
            "CISCO" => ClientType::Cisco,
            "MX" => ClientType::Mx,
            "SRC" => ClientType::Relay,
            _ => ClientType::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Huawei => "HUAWEI",
            ClientType::Alu => "ALU",
            ClientType::Cisco => "CISCO",
            ClientType::Mx => "MX",
            ClientType::Relay => "SRC",
            ClientType::Default => "DEFAULT",
        }
    }

    /// Devices whose NAS-Port-Id carries a pseudowire identifier
    pub fn is_dsl_aggregation(&self) -> bool {
        matches!(self, ClientType::Huawei | ClientType::Mx)
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessIdentity {
    pub client_type: ClientType,
    /// Lower-cased User-Name
    pub user_name: String,
    pub realm: String,
    pub mac_address: Option<String>,
    pub access_id: String,
    pub access_port: i64,
    /// NAS-IP-Address as received, used to find the client line
    pub nas_ip_address: String,
}

pub struct IdentityResolver {
    pseudowire: Regex,
}

impl IdentityResolver {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(IdentityResolver {
            pseudowire: Regex::new(PSEUDOWIRE_PATTERN)?,
        })
    }

    /// Resolve the identity and append the `PSA-*` attributes to `request`
    pub fn resolve(&self, request: &mut Packet) -> AccessIdentity {
        let client_type = ClientType::detect(request);
        let user_name = request.get_string_avp("User-Name").to_lowercase();
        let realm = realm_of(&user_name).to_string();
        let mac_address = mac_address_of(request);

        let nas_port_id = request.get_string_avp("NAS-Port-Id");
        let decoded = if !nas_port_id.is_empty() && client_type.is_dsl_aggregation() {
            match self.decode_pseudowire(&nas_port_id) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    warn!(error = %e, "Falling back to NAS-Port/NAS-IP-Address");
                    None
                }
            }
        } else {
            None
        };

        let nas_ip_address = request.get_string_avp("NAS-IP-Address");
        let (access_id, access_port) = decoded
            .unwrap_or_else(|| (nas_ip_address.clone(), request.get_int_avp("NAS-Port")));

        debug!(
            client_type = %client_type,
            user_name = %user_name,
            realm = %realm,
            access_id = %access_id,
            access_port = access_port,
            "Resolved access identity"
        );

        if let Some(mac) = &mac_address {
            request.add(PSA_MAC_ADDRESS, mac.as_str());
        }
        request.add(PSA_ACCESS_ID, access_id.as_str());
        request.add(PSA_ACCESS_PORT, access_port);

        AccessIdentity {
            client_type,
            user_name,
            realm,
            mac_address,
            access_id,
            access_port,
            nas_ip_address,
        }
    }

    /// Decode `ip:[svlan-]cvlan` into `(ip, svlan * 4096 + cvlan)`
    pub fn decode_pseudowire(&self, port_id: &str) -> Result<(String, i64), IdentityError> {
        let malformed = || IdentityError::Pseudowire(port_id.to_string());
        let captures = self.pseudowire.captures(port_id).ok_or_else(malformed)?;

        let svlan = match captures.get(2) {
            Some(m) => m.as_str().parse::<i64>().map_err(|_| malformed())?,
            None => 0,
        };
        let cvlan = captures
            .get(3)
            .ok_or_else(malformed)?
            .as_str()
            .parse::<i64>()
            .map_err(|_| malformed())?;
        let access_port = svlan
            .checked_mul(SVLAN_STRIDE)
            .and_then(|p| p.checked_add(cvlan))
            .ok_or_else(malformed)?;

        let access_id = captures.get(1).ok_or_else(malformed)?.as_str().to_string();
        Ok((access_id, access_port))
    }
}

/// Substring after the first `@`, or [`NO_REALM`]
pub fn realm_of(user_name: &str) -> &str {
    user_name
        .split_once('@')
        .map(|(_, realm)| realm)
        .unwrap_or(NO_REALM)
}

/// First non-empty MAC address among the vendor encodings
fn mac_address_of(request: &Packet) -> Option<String> {
    let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };

    non_empty(request.get_string_avp(HW_USER_MAC))
        .or_else(|| non_empty(request.get_string_avp(ALC_CLIENT_HARDWARE_ADDR)))
        .or_else(|| {
            // MAC follows a 6-character description prefix
            request
                .get_string_avp(UNISPHERE_PPPOE_DESCRIPTION)
                .get(6..)
                .map(str::to_string)
                .and_then(non_empty)
        })
        .or_else(|| request.get_cisco_avpair("macaddress").and_then(non_empty))
}
