use serde::Serialize;
use std::net::IpAddr;

/// JSON body of the address endpoints, keyed by address family.
///
/// Serializes as `{"ipv4": "..."}` or `{"ipv6": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressBody {
    Ipv4(String),
    Ipv6(String),
}

impl AddressBody {
    /// Key `value` by the family of `resolved`. IPv4-mapped IPv6 counts as IPv4.
    ///
    /// Returns `None` if `resolved` is not an IP address.
    pub fn new(resolved: &str, value: String) -> Option<Self> {
        match resolved.parse::<IpAddr>().ok()? {
            IpAddr::V4(_) => Some(AddressBody::Ipv4(value)),
            IpAddr::V6(v6) if v6.to_ipv4_mapped().is_some() => Some(AddressBody::Ipv4(value)),
            IpAddr::V6(_) => Some(AddressBody::Ipv6(value)),
        }
    }
}
