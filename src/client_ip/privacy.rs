//! Privacy transforms for resolved client addresses

use ipnet::{Ipv4Net, Ipv6Net};
use sha2::{Digest, Sha256};
use std::net::IpAddr;

/// Prefix kept when anonymizing an IPv4 address
pub const IPV4_PREFIX_LEN: u8 = 16;

/// Prefix kept when anonymizing an IPv6 address
pub const IPV6_PREFIX_LEN: u8 = 48;

/// Anonymize an address by truncating it to its network prefix
///
/// - IPv4: keep /16, zero the last two octets
/// - IPv6: keep /48, zero the last 80 bits
///
/// IPv4-mapped IPv6 addresses are treated as IPv4. Returns `None` when `addr`
/// does not parse; callers turn that into a server error.
pub fn anonymize_ip(addr: &str) -> Option<String> {
    let ip = addr.parse::<IpAddr>().ok()?;

    let masked = match ip {
        IpAddr::V4(v4) => IpAddr::V4(Ipv4Net::new(v4, IPV4_PREFIX_LEN).ok()?.network()),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(Ipv4Net::new(v4, IPV4_PREFIX_LEN).ok()?.network()),
            None => IpAddr::V6(Ipv6Net::new(v6, IPV6_PREFIX_LEN).ok()?.network()),
        },
    };

    Some(masked.to_string())
}

/// SHA-256 of the literal address string, as 64 lowercase hex characters
pub fn hash_ip(addr: &str) -> String {
    let digest = Sha256::digest(addr.as_bytes());
    format!("{:x}", digest)
}
