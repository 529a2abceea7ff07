//! Visitor address resolution from proxy headers.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Returned when no header carries a public address.
pub const UNKNOWN_IP: &str = "Unknown";

/// Headers checked in order; the remote address comes last.
pub const IP_HEADERS: [&str; 8] = [
    "cf-connecting-ip",
    "x-forwarded-for",
    "x-real-ip",
    "client-ip",
    "x-forwarded",
    "x-cluster-client-ip",
    "forwarded-for",
    "forwarded",
];

/// First public address found in the request headers, then the remote
/// address. Header names are matched case-insensitively and each value may
/// hold a comma-separated list.
#[must_use]
pub fn client_ip<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>, remote_addr: Option<&str>) -> String {
    let headers: HashMap<String, &str> = headers
        .into_iter()
        .map(|(name, value)| (name.trim().to_ascii_lowercase().replace('_', "-"), value))
        .collect();

    IP_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name).copied())
        .chain(remote_addr)
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .find(|candidate| is_public_ip(candidate))
        .map_or_else(|| UNKNOWN_IP.to_string(), ToString::to_string)
}

/// Whether `value` parses as an address outside private and reserved ranges.
#[must_use]
pub fn is_public_ip(value: &str) -> bool {
    match value.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => !is_private_v4(ip) && !is_reserved_v4(ip),
        Ok(IpAddr::V6(ip)) => !is_private_v6(ip) && !is_reserved_v6(ip),
        Err(_) => false,
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_private()
}

fn is_reserved_v4(ip: Ipv4Addr) -> bool {
    let [first, second, ..] = ip.octets();
    first == 0 || ip.is_loopback() || ip.is_link_local() || first >= 240 || (first == 100 && (64..128).contains(&second))
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

fn is_reserved_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_unspecified() || ip.is_loopback() || (first & 0xffc0) == 0xfe80 || ip.to_ipv4_mapped().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documentation_range_is_public() {
        assert!(is_public_ip("203.0.113.5"));
        assert!(is_public_ip("2606:4700::1111"));
    }

    #[test]
    fn test_private_and_reserved_ranges_are_skipped() {
        for ip in [
            "10.0.0.1",
            "172.16.4.2",
            "192.168.1.1",
            "127.0.0.1",
            "0.1.2.3",
            "169.254.0.9",
            "250.1.1.1",
            "::1",
            "fd00::1",
            "fe80::1",
            "::ffff:8.8.8.8",
        ] {
            assert!(!is_public_ip(ip), "{ip} should be skipped");
        }
        assert!(!is_public_ip("for=198.51.100.7"));
    }

    #[test]
    fn test_header_priority_and_lists() {
        let headers = [
            ("X-Forwarded-For", "10.0.0.2, 198.51.100.7"),
            ("CF-Connecting-IP", "192.168.0.5"),
        ];
        assert_eq!(client_ip(headers, Some("203.0.113.9")), "198.51.100.7");
    }

    #[test]
    fn test_falls_back_to_remote_then_unknown() {
        let none: [(&str, &str); 0] = [];
        assert_eq!(client_ip(none, Some("203.0.113.5")), "203.0.113.5");
        assert_eq!(client_ip([("x-real-ip", "127.0.0.1")], Some("10.1.1.1")), UNKNOWN_IP);
    }
}
