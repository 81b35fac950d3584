//! Exact-address blocklist lookups

use std::net::IpAddr;

use crate::db::Database;
use crate::error::BlockCheckError;

/// Canonical text form of an address literal, so `2001:DB8::1` and
/// `2001:db8:0::1` hit the same row. IPv4-mapped IPv6 (`::ffff:1.2.3.4`)
/// collapses to plain IPv4, matching how peer addresses are resolved.
/// Non-literals are returned unchanged.
pub fn canonical_ip(ip: &str) -> String {
    ip.trim()
        .parse::<IpAddr>()
        .map(|addr| addr.to_canonical().to_string())
        .unwrap_or_else(|_| ip.to_string())
}

#[derive(Clone)]
pub struct BlocklistGate {
    db: Database,
}

impl BlocklistGate {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Whether `ip` has a blocklist entry. A store failure is returned to the
    /// caller, which must refuse the request.
    pub async fn is_blocked(&self, ip: &str) -> Result<bool, BlockCheckError> {
        self.db
            .is_blocked(&canonical_ip(ip))
            .await
            .map_err(|source| BlockCheckError {
                ip: ip.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_ipv6_and_keeps_ipv4() {
        assert_eq!(canonical_ip("192.168.1.10"), "192.168.1.10");
        assert_eq!(canonical_ip("2001:DB8:0:0::1"), "2001:db8::1");
        assert_eq!(canonical_ip(" 10.0.0.1 "), "10.0.0.1");
        assert_eq!(canonical_ip("not-an-ip"), "not-an-ip");
    }

    #[test]
    fn collapses_ipv4_mapped_ipv6() {
        assert_eq!(canonical_ip("::ffff:1.2.3.4"), "1.2.3.4");
        assert_eq!(canonical_ip("::FFFF:192.0.2.7"), "192.0.2.7");
        assert_eq!(canonical_ip("::ffff:0:1.2.3.4"), "::ffff:0:102:304");
    }
}
