//! Source-IP resolution for record enrichment.

use std::net::{IpAddr, UdpSocket};

/// Address the detection socket is "connected" to. No datagram is ever
/// sent; the connect call only forces the OS to pick the outbound
/// interface whose address we then read back.
const PROBE_ADDR: (&str, u16) = ("8.8.8.8", 80);

/// Resolves the outward-facing IPv4 address of the emitting host.
///
/// By default the address is detected per call via a UDP socket bound to an
/// ephemeral port; [`SourceIpResolver::fixed`] pins a known address instead,
/// for tests or deployments behind stable NAT.
#[derive(Debug, Clone, Default)]
pub struct SourceIpResolver {
    fixed: Option<String>,
}

impl SourceIpResolver {
    /// Creates a resolver that detects the host address on every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a resolver that always reports the given address.
    #[must_use]
    pub fn fixed(ip: impl Into<String>) -> Self {
        Self {
            fixed: Some(ip.into()),
        }
    }

    /// Returns the source address to stamp on a record.
    ///
    /// Falls back to the IPv4 loopback address when the host has no
    /// routable interface.
    #[must_use]
    pub fn resolve(&self) -> String {
        if let Some(ip) = &self.fixed {
            return ip.clone();
        }
        detect_ipv4().unwrap_or_else(|| "127.0.0.1".to_string())
    }
}

fn detect_ipv4() -> Option<String> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect(PROBE_ADDR).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) => Some(ip.to_string()),
        IpAddr::V6(_) => None,
    }
}
