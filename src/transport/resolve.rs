//! Host name resolution.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use crate::error::{Result, TransportError};

/// Resolve `host` to a socket address.
///
/// A literal IPv4/IPv6 address is used as-is. Otherwise the name is resolved
/// through the system resolver and the first IPv4 result is preferred, falling
/// back to the first result of any family.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            tracing::debug!(host, error = %e, "name resolution failed");
            Vec::new()
        }
    };

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| TransportError::Resolve {
            host: host.to_string(),
        })
}
