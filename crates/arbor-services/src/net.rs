//! Host address discovery

use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::debug;

/// First non-loopback IPv4 address of this host
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let interfaces = match NetworkInterface::show() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            debug!(error = %e, "Failed to list network interfaces");
            return None;
        }
    };

    interfaces
        .into_iter()
        .filter(|iface| {
            !iface.name.starts_with("lo")
                && !iface.name.starts_with("docker")
                && !iface.name.starts_with("br-")
                && !iface.name.starts_with("veth")
        })
        .flat_map(|iface| iface.addr)
        .find_map(|addr| match addr {
            Addr::V4(v4) if !v4.ip.is_loopback() => Some(v4.ip),
            _ => None,
        })
}

/// `scheme://host:port/` for a bound socket
///
/// A wildcard bind address is replaced by this host's IPv4 address, or by
/// loopback when none is found.
pub fn base_address(scheme: &str, local: SocketAddr) -> String {
    let ip = if local.ip().is_unspecified() {
        IpAddr::V4(local_ipv4().unwrap_or(Ipv4Addr::LOCALHOST))
    } else {
        local.ip()
    };
    format!("{}://{}/", scheme, SocketAddr::new(ip, local.port()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_address_for_specific_ip() {
        let local: SocketAddr = "127.0.0.1:8000".parse().unwrap();
        assert_eq!(base_address("http", local), "http://127.0.0.1:8000/");

        let v6: SocketAddr = "[::1]:5683".parse().unwrap();
        assert_eq!(base_address("coap", v6), "coap://[::1]:5683/");
    }

    #[test]
    fn test_base_address_for_wildcard() {
        let local: SocketAddr = "0.0.0.0:8000".parse().unwrap();
        let base = base_address("http", local);
        assert!(base.starts_with("http://"));
        assert!(base.ends_with(":8000/"));
        assert!(!base.contains("0.0.0.0"));
    }
}
