use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use url::Url;

/// Where the listener binds and the host it announces
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Binding {
    pub(crate) bind: SocketAddr,
    pub(crate) public_host: String,
}

/// Resolve the bind address and public host
///
/// An explicit host is used for both. Without one the listener binds every
/// interface and announces the machine's own address.
pub(crate) fn resolve(host: Option<&str>, port: u16) -> anyhow::Result<Binding> {
    let Some(host) = host.map(str::trim).filter(|h| !h.is_empty()) else {
        return Ok(Binding {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            public_host: local_ip().to_string(),
        });
    };

    let bind = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => (host, port)
            .to_socket_addrs()
            .map_err(|e| anyhow::anyhow!("failed to resolve host {host}: {e}"))?
            .next()
            .ok_or_else(|| anyhow::anyhow!("host {host} resolved to no addresses"))?,
    };

    Ok(Binding {
        bind,
        public_host: host.to_owned(),
    })
}

/// Address of the interface used for outbound traffic
///
/// Connecting a UDP socket only selects a route; nothing is sent. Falls
/// back to loopback on hosts without a route.
pub(crate) fn local_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(192, 0, 2, 1), 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .ok()
        .filter(|ip| !ip.is_unspecified())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Externally reachable URI of the service root
pub(crate) fn public_uri(host: &str, port: u16, service_path: &str) -> anyhow::Result<Url> {
    let host = match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => format!("[{ip}]"),
        _ => host.to_owned(),
    };
    Url::parse(&format!("http://{host}:{port}{service_path}"))
        .map_err(|e| anyhow::anyhow!("invalid public URI for host {host}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_ip_is_bound_and_announced() {
        let binding = resolve(Some("127.0.0.1"), 9000).unwrap();

        assert_eq!(binding.bind, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(binding.public_host, "127.0.0.1");
    }

    #[test]
    fn hostname_is_resolved() {
        let binding = resolve(Some("localhost"), 0).unwrap();

        assert!(binding.bind.ip().is_loopback());
        assert_eq!(binding.public_host, "localhost");
    }

    #[test]
    fn missing_host_binds_everything() {
        let binding = resolve(None, 8080).unwrap();

        assert!(binding.bind.ip().is_unspecified());
        assert_eq!(binding.bind.port(), 8080);
        assert!(binding.public_host.parse::<IpAddr>().is_ok());
    }

    #[test]
    fn blank_host_counts_as_missing() {
        let binding = resolve(Some("  "), 8080).unwrap();
        assert!(binding.bind.ip().is_unspecified());
    }

    #[test]
    fn uri_includes_service_path() {
        let uri = public_uri("10.0.0.7", 8080, "/api").unwrap();
        assert_eq!(uri.as_str(), "http://10.0.0.7:8080/api");
    }

    #[test]
    fn ipv6_host_is_bracketed() {
        let uri = public_uri("::1", 8080, "/").unwrap();
        assert_eq!(uri.as_str(), "http://[::1]:8080/");
    }
}
