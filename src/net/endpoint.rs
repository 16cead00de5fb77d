// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::fail::Fail;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

//==============================================================================
// Constants & Structures
//==============================================================================

/// Address family of an endpoint.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, derive_more::Display)]
pub enum AddressFamily {
    #[display(fmt = "ipv4")]
    Ipv4,
    #[display(fmt = "ipv6")]
    Ipv6,
}

/// An immutable, shareable TCP address record. Two endpoints are equal iff
/// their family, printable IP and port all match. The empty endpoint is a
/// sentinel and cannot be used for I/O.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Endpoint {
    addr: Option<SocketAddr>,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate functions for [Endpoint].
impl Endpoint {
    /// Creates the empty sentinel endpoint.
    pub fn empty() -> Self {
        Self { addr: None }
    }

    pub fn is_empty(&self) -> bool {
        self.addr.is_none()
    }

    /// Creates an endpoint by introspection of a bound or accepted socket
    /// address.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self { addr: Some(addr) }
    }

    /// The underlying socket address.
    /// PRE: !self.is_empty().
    pub fn socket_addr(&self) -> SocketAddr {
        self.addr.expect("empty endpoint used for i/o")
    }

    pub fn family(&self) -> Option<AddressFamily> {
        self.addr.map(|a| match a {
            SocketAddr::V4(_) => AddressFamily::Ipv4,
            SocketAddr::V6(_) => AddressFamily::Ipv6,
        })
    }

    /// Printable IP address, without the port.
    pub fn ip_address(&self) -> String {
        match self.addr {
            None => String::new(),
            Some(a) => a.ip().to_string(),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.map(|a| a.port()).unwrap_or(0)
    }
}

/// Display trait implementation for [Endpoint]; IPv6 addresses are
/// bracketed.
impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.addr {
            None => write!(f, "<empty endpoint>"),
            Some(a) => write!(f, "{}", a),
        }
    }
}

//==============================================================================
// Resolution
//==============================================================================

/// Resolves a literal IP address and port to an endpoint.
pub fn resolve_ip(ip: &str, port: u16) -> Result<Endpoint, Fail> {
    let parsed: IpAddr = ip
        .parse()
        .map_err(|_| Fail::address(format!("cannot parse ip address '{}'", ip)))?;
    Ok(Endpoint::from_socket_addr(SocketAddr::new(parsed, port)))
}

/// Resolves a host name and port to the endpoints it maps to.
pub fn resolve_host(host: &str, port: u16) -> Result<Vec<Endpoint>, Fail> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| Fail::address(format!("cannot resolve host '{}': {}", host, e)))?;
    let endpoints: Vec<Endpoint> = addrs.map(Endpoint::from_socket_addr).collect();
    if endpoints.is_empty() {
        return Err(Fail::address(format!("no addresses for host '{}'", host)));
    }
    Ok(endpoints)
}

/// Endpoints for the loopback interfaces.
pub fn local_interfaces(port: u16) -> Vec<Endpoint> {
    vec![
        Endpoint::from_socket_addr(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
        )),
        Endpoint::from_socket_addr(SocketAddr::new(
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            port,
        )),
    ]
}

/// Endpoints for all local interfaces (the unspecified addresses).
pub fn all_interfaces(port: u16) -> Vec<Endpoint> {
    vec![
        Endpoint::from_socket_addr(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
        )),
        Endpoint::from_socket_addr(SocketAddr::new(
            IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            port,
        )),
    ]
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_ip_v4() {
        let ep = resolve_ip("127.0.0.1", 8080).unwrap();
        assert_eq!(ep.ip_address(), "127.0.0.1");
        assert_eq!(ep.port(), 8080);
        assert_eq!(ep.family(), Some(AddressFamily::Ipv4));
        assert_eq!(format!("{}", ep), "127.0.0.1:8080");
    }

    #[test]
    fn resolve_ip_v6() {
        let ep = resolve_ip("::1", 8080).unwrap();
        assert_eq!(ep.family(), Some(AddressFamily::Ipv6));
        assert_eq!(format!("{}", ep), "[::1]:8080");
    }

    #[test]
    fn resolve_bad_ip() {
        assert!(resolve_ip("not-an-ip", 1).is_err());
    }

    #[test]
    fn endpoint_equality() {
        let a = resolve_ip("127.0.0.1", 11264).unwrap();
        let b = resolve_ip("127.0.0.1", 11264).unwrap();
        let c = resolve_ip("127.0.0.1", 11265).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Endpoint::empty());
    }

    #[test]
    fn empty_endpoint() {
        let ep = Endpoint::empty();
        assert!(ep.is_empty());
        assert_eq!(ep.port(), 0);
        assert_eq!(ep.family(), None);
    }
}
