// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::fail::{ErrorStatus, Fail};
use crate::net::endpoint::Endpoint;

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};

//==============================================================================
// TCP Connection
//==============================================================================

/// A non-blocking TCP connection. `read` and `write` translate would-block
/// into a distinguished `Ok(None)` and never raise on that condition.
pub struct TcpConnection {
    stream: TcpStream,
    local: Endpoint,
    peer: Endpoint,
}

/// Associate functions for [TcpConnection].
impl TcpConnection {
    /// Connects to `server` and switches the stream to non-blocking mode.
    pub fn connect(server: &Endpoint) -> Result<Self, Fail> {
        let stream = TcpStream::connect(server.socket_addr())
            .map_err(|e| Fail::address(format!("cannot connect to {}: {}", server, e)))?;
        Self::from_stream(stream)
    }

    /// Wraps an accepted or connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self, Fail> {
        stream
            .set_nonblocking(true)
            .map_err(|e| Fail::address(format!("cannot set non-blocking: {}", e)))?;
        let local = stream
            .local_addr()
            .map(Endpoint::from_socket_addr)
            .unwrap_or_else(|_| Endpoint::empty());
        let peer = stream
            .peer_addr()
            .map(Endpoint::from_socket_addr)
            .unwrap_or_else(|_| Endpoint::empty());
        Ok(Self {
            stream,
            local,
            peer,
        })
    }

    /// Non-blocking read. `Ok(None)` means would-block; `Ok(Some(0))` means
    /// the peer closed its write end.
    pub fn read(&self, buf: &mut [u8]) -> Result<Option<usize>, ErrorStatus> {
        match (&self.stream).read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(ErrorStatus::from_io_error(&e)),
        }
    }

    /// Non-blocking write. `Ok(None)` means would-block.
    pub fn write(&self, buf: &[u8]) -> Result<Option<usize>, ErrorStatus> {
        match (&self.stream).write(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(ErrorStatus::from_io_error(&e)),
        }
    }

    /// Half-closes the connection, signaling EOF to the peer.
    pub fn close_write_end(&self) {
        let _ = self.stream.shutdown(Shutdown::Write);
    }

    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }

    pub fn peer_endpoint(&self) -> &Endpoint {
        &self.peer
    }
}

//==============================================================================
// TCP Acceptor
//==============================================================================

/// A non-blocking listening socket.
pub struct TcpAcceptor {
    listener: TcpListener,
    local: Endpoint,
}

/// Associate functions for [TcpAcceptor].
impl TcpAcceptor {
    /// Binds and starts listening on `endpoint`.
    pub fn bind(endpoint: &Endpoint) -> Result<Self, Fail> {
        let listener = TcpListener::bind(endpoint.socket_addr())
            .map_err(|e| Fail::address(format!("cannot bind {}: {}", endpoint, e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| Fail::address(format!("cannot set non-blocking: {}", e)))?;
        let local = listener
            .local_addr()
            .map(Endpoint::from_socket_addr)
            .map_err(|e| Fail::address(format!("cannot read local address: {}", e)))?;
        Ok(Self { listener, local })
    }

    /// Accepts a pending connection. Would-block yields `(None, Ok)`; an
    /// acceptance failure yields `(None, status)` and the listener stays
    /// usable.
    pub fn accept(&self) -> (Option<TcpConnection>, ErrorStatus) {
        match self.listener.accept() {
            Ok((stream, _)) => match TcpConnection::from_stream(stream) {
                Ok(conn) => (Some(conn), ErrorStatus::Ok),
                Err(_) => (None, ErrorStatus::System(libc::EIO)),
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => (None, ErrorStatus::Ok),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => (None, ErrorStatus::Ok),
            Err(e) => (None, ErrorStatus::from_io_error(&e)),
        }
    }

    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }

    pub fn fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::endpoint::resolve_ip;

    #[test]
    fn accept_would_block() {
        let acceptor = TcpAcceptor::bind(&resolve_ip("127.0.0.1", 0).unwrap()).unwrap();
        let (conn, status) = acceptor.accept();
        assert!(conn.is_none());
        assert!(status.is_ok());
    }

    #[test]
    fn connect_and_introspect() {
        let acceptor = TcpAcceptor::bind(&resolve_ip("127.0.0.1", 0).unwrap()).unwrap();
        let server = acceptor.local_endpoint().clone();
        assert_ne!(server.port(), 0);

        let client = TcpConnection::connect(&server).unwrap();
        assert_eq!(client.peer_endpoint(), &server);

        // The accepted side eventually shows up.
        let accepted = loop {
            let (conn, status) = acceptor.accept();
            assert!(status.is_ok());
            if let Some(conn) = conn {
                break conn;
            }
        };
        assert_eq!(accepted.local_endpoint(), &server);
    }
}
