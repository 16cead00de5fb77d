// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::buffers::{tcp_buffers, NbInbuf, NbOutbuf, DEFAULT_BUFSIZE};
use crate::fail::Fail;
use crate::net::{Endpoint, TcpConnection};

use std::collections::VecDeque;
use std::sync::Mutex;

//==============================================================================
// Non-Blocking Client
//==============================================================================

/// The client side of one outgoing TCP connection: the server address plus
/// the connected non-blocking buffer pair.
pub struct NbClient {
    server_address: Endpoint,
    inbuf: NbInbuf,
    outbuf: NbOutbuf,
}

/// Associate functions for [NbClient].
impl NbClient {
    /// Connects to `server_address` and wraps the connection in a buffer
    /// pair.
    pub fn connect(server_address: &Endpoint, bufsize: usize) -> Result<Self, Fail> {
        let conn = TcpConnection::connect(server_address)?;
        let (inbuf, outbuf) = tcp_buffers(conn, bufsize);
        Ok(Self {
            server_address: server_address.clone(),
            inbuf,
            outbuf,
        })
    }

    pub fn server_address(&self) -> &Endpoint {
        &self.server_address
    }

    pub fn buffers(&mut self) -> (&mut NbInbuf, &mut NbOutbuf) {
        (&mut self.inbuf, &mut self.outbuf)
    }

    pub fn describe(&self) -> String {
        self.inbuf.describe()
    }
}

//==============================================================================
// Client Cache
//==============================================================================

/// Cache of idle client connections, keyed by server endpoint.
pub trait ClientCache: Send + Sync {
    /// Returns a cached connection for `server_address`, or a freshly
    /// connected one.
    fn obtain(&self, server_address: &Endpoint) -> Result<Box<NbClient>, Fail>;

    /// Stores an idle connection for possible later reuse.
    fn store(&self, client: Box<NbClient>);

    /// Removes every idle entry for `server_address`.
    fn invalidate_entries(&self, server_address: &Endpoint);
}

/// Bounded LRU implementation of [ClientCache]. The list is guarded by a
/// mutex; connecting and closing happen outside the lock.
pub struct SimpleClientCache {
    max_cachesize: usize,
    bufsize: usize,
    clients: Mutex<VecDeque<Box<NbClient>>>,
}

/// Associate functions for [SimpleClientCache].
impl SimpleClientCache {
    pub const DEFAULT_MAX_CACHESIZE: usize = 64;

    pub fn new(max_cachesize: usize, bufsize: usize) -> Self {
        Self {
            max_cachesize,
            bufsize,
            clients: Mutex::new(VecDeque::new()),
        }
    }
}

/// Default trait implementation for [SimpleClientCache].
impl Default for SimpleClientCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_CACHESIZE, DEFAULT_BUFSIZE)
    }
}

/// Cache trait implementation for [SimpleClientCache].
impl ClientCache for SimpleClientCache {
    fn obtain(&self, server_address: &Endpoint) -> Result<Box<NbClient>, Fail> {
        assert!(!server_address.is_empty());

        let cached = {
            let mut clients = self.clients.lock().unwrap();
            clients
                .iter()
                .position(|c| c.server_address() == server_address)
                .and_then(|pos| clients.remove(pos))
        };

        if let Some(client) = cached {
            info!("client cache: reusing connection {}", client.describe());
            return Ok(client);
        }

        match NbClient::connect(server_address, self.bufsize) {
            Ok(client) => {
                info!("client cache: created new connection {}", client.describe());
                Ok(Box::new(client))
            }
            Err(e) => {
                self.invalidate_entries(server_address);
                Err(e)
            }
        }
    }

    fn store(&self, client: Box<NbClient>) {
        info!("client cache: storing connection {}", client.describe());

        let evicted = {
            let mut clients = self.clients.lock().unwrap();
            clients.push_front(client);
            if clients.len() > self.max_cachesize {
                clients.pop_back()
            } else {
                None
            }
        };

        if let Some(evicted) = evicted {
            info!(
                "client cache: max cache size reached: closing connection {}",
                evicted.describe()
            );
        }
    }

    fn invalidate_entries(&self, server_address: &Endpoint) {
        info!("client cache: invalidating connections to {}", server_address);

        let invalidated: Vec<Box<NbClient>> = {
            let mut clients = self.clients.lock().unwrap();
            let mut kept = VecDeque::new();
            let mut dropped = Vec::new();
            while let Some(client) = clients.pop_front() {
                if client.server_address() == server_address {
                    dropped.push(client);
                } else {
                    kept.push_back(client);
                }
            }
            *clients = kept;
            dropped
        };

        for client in invalidated {
            info!(
                "client cache: closing invalidated connection {}",
                client.describe()
            );
        }
    }
}
