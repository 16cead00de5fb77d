// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Non-blocking buffered I/O: the source/sink abstraction, the input and
//! output buffers with throughput enforcement, and the in-memory and TCP
//! source/sink implementations.

mod inbuf;
mod outbuf;
mod throughput;

pub use self::inbuf::{NbInbuf, DEFAULT_BUFSIZE};
pub use self::outbuf::NbOutbuf;
pub use self::throughput::{ThroughputChecker, ThroughputSettings};

use crate::fail::ErrorStatus;
use crate::net::TcpConnection;
use crate::scheduler::{Scheduler, Ticket};

use std::sync::{Arc, Mutex};
use std::time::Duration;

//==============================================================================
// Source & Sink Traits
//==============================================================================

/// Non-blocking byte source feeding an [NbInbuf].
pub trait NbSource: Send {
    /// Non-blocking read into `buf`. `Ok(None)` means would-block,
    /// `Ok(Some(0))` means EOF.
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, ErrorStatus>;

    /// Schedules a one-shot wakeup for when the source may have data.
    fn call_when_ready(&mut self, scheduler: &mut Scheduler) -> Ticket;

    /// A printable description for log records.
    fn describe(&self) -> String;
}

/// Non-blocking byte sink draining an [NbOutbuf].
pub trait NbSink: Send {
    /// Non-blocking write of a prefix of `buf`. `Ok(None)` means
    /// would-block.
    fn write(&mut self, buf: &[u8]) -> Result<Option<usize>, ErrorStatus>;

    /// Schedules a one-shot wakeup for when the sink may accept data.
    fn call_when_ready(&mut self, scheduler: &mut Scheduler) -> Ticket;

    /// A printable description for log records.
    fn describe(&self) -> String;
}

//==============================================================================
// TCP Source & Sink
//==============================================================================

struct TcpSource {
    conn: Arc<TcpConnection>,
}

impl NbSource for TcpSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, ErrorStatus> {
        self.conn.read(buf)
    }

    fn call_when_ready(&mut self, scheduler: &mut Scheduler) -> Ticket {
        scheduler.call_when_readable(self.conn.fd())
    }

    fn describe(&self) -> String {
        format!("tcp connection to {}", self.conn.peer_endpoint())
    }
}

struct TcpSink {
    conn: Arc<TcpConnection>,
}

impl NbSink for TcpSink {
    fn write(&mut self, buf: &[u8]) -> Result<Option<usize>, ErrorStatus> {
        self.conn.write(buf)
    }

    fn call_when_ready(&mut self, scheduler: &mut Scheduler) -> Ticket {
        scheduler.call_when_writable(self.conn.fd())
    }

    fn describe(&self) -> String {
        format!("tcp connection to {}", self.conn.peer_endpoint())
    }
}

/// Wraps a TCP connection in a buffer pair sharing the underlying socket.
pub fn tcp_buffers(conn: TcpConnection, bufsize: usize) -> (NbInbuf, NbOutbuf) {
    let conn = Arc::new(conn);
    let inbuf = NbInbuf::new(
        Box::new(TcpSource { conn: conn.clone() }),
        bufsize,
    );
    let outbuf = NbOutbuf::new(Box::new(TcpSink { conn }), bufsize);
    (inbuf, outbuf)
}

//==============================================================================
// String Source & Sink
//==============================================================================

/// In-memory source feeding a fixed byte string in `chunk`-sized slices,
/// then EOF. Always ready; waits are satisfied by zero-delay alarms.
pub struct StringSource {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
}

/// Associate functions for [StringSource].
impl StringSource {
    pub fn new<D: Into<Vec<u8>>>(data: D, chunk: usize) -> Self {
        assert!(chunk != 0);
        Self {
            data: data.into(),
            pos: 0,
            chunk,
        }
    }
}

/// Source trait implementation for [StringSource].
impl NbSource for StringSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, ErrorStatus> {
        let remaining = self.data.len() - self.pos;
        let count = self.chunk.min(remaining).min(buf.len());
        buf[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
        self.pos += count;
        Ok(Some(count))
    }

    fn call_when_ready(&mut self, scheduler: &mut Scheduler) -> Ticket {
        scheduler.call_alarm_in(Duration::from_millis(0))
    }

    fn describe(&self) -> String {
        "string source".to_string()
    }
}

/// Shared view of the bytes collected by a [StringSink].
#[derive(Clone)]
pub struct StringSinkHandle {
    data: Arc<Mutex<Vec<u8>>>,
}

/// Associate functions for [StringSinkHandle].
impl StringSinkHandle {
    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }
}

/// In-memory sink accepting at most `chunk` bytes per write. Always ready.
pub struct StringSink {
    data: Arc<Mutex<Vec<u8>>>,
    chunk: usize,
}

/// Associate functions for [StringSink].
impl StringSink {
    pub fn new(chunk: usize) -> (Self, StringSinkHandle) {
        assert!(chunk != 0);
        let data = Arc::new(Mutex::new(Vec::new()));
        let handle = StringSinkHandle { data: data.clone() };
        (Self { data, chunk }, handle)
    }
}

/// Sink trait implementation for [StringSink].
impl NbSink for StringSink {
    fn write(&mut self, buf: &[u8]) -> Result<Option<usize>, ErrorStatus> {
        let count = self.chunk.min(buf.len());
        self.data.lock().unwrap().extend_from_slice(&buf[..count]);
        Ok(Some(count))
    }

    fn call_when_ready(&mut self, scheduler: &mut Scheduler) -> Ticket {
        scheduler.call_alarm_in(Duration::from_millis(0))
    }

    fn describe(&self) -> String {
        "string sink".to_string()
    }
}

/// Creates an input buffer over an in-memory byte string.
pub fn string_inbuf<D: Into<Vec<u8>>>(data: D, chunk: usize) -> NbInbuf {
    NbInbuf::new(Box::new(StringSource::new(data, chunk)), DEFAULT_BUFSIZE)
}

/// Creates an output buffer over an in-memory sink, returning the buffer
/// and a handle for inspecting the collected bytes.
pub fn string_outbuf(chunk: usize, bufsize: usize) -> (NbOutbuf, StringSinkHandle) {
    let (sink, handle) = StringSink::new(chunk);
    (NbOutbuf::new(Box::new(sink), bufsize), handle)
}
