// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! wireline: an RPC serving and streaming framework over a line-oriented
//! textual wire protocol.
//!
//! The crate is built on a hand-rolled non-blocking I/O substrate: a
//! per-thread reactor ([scheduler]), buffered non-blocking sources and
//! sinks with throughput enforcement ([buffers]), poll-style serialization
//! state machines ([wire]), a request/reply engine and dispatcher ([rpc],
//! [dispatcher]), and a socket facade ([net]). There is no async runtime;
//! suspension and resumption are explicit.

#[macro_use]
extern crate log;

pub mod buffers;
pub mod dispatcher;
pub mod fail;
pub mod handlers;
pub mod logging;
pub mod net;
pub mod rpc;
pub mod scheduler;
pub mod sync;
pub mod wire;

pub use crate::buffers::{NbInbuf, NbOutbuf, ThroughputSettings};
pub use crate::dispatcher::{Dispatcher, DispatcherConfig, DispatcherControl};
pub use crate::fail::{ErrorStatus, Fail};
pub use crate::logging::{init_logging, LoggingContext};
pub use crate::net::Endpoint;
pub use crate::rpc::{MethodMap, RpcClient, SimpleClientCache};
pub use crate::scheduler::{Scheduler, SelectorFactory};
pub use crate::wire::{Identifier, RemoteError};
