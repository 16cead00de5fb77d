// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Socket facade: endpoints and address resolution, non-blocking TCP
//! sockets, and the self-pipe used to interrupt schedulers.

mod endpoint;
mod pipe;
mod socket;

pub use self::endpoint::{
    all_interfaces, local_interfaces, resolve_host, resolve_ip, AddressFamily, Endpoint,
};
pub use self::pipe::EventPipe;
pub use self::socket::{TcpAcceptor, TcpConnection};
