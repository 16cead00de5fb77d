// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The request/reply engine and its surroundings: the client-side call
//! machine, the server-side request handler, the method map, argument
//! lists, the client connection cache and the client facade.

mod cache;
mod client;
mod engine;
mod handler;
mod lists;
mod method;

pub use self::cache::{ClientCache, NbClient, SimpleClientCache};
pub use self::client::RpcClient;
pub use self::engine::RpcEngine;
pub use self::handler::RequestHandler;
pub use self::lists::{ArgListRead, ArgListWrite, BoxedInputs, BoxedOutputs};
pub use self::method::{Method, MethodFactory, MethodMap};
