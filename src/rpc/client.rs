// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::buffers::ThroughputSettings;
use crate::fail::Fail;
use crate::logging::LoggingContext;
use crate::net::Endpoint;
use crate::rpc::cache::{ClientCache, NbClient};
use crate::rpc::engine::RpcEngine;
use crate::rpc::lists::{ArgListRead, ArgListWrite};
use crate::scheduler::{Scheduler, SelectorFactory};
use crate::wire::{Identifier, Status};

//==============================================================================
// RPC Client
//==============================================================================

/// Client facade for issuing remote calls to one server. Connections come
/// from a shared cache; a successfully completed call returns its
/// connection for reuse, any failure invalidates the address.
pub struct RpcClient<'a> {
    cache: &'a dyn ClientCache,
    server_address: Endpoint,
    settings: ThroughputSettings,
    scheduler: Scheduler,
    ctx: LoggingContext,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate functions for [RpcClient].
impl<'a> RpcClient<'a> {
    pub fn new(
        cache: &'a dyn ClientCache,
        server_address: Endpoint,
        settings: ThroughputSettings,
        selector: SelectorFactory,
    ) -> Self {
        assert!(!server_address.is_empty());
        let ctx = LoggingContext::new(format!("rpc client to {}", server_address));
        Self {
            cache,
            server_address,
            settings,
            scheduler: Scheduler::new(selector),
            ctx,
        }
    }

    /// Performs one full remote call: sends `method` with `args`, returns
    /// the decoded reply values. A remote error reported by the server
    /// surfaces as `Fail::Remote`.
    pub fn call<I, O>(&mut self, method: Identifier, args: O) -> Result<I, Fail>
    where
        I: ArgListRead,
        O: ArgListWrite,
    {
        let mut client = self.cache.obtain(&self.server_address)?;
        let result = self.run_call::<I, O>(&mut client, method, args);
        match result {
            Ok(value) => {
                self.cache.store(client);
                Ok(value)
            }
            Err(e) => {
                info!("{}: closing connection after error: {}", self.ctx, e);
                self.cache.invalidate_entries(&self.server_address);
                Err(e)
            }
        }
    }

    fn run_call<I, O>(
        &mut self,
        client: &mut NbClient,
        method: Identifier,
        args: O,
    ) -> Result<I, Fail>
    where
        I: ArgListRead,
        O: ArgListWrite,
    {
        let settings = self.settings;
        let scheduler = &mut self.scheduler;
        let (inbuf, outbuf) = client.buffers();

        inbuf.enable_throughput_checking(settings);
        outbuf.enable_throughput_checking(settings);

        let mut engine = RpcEngine::new(method, I::Reader::default(), args.list_writer());
        let result = loop {
            match engine.step(inbuf, outbuf) {
                Err(e) => break Err(e),
                Ok(Status::Done(value)) => break Ok(value),
                Ok(Status::Suspended(wants)) => {
                    if wants.read {
                        inbuf.call_when_readable(scheduler);
                    }
                    if wants.write {
                        outbuf.call_when_writable(scheduler);
                    }
                    loop {
                        let ticket = scheduler.wait();
                        if inbuf.on_event(scheduler, ticket) {
                            break;
                        }
                        if outbuf.on_event(scheduler, ticket) {
                            break;
                        }
                    }
                }
            }
        };

        inbuf.cancel_when_readable(scheduler);
        outbuf.cancel_when_writable(scheduler);
        inbuf.disable_throughput_checking(scheduler);
        outbuf.disable_throughput_checking(scheduler);

        result
    }
}
