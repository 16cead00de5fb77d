// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::buffers::{NbInbuf, NbOutbuf};
use crate::fail::Fail;
use crate::logging::LoggingContext;
use crate::rpc::method::{Method, MethodMap};
use crate::wire::{
    EomChecker, EomWriter, ExceptionWriter, Identifier, IdentifierReader, MessageDrainer,
    ReadMachine, RemoteError, Status, WriteMachine,
};

use std::sync::Arc;

//==============================================================================
// Constants & Structures
//==============================================================================

enum HandlerState {
    ReadMethod(IdentifierReader),
    Running(Box<dyn Method>),
    CheckEom(EomChecker),
    WriteError(ExceptionWriter),
    WriteEom(EomWriter),
    Drain(MessageDrainer),
    Done,
}

/// Server-side state machine for a single request: read the method name,
/// route to a handler, drive it, check the end-of-message, and produce a
/// reply (value or inline remote error). Any failure is converted into a
/// structured remote error so the session can continue; the request is
/// always drained up to and including its newline so the connection stays
/// aligned even after a partial parse.
pub struct RequestHandler {
    map: Arc<MethodMap>,
    ctx: LoggingContext,
    state: HandlerState,
    method_name: Option<Identifier>,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate functions for [RequestHandler].
impl RequestHandler {
    pub fn new(map: Arc<MethodMap>, ctx: LoggingContext) -> Self {
        Self {
            map,
            ctx,
            state: HandlerState::ReadMethod(IdentifierReader::default()),
            method_name: None,
        }
    }

    pub fn step(
        &mut self,
        inbuf: &mut NbInbuf,
        outbuf: &mut NbOutbuf,
    ) -> Result<Status<()>, Fail> {
        loop {
            let state = std::mem::replace(&mut self.state, HandlerState::Done);
            match state {
                HandlerState::ReadMethod(mut reader) => match reader.step(inbuf) {
                    Ok(Status::Suspended(wants)) => {
                        self.state = HandlerState::ReadMethod(reader);
                        return Ok(Status::Suspended(wants));
                    }
                    Ok(Status::Done(name)) => {
                        info!("{}: starting method '{}'", self.ctx, name);
                        let method = self.map.create(&name);
                        self.method_name = Some(name);
                        match method {
                            Some(method) => {
                                self.state = HandlerState::Running(method);
                            }
                            None => {
                                self.state = self.report_failure(
                                    "bad_request",
                                    &Fail::parse("method not found"),
                                );
                            }
                        }
                    }
                    Err(e) => {
                        self.state = self.report_failure("bad_request", &e);
                    }
                },
                HandlerState::Running(mut method) => {
                    match method.step(&self.ctx, inbuf, outbuf) {
                        Ok(Status::Suspended(wants)) => {
                            self.state = HandlerState::Running(method);
                            return Ok(Status::Suspended(wants));
                        }
                        Ok(Status::Done(())) => {
                            info!(
                                "{}: method '{}' succeeded",
                                self.ctx,
                                self.method_name.as_ref().expect("method name")
                            );
                            self.state = HandlerState::CheckEom(EomChecker::default());
                        }
                        Err(e) => {
                            self.state = self.report_failure("method_failed", &e);
                        }
                    }
                }
                HandlerState::CheckEom(mut checker) => match checker.step(inbuf) {
                    Ok(Status::Suspended(wants)) => {
                        self.state = HandlerState::CheckEom(checker);
                        return Ok(Status::Suspended(wants));
                    }
                    Ok(Status::Done(())) => {
                        self.state = HandlerState::WriteEom(EomWriter::new());
                    }
                    Err(e) => {
                        self.state = self.report_failure("bad_request", &e);
                    }
                },
                HandlerState::WriteError(mut writer) => match writer.step(outbuf)? {
                    Status::Suspended(wants) => {
                        self.state = HandlerState::WriteError(writer);
                        return Ok(Status::Suspended(wants));
                    }
                    Status::Done(()) => {
                        self.state = HandlerState::WriteEom(EomWriter::new());
                    }
                },
                HandlerState::WriteEom(mut writer) => match writer.step(outbuf)? {
                    Status::Suspended(wants) => {
                        self.state = HandlerState::WriteEom(writer);
                        return Ok(Status::Suspended(wants));
                    }
                    Status::Done(()) => {
                        self.state = HandlerState::Drain(MessageDrainer::default());
                    }
                },
                HandlerState::Drain(mut drainer) => match drainer.step(inbuf)? {
                    Status::Suspended(wants) => {
                        self.state = HandlerState::Drain(drainer);
                        return Ok(Status::Suspended(wants));
                    }
                    Status::Done(()) => {
                        self.state = HandlerState::Done;
                        return Ok(Status::Done(()));
                    }
                },
                HandlerState::Done => return Ok(Status::Done(())),
            }
        }
    }

    /// Converts a failure into the remote error that is written in lieu of
    /// the reply that was not fully written.
    fn report_failure(&self, tag: &str, failure: &Fail) -> HandlerState {
        let mut description = String::new();
        if let Some(name) = &self.method_name {
            description.push_str(name.as_str());
            description.push_str(": ");
        }
        description.push_str(&failure.to_string());

        let error = RemoteError::new(
            Identifier::new(tag).expect("valid error tag"),
            description,
        );
        error!("{}: reporting error: {}", self.ctx, error);
        HandlerState::WriteError(ExceptionWriter::new(error))
    }
}
