// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Built-in method handlers: `add`, `subtract` and the streaming `echo`.

use crate::buffers::{NbInbuf, NbOutbuf};
use crate::fail::Fail;
use crate::logging::LoggingContext;
use crate::rpc::Method;
use crate::wire::{
    begin_sequence_writer, end_sequence_writer, BeginSequenceReader, EndSequenceChecker,
    ReadMachine, SignedReader, Status, StringReader, TokenWriter, WireWrite, WriteMachine,
};

//==============================================================================
// Add
//==============================================================================

enum AddState {
    ReadFirst(SignedReader<i32>),
    ReadSecond(SignedReader<i32>),
    WriteSum(TokenWriter),
}

/// Adds two 32-bit integers; overflow fails the method.
pub struct AddHandler {
    state: AddState,
    first: i32,
}

/// Associate functions for [AddHandler].
impl AddHandler {
    pub fn new() -> Self {
        Self {
            state: AddState::ReadFirst(SignedReader::default()),
            first: 0,
        }
    }
}

impl Default for AddHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Method for AddHandler {
    fn step(
        &mut self,
        ctx: &LoggingContext,
        inbuf: &mut NbInbuf,
        outbuf: &mut NbOutbuf,
    ) -> Result<Status<()>, Fail> {
        loop {
            match &mut self.state {
                AddState::ReadFirst(reader) => match reader.step(inbuf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(arg) => {
                        debug!("{}: add: first arg: {}", ctx, arg);
                        self.first = arg;
                        self.state = AddState::ReadSecond(SignedReader::default());
                    }
                },
                AddState::ReadSecond(reader) => match reader.step(inbuf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(arg) => {
                        debug!("{}: add: second arg: {}", ctx, arg);
                        if self.first >= 0 {
                            if arg > i32::max_value() - self.first {
                                return Err(Fail::method("addition overflow"));
                            }
                        } else if arg < i32::min_value() - self.first {
                            return Err(Fail::method("addition underflow"));
                        }
                        self.state = AddState::WriteSum((self.first + arg).writer());
                    }
                },
                AddState::WriteSum(writer) => match writer.step(outbuf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => return Ok(Status::Done(())),
                },
            }
        }
    }
}

//==============================================================================
// Subtract
//==============================================================================

enum SubtractState {
    ReadFirst(SignedReader<i32>),
    ReadSecond(SignedReader<i32>),
    WriteDifference(TokenWriter),
}

/// Subtracts two 32-bit integers; underflow and overflow fail the method.
pub struct SubtractHandler {
    state: SubtractState,
    first: i32,
}

/// Associate functions for [SubtractHandler].
impl SubtractHandler {
    pub fn new() -> Self {
        Self {
            state: SubtractState::ReadFirst(SignedReader::default()),
            first: 0,
        }
    }
}

impl Default for SubtractHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Method for SubtractHandler {
    fn step(
        &mut self,
        ctx: &LoggingContext,
        inbuf: &mut NbInbuf,
        outbuf: &mut NbOutbuf,
    ) -> Result<Status<()>, Fail> {
        loop {
            match &mut self.state {
                SubtractState::ReadFirst(reader) => match reader.step(inbuf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(arg) => {
                        debug!("{}: subtract: first arg: {}", ctx, arg);
                        self.first = arg;
                        self.state = SubtractState::ReadSecond(SignedReader::default());
                    }
                },
                SubtractState::ReadSecond(reader) => match reader.step(inbuf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(arg) => {
                        debug!("{}: subtract: second arg: {}", ctx, arg);
                        if arg >= 0 {
                            if self.first < i32::min_value() + arg {
                                return Err(Fail::method("subtraction underflow"));
                            }
                        } else if self.first > i32::max_value() + arg {
                            return Err(Fail::method("subtraction overflow"));
                        }
                        self.state =
                            SubtractState::WriteDifference((self.first - arg).writer());
                    }
                },
                SubtractState::WriteDifference(writer) => match writer.step(outbuf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => return Ok(Status::Done(())),
                },
            }
        }
    }
}

//==============================================================================
// Echo
//==============================================================================

enum EchoState {
    ReadBegin(BeginSequenceReader),
    WriteBegin(TokenWriter),
    CheckEnd(EndSequenceChecker),
    ReadElement(StringReader),
    WriteElement(TokenWriter),
    WriteEnd(TokenWriter),
}

/// Streams a sequence of strings back to the caller, element by element.
/// An optional censored word fails the method when it appears.
pub struct EchoHandler {
    state: EchoState,
    censored: Option<String>,
}

/// Associate functions for [EchoHandler].
impl EchoHandler {
    pub fn new() -> Self {
        Self::with_censor(None)
    }

    pub fn with_censor(censored: Option<String>) -> Self {
        Self {
            state: EchoState::ReadBegin(BeginSequenceReader::default()),
            censored,
        }
    }
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Method for EchoHandler {
    fn step(
        &mut self,
        ctx: &LoggingContext,
        inbuf: &mut NbInbuf,
        outbuf: &mut NbOutbuf,
    ) -> Result<Status<()>, Fail> {
        loop {
            match &mut self.state {
                EchoState::ReadBegin(reader) => match reader.step(inbuf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => {
                        self.state = EchoState::WriteBegin(begin_sequence_writer());
                    }
                },
                EchoState::WriteBegin(writer) => match writer.step(outbuf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => {
                        self.state = EchoState::CheckEnd(EndSequenceChecker::default());
                    }
                },
                EchoState::CheckEnd(checker) => match checker.step(inbuf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(true) => {
                        self.state = EchoState::WriteEnd(end_sequence_writer());
                    }
                    Status::Done(false) => {
                        self.state = EchoState::ReadElement(StringReader::default());
                    }
                },
                EchoState::ReadElement(reader) => match reader.step(inbuf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(element) => {
                        debug!("{}: echo: element: {:?}", ctx, element);
                        if self.censored.as_ref() == Some(&element) {
                            return Err(Fail::method(format!(
                                "censored word '{}'",
                                element
                            )));
                        }
                        self.state = EchoState::WriteElement(element.writer());
                    }
                },
                EchoState::WriteElement(writer) => match writer.step(outbuf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => {
                        self.state = EchoState::CheckEnd(EndSequenceChecker::default());
                    }
                },
                EchoState::WriteEnd(writer) => match writer.step(outbuf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => return Ok(Status::Done(())),
                },
            }
        }
    }
}
