// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::buffers::{NbInbuf, NbOutbuf};
use crate::fail::Fail;
use crate::wire::{
    EomChecker, EomWriter, Identifier, MessageDrainer, ReadMachine, Status, TokenWriter,
    Wants, WireWrite, WriteMachine,
};

//==============================================================================
// Constants & Structures
//==============================================================================

enum InputState {
    ReadingReply,
    CheckingEom,
    Draining,
    Done,
}

enum OutputState {
    WritingMethod,
    WritingArgs,
    WritingEom,
    Done,
}

/// Client-side state machine for a single remote procedure call.
///
/// Two branches run concurrently against the same buffer pair: the writer
/// branch sends the method identifier, the request arguments and the
/// end-of-message; the reader branch reads the reply values and the
/// end-of-message, then drains the rest of the reply message. When either
/// branch fails, the first failure is recorded and the peer branch is
/// redirected into its finisher (write-EOM-and-flush, or drain-to-EOM);
/// both branches must complete before the call reports.
pub struct RpcEngine<R: ReadMachine, W: WriteMachine> {
    reader: R,
    eom_checker: EomChecker,
    drainer: MessageDrainer,
    input_state: InputState,

    method_writer: TokenWriter,
    args_writer: W,
    eom_writer: EomWriter,
    output_state: OutputState,

    value: Option<R::Output>,
    first_error: Option<Fail>,
    redirected: bool,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate functions for [RpcEngine].
impl<R: ReadMachine, W: WriteMachine> RpcEngine<R, W> {
    pub fn new(method: Identifier, reader: R, args_writer: W) -> Self {
        Self {
            reader,
            eom_checker: EomChecker::default(),
            drainer: MessageDrainer::default(),
            input_state: InputState::ReadingReply,
            method_writer: method.writer(),
            args_writer,
            eom_writer: EomWriter::new(),
            output_state: OutputState::WritingMethod,
            value: None,
            first_error: None,
            redirected: false,
        }
    }

    /// Drives both branches as far as the buffers allow.
    pub fn step(
        &mut self,
        inbuf: &mut NbInbuf,
        outbuf: &mut NbOutbuf,
    ) -> Result<Status<R::Output>, Fail> {
        loop {
            let out_wants = self.step_output(outbuf);
            let in_wants = self.step_input(inbuf);

            if out_wants.is_none() && in_wants.is_none() {
                return self.finish(inbuf, outbuf);
            }

            // A branch failure redirects its peer mid-pass; give the
            // redirected branch a chance to progress before suspending.
            if self.redirected {
                self.redirected = false;
                continue;
            }

            let mut wants = Wants {
                read: false,
                write: false,
            };
            if let Some(w) = out_wants {
                wants = wants.union(w);
            }
            if let Some(w) = in_wants {
                wants = wants.union(w);
            }
            return Ok(Status::Suspended(wants));
        }
    }

    fn step_output(&mut self, outbuf: &mut NbOutbuf) -> Option<Wants> {
        loop {
            match self.output_state {
                OutputState::WritingMethod => match self.method_writer.step(outbuf) {
                    Ok(Status::Suspended(wants)) => return Some(wants),
                    Ok(Status::Done(())) => {
                        self.output_state = OutputState::WritingArgs;
                    }
                    Err(e) => self.record_output_error(e),
                },
                OutputState::WritingArgs => match self.args_writer.step(outbuf) {
                    Ok(Status::Suspended(wants)) => return Some(wants),
                    Ok(Status::Done(())) => {
                        self.output_state = OutputState::WritingEom;
                    }
                    Err(e) => self.record_output_error(e),
                },
                OutputState::WritingEom => match self.eom_writer.step(outbuf) {
                    Ok(Status::Suspended(wants)) => return Some(wants),
                    Ok(Status::Done(())) => {
                        self.output_state = OutputState::Done;
                    }
                    Err(e) => {
                        if self.first_error.is_none() {
                            self.first_error = Some(e);
                        }
                        self.output_state = OutputState::Done;
                    }
                },
                OutputState::Done => return None,
            }
        }
    }

    fn step_input(&mut self, inbuf: &mut NbInbuf) -> Option<Wants> {
        loop {
            match self.input_state {
                InputState::ReadingReply => match self.reader.step(inbuf) {
                    Ok(Status::Suspended(wants)) => return Some(wants),
                    Ok(Status::Done(value)) => {
                        self.value = Some(value);
                        self.input_state = InputState::CheckingEom;
                    }
                    Err(e) => self.record_input_error(e),
                },
                InputState::CheckingEom => match self.eom_checker.step(inbuf) {
                    Ok(Status::Suspended(wants)) => return Some(wants),
                    Ok(Status::Done(())) => {
                        self.input_state = InputState::Draining;
                    }
                    Err(e) => self.record_input_error(e),
                },
                InputState::Draining => match self.drainer.step(inbuf) {
                    Ok(Status::Suspended(wants)) => return Some(wants),
                    Ok(Status::Done(())) => {
                        self.input_state = InputState::Done;
                    }
                    Err(e) => {
                        if self.first_error.is_none() {
                            self.first_error = Some(e);
                        }
                        self.input_state = InputState::Done;
                    }
                },
                InputState::Done => return None,
            }
        }
    }

    fn record_output_error(&mut self, e: Fail) {
        if self.first_error.is_none() {
            self.first_error = Some(e);
        }
        self.output_state = OutputState::WritingEom;
        match self.input_state {
            InputState::ReadingReply | InputState::CheckingEom => {
                self.input_state = InputState::Draining;
                self.redirected = true;
            }
            _ => {}
        }
    }

    fn record_input_error(&mut self, e: Fail) {
        if self.first_error.is_none() {
            self.first_error = Some(e);
        }
        self.input_state = InputState::Draining;
        match self.output_state {
            OutputState::WritingMethod | OutputState::WritingArgs => {
                self.output_state = OutputState::WritingEom;
                self.redirected = true;
            }
            _ => {}
        }
    }

    fn finish(
        &mut self,
        inbuf: &NbInbuf,
        outbuf: &NbOutbuf,
    ) -> Result<Status<R::Output>, Fail> {
        let status = outbuf.error_status();
        if !status.is_ok() {
            return Err(Fail::Io { status });
        }
        let status = inbuf.error_status();
        if !status.is_ok() {
            return Err(Fail::Io { status });
        }
        if let Some(e) = self.first_error.take() {
            return Err(e);
        }
        Ok(Status::Done(self.value.take().expect("reply value")))
    }
}
