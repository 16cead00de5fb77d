// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Argument lists for remote calls. The statically typed surface is a
//! tuple whose elements travel in order, bare (no surrounding braces);
//! `BoxedInputs`/`BoxedOutputs` provide the runtime-assembled equivalent.

use crate::buffers::{NbInbuf, NbOutbuf};
use crate::fail::Fail;
use crate::wire::{ReadMachine, Status, WireRead, WireWrite, WriteMachine};

//==============================================================================
// Argument List Traits
//==============================================================================

/// A tuple of reply values read off the wire in order.
pub trait ArgListRead: Sized {
    type Reader: ReadMachine<Output = Self> + Default;
}

/// A tuple of request arguments written to the wire in order.
pub trait ArgListWrite {
    type Writer: WriteMachine;

    fn list_writer(self) -> Self::Writer;
}

//==============================================================================
// Empty List
//==============================================================================

/// Reads nothing.
#[derive(Default)]
pub struct NoArgsReader {}

impl ReadMachine for NoArgsReader {
    type Output = ();

    fn step(&mut self, _buf: &mut NbInbuf) -> Result<Status<()>, Fail> {
        Ok(Status::Done(()))
    }
}

/// Writes nothing.
#[derive(Default)]
pub struct NoArgsWriter {}

impl WriteMachine for NoArgsWriter {
    fn step(&mut self, _buf: &mut NbOutbuf) -> Result<Status<()>, Fail> {
        Ok(Status::Done(()))
    }
}

impl ArgListRead for () {
    type Reader = NoArgsReader;
}

impl ArgListWrite for () {
    type Writer = NoArgsWriter;

    fn list_writer(self) -> NoArgsWriter {
        NoArgsWriter::default()
    }
}

//==============================================================================
// Tuple Lists
//==============================================================================

macro_rules! arg_list {
    ($reader:ident, $writer:ident,
     $(($idx:tt, $T:ident, $r:ident, $w:ident, $v:ident)),+) => {
        /// Reads the list's elements in order.
        pub struct $reader<$($T: WireRead),+> {
            state: usize,
            $($r: $T::Reader,)+
            $($v: Option<$T>,)+
        }

        impl<$($T: WireRead),+> Default for $reader<$($T),+> {
            fn default() -> Self {
                Self {
                    state: 0,
                    $($r: $T::Reader::default(),)+
                    $($v: None,)+
                }
            }
        }

        impl<$($T: WireRead),+> ReadMachine for $reader<$($T),+> {
            type Output = ($($T,)+);

            fn step(
                &mut self,
                buf: &mut NbInbuf,
            ) -> Result<Status<Self::Output>, Fail> {
                loop {
                    $(
                        if self.state == $idx {
                            match self.$r.step(buf)? {
                                Status::Suspended(wants) => {
                                    return Ok(Status::Suspended(wants))
                                }
                                Status::Done(value) => {
                                    self.$v = Some(value);
                                    self.state += 1;
                                }
                            }
                            continue;
                        }
                    )+
                    return Ok(Status::Done((
                        $(self.$v.take().expect("list element read"),)+
                    )));
                }
            }
        }

        /// Writes the list's elements in order.
        pub struct $writer<$($T: WireWrite),+> {
            state: usize,
            $($w: $T::Writer,)+
        }

        impl<$($T: WireWrite),+> WriteMachine for $writer<$($T),+> {
            fn step(&mut self, buf: &mut NbOutbuf) -> Result<Status<()>, Fail> {
                loop {
                    $(
                        if self.state == $idx {
                            match self.$w.step(buf)? {
                                Status::Suspended(wants) => {
                                    return Ok(Status::Suspended(wants))
                                }
                                Status::Done(()) => self.state += 1,
                            }
                            continue;
                        }
                    )+
                    return Ok(Status::Done(()));
                }
            }
        }

        impl<$($T: WireRead),+> ArgListRead for ($($T,)+) {
            type Reader = $reader<$($T),+>;
        }

        impl<$($T: WireWrite),+> ArgListWrite for ($($T,)+) {
            type Writer = $writer<$($T),+>;

            fn list_writer(self) -> Self::Writer {
                let ($($v,)+) = self;
                $writer {
                    state: 0,
                    $($w: $v.writer(),)+
                }
            }
        }
    };
}

arg_list!(ArgList1Reader, ArgList1Writer, (0, A, r0, w0, v0));
arg_list!(
    ArgList2Reader,
    ArgList2Writer,
    (0, A, r0, w0, v0),
    (1, B, r1, w1, v1)
);
arg_list!(
    ArgList3Reader,
    ArgList3Writer,
    (0, A, r0, w0, v0),
    (1, B, r1, w1, v1),
    (2, C, r2, w2, v2)
);
arg_list!(
    ArgList4Reader,
    ArgList4Writer,
    (0, A, r0, w0, v0),
    (1, B, r1, w1, v1),
    (2, C, r2, w2, v2),
    (3, D, r3, w3, v3)
);

//==============================================================================
// Boxed Lists
//==============================================================================

trait ErasedRead: Send {
    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<()>, Fail>;
}

struct ErasedInput<T: WireRead, F: FnMut(T)> {
    reader: T::Reader,
    sink: F,
}

impl<T: WireRead, F: FnMut(T) + Send> ErasedRead for ErasedInput<T, F>
where
    T::Reader: Send,
{
    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<()>, Fail> {
        match self.reader.step(buf)? {
            Status::Suspended(wants) => Ok(Status::Suspended(wants)),
            Status::Done(value) => {
                (self.sink)(value);
                Ok(Status::Done(()))
            }
        }
    }
}

/// A runtime-assembled list of typed reply sinks.
#[derive(Default)]
pub struct BoxedInputs {
    items: Vec<Box<dyn ErasedRead>>,
    index: usize,
}

/// Associate functions for [BoxedInputs].
impl BoxedInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sink receiving the next reply value of type `T`.
    pub fn push<T, F>(&mut self, sink: F)
    where
        T: WireRead + 'static,
        T::Reader: Send,
        F: FnMut(T) + Send + 'static,
    {
        self.items.push(Box::new(ErasedInput {
            reader: T::Reader::default(),
            sink,
        }));
    }
}

impl ReadMachine for BoxedInputs {
    type Output = ();

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<()>, Fail> {
        while self.index < self.items.len() {
            match self.items[self.index].step(buf)? {
                Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                Status::Done(()) => self.index += 1,
            }
        }
        Ok(Status::Done(()))
    }
}

/// A runtime-assembled list of request argument writers.
#[derive(Default)]
pub struct BoxedOutputs {
    items: Vec<Box<dyn WriteMachine + Send>>,
    index: usize,
}

/// Associate functions for [BoxedOutputs].
impl BoxedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next request argument.
    pub fn push<T>(&mut self, value: T)
    where
        T: WireWrite,
        T::Writer: Send + 'static,
    {
        self.items.push(Box::new(value.writer()));
    }
}

impl WriteMachine for BoxedOutputs {
    fn step(&mut self, buf: &mut NbOutbuf) -> Result<Status<()>, Fail> {
        while self.index < self.items.len() {
            match self.items[self.index].step(buf)? {
                Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                Status::Done(()) => self.index += 1,
            }
        }
        Ok(Status::Done(()))
    }
}
