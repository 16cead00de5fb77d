// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Structurally generated readers and writers for aggregates: tuples,
//! arrays, enumerations, and user types mapped onto tuples.

use crate::buffers::{NbInbuf, NbOutbuf};
use crate::fail::Fail;
use crate::wire::readers::ExpectedReader;
use crate::wire::writers::{begin_structure_writer, end_structure_writer, TokenWriter};
use crate::wire::{ReadMachine, Status, WireRead, WireWrite, WriteMachine};

use std::convert::TryInto;

type BeginStructReader = ExpectedReader<{ b'{' }>;
type EndStructReader = ExpectedReader<{ b'}' }>;

//==============================================================================
// Tuples
//==============================================================================

macro_rules! tuple_wire {
    ($reader:ident, $writer:ident, $len:tt,
     $(($idx:tt, $T:ident, $r:ident, $w:ident, $v:ident)),+) => {
        /// Reads a braced aggregate with the tuple's elements in
        /// declaration order.
        pub struct $reader<$($T: WireRead),+> {
            state: usize,
            open: BeginStructReader,
            close: EndStructReader,
            $($r: $T::Reader,)+
            $($v: Option<$T>,)+
        }

        impl<$($T: WireRead),+> Default for $reader<$($T),+> {
            fn default() -> Self {
                Self {
                    state: 0,
                    open: BeginStructReader::default(),
                    close: EndStructReader::default(),
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
                    if self.state == 0 {
                        match self.open.step(buf)? {
                            Status::Suspended(wants) => {
                                return Ok(Status::Suspended(wants))
                            }
                            Status::Done(()) => self.state = 1,
                        }
                        continue;
                    }
                    $(
                        if self.state == $idx + 1 {
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
                    match self.close.step(buf)? {
                        Status::Suspended(wants) => {
                            return Ok(Status::Suspended(wants))
                        }
                        Status::Done(()) => {
                            return Ok(Status::Done((
                                $(self.$v.take().expect("tuple element read"),)+
                            )));
                        }
                    }
                }
            }
        }

        /// Writes a braced aggregate with the tuple's elements in
        /// declaration order.
        pub struct $writer<$($T: WireWrite),+> {
            state: usize,
            open: TokenWriter,
            close: TokenWriter,
            $($w: $T::Writer,)+
        }

        impl<$($T: WireWrite),+> WriteMachine for $writer<$($T),+> {
            fn step(&mut self, buf: &mut NbOutbuf) -> Result<Status<()>, Fail> {
                loop {
                    if self.state == 0 {
                        match self.open.step(buf)? {
                            Status::Suspended(wants) => {
                                return Ok(Status::Suspended(wants))
                            }
                            Status::Done(()) => self.state = 1,
                        }
                        continue;
                    }
                    $(
                        if self.state == $idx + 1 {
                            match self.$w.step(buf)? {
                                Status::Suspended(wants) => {
                                    return Ok(Status::Suspended(wants))
                                }
                                Status::Done(()) => self.state += 1,
                            }
                            continue;
                        }
                    )+
                    return self.close.step(buf);
                }
            }
        }

        impl<$($T: WireRead),+> WireRead for ($($T,)+) {
            type Reader = $reader<$($T),+>;
        }

        impl<$($T: WireWrite),+> WireWrite for ($($T,)+) {
            type Writer = $writer<$($T),+>;

            fn writer(self) -> Self::Writer {
                let ($($v,)+) = self;
                $writer {
                    state: 0,
                    open: begin_structure_writer(),
                    close: end_structure_writer(),
                    $($w: $v.writer(),)+
                }
            }
        }
    };
}

tuple_wire!(Tuple1Reader, Tuple1Writer, 1, (0, A, r0, w0, v0));
tuple_wire!(
    Tuple2Reader,
    Tuple2Writer,
    2,
    (0, A, r0, w0, v0),
    (1, B, r1, w1, v1)
);
tuple_wire!(
    Tuple3Reader,
    Tuple3Writer,
    3,
    (0, A, r0, w0, v0),
    (1, B, r1, w1, v1),
    (2, C, r2, w2, v2)
);
tuple_wire!(
    Tuple4Reader,
    Tuple4Writer,
    4,
    (0, A, r0, w0, v0),
    (1, B, r1, w1, v1),
    (2, C, r2, w2, v2),
    (3, D, r3, w3, v3)
);

//==============================================================================
// Arrays
//==============================================================================

enum ArrayPhase {
    Open,
    Element,
    Close,
}

/// Reads a braced aggregate of exactly `N` elements.
pub struct ArrayReader<T: WireRead, const N: usize> {
    phase: ArrayPhase,
    open: BeginStructReader,
    close: EndStructReader,
    element: T::Reader,
    items: Vec<T>,
}

impl<T: WireRead, const N: usize> Default for ArrayReader<T, N> {
    fn default() -> Self {
        Self {
            phase: ArrayPhase::Open,
            open: BeginStructReader::default(),
            close: EndStructReader::default(),
            element: T::Reader::default(),
            items: Vec::with_capacity(N),
        }
    }
}

impl<T: WireRead, const N: usize> ReadMachine for ArrayReader<T, N> {
    type Output = [T; N];

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<[T; N]>, Fail> {
        loop {
            match self.phase {
                ArrayPhase::Open => match self.open.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => {
                        self.phase = if N == 0 {
                            ArrayPhase::Close
                        } else {
                            ArrayPhase::Element
                        };
                    }
                },
                ArrayPhase::Element => match self.element.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(item) => {
                        self.items.push(item);
                        self.element = T::Reader::default();
                        if self.items.len() == N {
                            self.phase = ArrayPhase::Close;
                        }
                    }
                },
                ArrayPhase::Close => match self.close.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => {
                        let items = std::mem::replace(&mut self.items, Vec::new());
                        let array: [T; N] =
                            items.try_into().unwrap_or_else(|_| unreachable!());
                        return Ok(Status::Done(array));
                    }
                },
            }
        }
    }
}

/// Writes a braced aggregate of exactly `N` elements.
pub struct ArrayWriter<T: WireWrite, const N: usize> {
    phase: ArrayPhase,
    open: TokenWriter,
    close: TokenWriter,
    items: std::vec::IntoIter<T>,
    current: Option<T::Writer>,
}

impl<T: WireWrite, const N: usize> WriteMachine for ArrayWriter<T, N> {
    fn step(&mut self, buf: &mut NbOutbuf) -> Result<Status<()>, Fail> {
        loop {
            match self.phase {
                ArrayPhase::Open => match self.open.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => self.phase = ArrayPhase::Element,
                },
                ArrayPhase::Element => {
                    if self.current.is_none() {
                        match self.items.next() {
                            Some(item) => self.current = Some(item.writer()),
                            None => {
                                self.phase = ArrayPhase::Close;
                                continue;
                            }
                        }
                    }
                    match self.current.as_mut().expect("current writer").step(buf)? {
                        Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                        Status::Done(()) => self.current = None,
                    }
                }
                ArrayPhase::Close => return self.close.step(buf),
            }
        }
    }
}

impl<T: WireRead, const N: usize> WireRead for [T; N] {
    type Reader = ArrayReader<T, N>;
}

impl<T: WireWrite, const N: usize> WireWrite for [T; N] {
    type Writer = ArrayWriter<T, N>;

    fn writer(self) -> Self::Writer {
        let items: Vec<T> = IntoIterator::into_iter(self).collect();
        ArrayWriter {
            phase: ArrayPhase::Open,
            open: begin_structure_writer(),
            close: end_structure_writer(),
            items: items.into_iter(),
            current: None,
        }
    }
}

//==============================================================================
// Enumerations
//==============================================================================

/// Enumerations travel as their underlying integer type.
pub trait EnumWire: Sized + Copy {
    type Wire: WireRead + WireWrite;

    fn to_wire(self) -> Self::Wire;
    fn from_wire(wire: Self::Wire) -> Result<Self, Fail>;
}

/// Converts a decoded underlying value back into the enumeration,
/// reporting out-of-range values as parse errors.
pub fn enum_from_underlying<T: num_traits::FromPrimitive>(value: i64) -> Result<T, Fail> {
    T::from_i64(value)
        .ok_or_else(|| Fail::parse(format!("enumeration value {} out of range", value)))
}

/// Reads the underlying integer and maps it into the enumeration.
pub struct EnumReader<T: EnumWire> {
    inner: <T::Wire as WireRead>::Reader,
}

impl<T: EnumWire> Default for EnumReader<T> {
    fn default() -> Self {
        Self {
            inner: <T::Wire as WireRead>::Reader::default(),
        }
    }
}

impl<T: EnumWire> ReadMachine for EnumReader<T> {
    type Output = T;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<T>, Fail> {
        match self.inner.step(buf)? {
            Status::Suspended(wants) => Ok(Status::Suspended(wants)),
            Status::Done(wire) => Ok(Status::Done(T::from_wire(wire)?)),
        }
    }
}

/// Generates the wire impls for an enumeration implementing [EnumWire].
#[macro_export]
macro_rules! wire_enum {
    ($t:ty) => {
        impl $crate::wire::WireRead for $t {
            type Reader = $crate::wire::EnumReader<$t>;
        }

        impl $crate::wire::WireWrite for $t {
            type Writer =
                <<$t as $crate::wire::EnumWire>::Wire as $crate::wire::WireWrite>::Writer;

            fn writer(self) -> Self::Writer {
                $crate::wire::WireWrite::writer($crate::wire::EnumWire::to_wire(self))
            }
        }
    };
}

//==============================================================================
// User Types
//==============================================================================

/// User types serialize through a tuple mapping: the type supplies
/// conversions to and from a tuple of wire-capable fields, and the default
/// reader and writer delegate to the tuple's aggregate form.
pub trait TupleMapped: Sized {
    type Tuple: WireRead + WireWrite;

    fn into_tuple(self) -> Self::Tuple;
    fn from_tuple(tuple: Self::Tuple) -> Result<Self, Fail>;
}

/// Reads the mapped tuple and converts it into the user type.
pub struct MappedReader<T: TupleMapped> {
    inner: <T::Tuple as WireRead>::Reader,
}

impl<T: TupleMapped> Default for MappedReader<T> {
    fn default() -> Self {
        Self {
            inner: <T::Tuple as WireRead>::Reader::default(),
        }
    }
}

impl<T: TupleMapped> ReadMachine for MappedReader<T> {
    type Output = T;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<T>, Fail> {
        match self.inner.step(buf)? {
            Status::Suspended(wants) => Ok(Status::Suspended(wants)),
            Status::Done(tuple) => Ok(Status::Done(T::from_tuple(tuple)?)),
        }
    }
}

/// Writes the user type through its mapped tuple.
pub struct MappedWriter<T: TupleMapped> {
    inner: <T::Tuple as WireWrite>::Writer,
}

/// Associate functions for [MappedWriter].
impl<T: TupleMapped> MappedWriter<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: value.into_tuple().writer(),
        }
    }
}

impl<T: TupleMapped> WriteMachine for MappedWriter<T> {
    fn step(&mut self, buf: &mut NbOutbuf) -> Result<Status<()>, Fail> {
        self.inner.step(buf)
    }
}

/// Generates the wire impls for a user type implementing [TupleMapped].
#[macro_export]
macro_rules! wire_mapped {
    ($t:ty) => {
        impl $crate::wire::WireRead for $t {
            type Reader = $crate::wire::MappedReader<$t>;
        }

        impl $crate::wire::WireWrite for $t {
            type Writer = $crate::wire::MappedWriter<$t>;

            fn writer(self) -> Self::Writer {
                $crate::wire::MappedWriter::new(self)
            }
        }
    };
}
