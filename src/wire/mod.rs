// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The self-describing textual wire format and its streaming readers and
//! writers.
//!
//! Values are whitespace-delimited tokens; sequences are bracketed
//! (`[ ... ] `), aggregates are braced (`{ ... } `), messages end in a
//! newline. Readers and writers are poll-style state machines: `step()`
//! makes as much synchronous progress as the bound buffer allows and
//! otherwise reports which readiness it is waiting for.

mod composite;
mod identifier;
mod readers;
mod remote_error;
mod writers;

pub use self::composite::{
    enum_from_underlying, ArrayReader, ArrayWriter, EnumReader, EnumWire, MappedReader,
    MappedWriter, Tuple1Reader, Tuple1Writer, Tuple2Reader, Tuple2Writer, Tuple3Reader,
    Tuple3Writer, Tuple4Reader, Tuple4Writer, TupleMapped,
};
pub use self::identifier::Identifier;
pub use self::readers::{
    BeginSequenceReader, Blob, BlobReader, BoolReader, EndSequenceChecker, EofChecker,
    EomChecker, ExpectedChecker, ExpectedReader, IdentifierReader, MessageDrainer,
    OptionReader, SignedReader, SignedWire, StringReader, UnsignedReader, UnsignedWire,
    VecReader, WsSkipper,
};
pub use self::remote_error::RemoteError;
pub use self::writers::{
    begin_sequence_writer, begin_structure_writer, end_sequence_writer,
    end_structure_writer, escape_quoted, EomWriter, ExceptionWriter, OptionWriter,
    SeqWriter, TokenWriter, VecWriter,
};

use crate::buffers::{NbInbuf, NbOutbuf};
use crate::fail::Fail;

//==============================================================================
// Execution Model
//==============================================================================

/// The buffer readiness a suspended machine is waiting for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Wants {
    pub read: bool,
    pub write: bool,
}

/// Associate functions for [Wants].
impl Wants {
    pub const READ: Wants = Wants {
        read: true,
        write: false,
    };
    pub const WRITE: Wants = Wants {
        read: false,
        write: true,
    };

    pub fn union(self, other: Wants) -> Wants {
        Wants {
            read: self.read || other.read,
            write: self.write || other.write,
        }
    }
}

/// Outcome of stepping a machine: a final value, or a suspension recording
/// the readiness to wait for.
#[derive(Debug)]
pub enum Status<T> {
    Done(T),
    Suspended(Wants),
}

/// One deserialization state machine. A machine delivers exactly one
/// outcome: a `Done` value or an error.
pub trait ReadMachine {
    type Output;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<Self::Output>, Fail>;
}

/// One serialization state machine.
pub trait WriteMachine {
    fn step(&mut self, buf: &mut NbOutbuf) -> Result<Status<()>, Fail>;
}

/// Types that can be read off the wire.
pub trait WireRead: Sized {
    type Reader: ReadMachine<Output = Self> + Default;
}

/// Types that can be written to the wire.
pub trait WireWrite: Sized {
    type Writer: WriteMachine;

    fn writer(self) -> Self::Writer;
}

//==============================================================================
// Character Classes
//==============================================================================

/// Inter-token whitespace: space, tab, carriage return. Newline is not
/// whitespace; it delimits messages.
pub fn is_whitespace(c: u8) -> bool {
    c == b' ' || c == b'\t' || c == b'\r'
}

/// Printable rendition of a peeked byte for parse error messages.
pub(crate) fn quoted_byte(c: Option<u8>) -> String {
    match c {
        None => "end of input".to_string(),
        Some(c) if (0x20..0x7f).contains(&c) => format!("'{}'", c as char),
        Some(c) => format!("'\\x{:02x}'", c),
    }
}

/// Translates an unexpected-EOF condition into the buffer's sticky error
/// when there is one, and a parse error otherwise.
pub(crate) fn eof_failure(buf: &NbInbuf, details: &str) -> Fail {
    let status = buf.error_status();
    if !status.is_ok() {
        Fail::Io { status }
    } else {
        Fail::parse(details.to_string())
    }
}
