// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::buffers::NbOutbuf;
use crate::fail::Fail;
use crate::wire::identifier::Identifier;
use crate::wire::readers::{Blob, SignedWire};
use crate::wire::remote_error::RemoteError;
use crate::wire::{MappedWriter, Status, Wants, WireWrite, WriteMachine};

//==============================================================================
// Helpers
//==============================================================================

fn suspend() -> Result<Status<()>, Fail> {
    Ok(Status::Suspended(Wants::WRITE))
}

//==============================================================================
// Token Writer
//==============================================================================

/// Writes a fully rendered token (the token text plus its trailing
/// delimiter) into the output buffer, suspending whenever the buffer is
/// full.
pub struct TokenWriter {
    bytes: Vec<u8>,
    pos: usize,
}

/// Associate functions for [TokenWriter].
impl TokenWriter {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn literal(text: &str) -> Self {
        Self::new(text.as_bytes().to_vec())
    }
}

impl WriteMachine for TokenWriter {
    fn step(&mut self, buf: &mut NbOutbuf) -> Result<Status<()>, Fail> {
        while self.pos < self.bytes.len() {
            if !buf.writable() {
                return suspend();
            }
            self.pos += buf.write(&self.bytes[self.pos..]);
        }
        Ok(Status::Done(()))
    }
}

/// Writes the opening token of a sequence.
pub fn begin_sequence_writer() -> TokenWriter {
    TokenWriter::literal("[ ")
}

/// Writes the closing token of a sequence.
pub fn end_sequence_writer() -> TokenWriter {
    TokenWriter::literal("] ")
}

/// Writes the opening token of an aggregate.
pub fn begin_structure_writer() -> TokenWriter {
    TokenWriter::literal("{ ")
}

/// Writes the closing token of an aggregate.
pub fn end_structure_writer() -> TokenWriter {
    TokenWriter::literal("} ")
}

//==============================================================================
// Primitive Writers
//==============================================================================

impl WireWrite for bool {
    type Writer = TokenWriter;

    fn writer(self) -> TokenWriter {
        TokenWriter::literal(if self { "| " } else { "& " })
    }
}

macro_rules! unsigned_wire_write {
    ($($t:ty),+) => {
        $(
            impl WireWrite for $t {
                type Writer = TokenWriter;

                fn writer(self) -> TokenWriter {
                    TokenWriter::new(format!("{} ", self).into_bytes())
                }
            }
        )+
    };
}

unsigned_wire_write!(u16, u32, u64);

macro_rules! signed_wire_write {
    ($($t:ty),+) => {
        $(
            impl WireWrite for $t {
                type Writer = TokenWriter;

                fn writer(self) -> TokenWriter {
                    // Render via the magnitude to keep the minimum value
                    // exact.
                    let (negative, magnitude) = SignedWire::magnitude(self);
                    let text = if negative {
                        format!("-{} ", magnitude)
                    } else {
                        format!("{} ", magnitude)
                    };
                    TokenWriter::new(text.into_bytes())
                }
            }
        )+
    };
}

signed_wire_write!(i16, i32, i64);

/// Renders the quoted form of a string or blob: leading `"`, escaped
/// contents, trailing `" `.
pub fn escape_quoted(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 4);
    out.push(b'"');
    for &c in bytes {
        match c {
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            c if c < 0x20 || c == 0x7f => {
                out.extend_from_slice(format!("\\x{:02x}", c).as_bytes());
            }
            c => out.push(c),
        }
    }
    out.extend_from_slice(b"\" ");
    out
}

impl WireWrite for String {
    type Writer = TokenWriter;

    fn writer(self) -> TokenWriter {
        TokenWriter::new(escape_quoted(self.as_bytes()))
    }
}

impl WireWrite for Blob {
    type Writer = TokenWriter;

    fn writer(self) -> TokenWriter {
        TokenWriter::new(escape_quoted(&self.0))
    }
}

impl WireWrite for Identifier {
    type Writer = TokenWriter;

    fn writer(self) -> TokenWriter {
        TokenWriter::new(format!("{} ", self).into_bytes())
    }
}

//==============================================================================
// Sequence Writers
//==============================================================================

enum SeqWPhase {
    Open,
    Elements,
    Close,
}

/// Streams a sequence (`[ ... ] `) from an iterator of writable values.
pub struct SeqWriter<I: Iterator>
where
    I::Item: WireWrite,
{
    phase: SeqWPhase,
    open: TokenWriter,
    close: TokenWriter,
    items: I,
    current: Option<<I::Item as WireWrite>::Writer>,
}

/// Associate functions for [SeqWriter].
impl<I: Iterator> SeqWriter<I>
where
    I::Item: WireWrite,
{
    pub fn new(items: I) -> Self {
        Self {
            phase: SeqWPhase::Open,
            open: begin_sequence_writer(),
            close: end_sequence_writer(),
            items,
            current: None,
        }
    }
}

impl<I: Iterator> WriteMachine for SeqWriter<I>
where
    I::Item: WireWrite,
{
    fn step(&mut self, buf: &mut NbOutbuf) -> Result<Status<()>, Fail> {
        loop {
            match self.phase {
                SeqWPhase::Open => match self.open.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => self.phase = SeqWPhase::Elements,
                },
                SeqWPhase::Elements => {
                    if self.current.is_none() {
                        match self.items.next() {
                            Some(item) => self.current = Some(item.writer()),
                            None => {
                                self.phase = SeqWPhase::Close;
                                continue;
                            }
                        }
                    }
                    match self.current.as_mut().unwrap().step(buf)? {
                        Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                        Status::Done(()) => self.current = None,
                    }
                }
                SeqWPhase::Close => match self.close.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => return Ok(Status::Done(())),
                },
            }
        }
    }
}

/// Writer type for vectors.
pub type VecWriter<T> = SeqWriter<std::vec::IntoIter<T>>;

impl<T: WireWrite> WireWrite for Vec<T> {
    type Writer = VecWriter<T>;

    fn writer(self) -> VecWriter<T> {
        SeqWriter::new(self.into_iter())
    }
}

/// Writer type for optional values (a sequence of length zero or one).
pub type OptionWriter<T> = SeqWriter<std::option::IntoIter<T>>;

impl<T: WireWrite> WireWrite for Option<T> {
    type Writer = OptionWriter<T>;

    fn writer(self) -> OptionWriter<T> {
        SeqWriter::new(self.into_iter())
    }
}

//==============================================================================
// Message Framing
//==============================================================================

enum EomPhase {
    Newline,
    Flush,
}

/// Writes the end-of-message newline, then flushes the output buffer to
/// the sink.
pub struct EomWriter {
    phase: EomPhase,
    newline: TokenWriter,
}

/// Associate functions for [EomWriter].
impl EomWriter {
    pub fn new() -> Self {
        Self {
            phase: EomPhase::Newline,
            newline: TokenWriter::literal("\n"),
        }
    }
}

impl Default for EomWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteMachine for EomWriter {
    fn step(&mut self, buf: &mut NbOutbuf) -> Result<Status<()>, Fail> {
        loop {
            match self.phase {
                EomPhase::Newline => match self.newline.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => {
                        buf.start_flush();
                        self.phase = EomPhase::Flush;
                    }
                },
                EomPhase::Flush => {
                    if !buf.writable() {
                        return suspend();
                    }
                    return Ok(Status::Done(()));
                }
            }
        }
    }
}

enum ExcPhase {
    Marker,
    Error,
}

/// Writes the inline exception marker followed by a remote error
/// aggregate, in lieu of whatever reply tokens were not written.
pub struct ExceptionWriter {
    phase: ExcPhase,
    marker: TokenWriter,
    error: MappedWriter<RemoteError>,
}

/// Associate functions for [ExceptionWriter].
impl ExceptionWriter {
    pub fn new(error: RemoteError) -> Self {
        Self {
            phase: ExcPhase::Marker,
            marker: TokenWriter::literal("! "),
            error: error.writer(),
        }
    }
}

impl WriteMachine for ExceptionWriter {
    fn step(&mut self, buf: &mut NbOutbuf) -> Result<Status<()>, Fail> {
        loop {
            match self.phase {
                ExcPhase::Marker => match self.marker.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => self.phase = ExcPhase::Error,
                },
                ExcPhase::Error => return self.error.step(buf),
            }
        }
    }
}
