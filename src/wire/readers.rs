// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::buffers::NbInbuf;
use crate::fail::Fail;
use crate::wire::identifier::Identifier;
use crate::wire::remote_error::RemoteError;
use crate::wire::{
    eof_failure, is_whitespace, quoted_byte, ReadMachine, Status, Wants, WireRead,
};

use std::ops::Deref;

//==============================================================================
// Helpers
//==============================================================================

fn suspend<T>() -> Result<Status<T>, Fail> {
    Ok(Status::Suspended(Wants::READ))
}

//==============================================================================
// Whitespace Skipper
//==============================================================================

/// Skips inter-token whitespace and eventually reports the first
/// non-whitespace byte (`None` at EOF), leaving the buffer positioned at
/// that byte.
///
/// A leading `!` is the inline remote-exception marker: the skipper then
/// reads a [RemoteError] aggregate and fails the in-flight operation with
/// the reconstructed error. Every token reader starts with a whitespace
/// skipper.
#[derive(Default)]
pub struct WsSkipper {
    exception: Option<Box<<RemoteError as WireRead>::Reader>>,
}

impl ReadMachine for WsSkipper {
    type Output = Option<u8>;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<Option<u8>>, Fail> {
        loop {
            if let Some(reader) = &mut self.exception {
                return match reader.step(buf)? {
                    Status::Suspended(wants) => Ok(Status::Suspended(wants)),
                    Status::Done(error) => Err(Fail::Remote { error }),
                };
            }

            if !buf.readable() {
                return suspend();
            }
            match buf.peek() {
                Some(c) if is_whitespace(c) => buf.skip(),
                Some(b'!') => {
                    buf.skip();
                    self.exception = Some(Box::new(Default::default()));
                }
                other => return Ok(Status::Done(other)),
            }
        }
    }
}

//==============================================================================
// Expected Characters
//==============================================================================

/// Skips whitespace, then reports whether `C` is the next byte, skipping it
/// if so.
pub struct ExpectedChecker<const C: u8> {
    skipper: WsSkipper,
}

impl<const C: u8> Default for ExpectedChecker<C> {
    fn default() -> Self {
        Self {
            skipper: WsSkipper::default(),
        }
    }
}

impl<const C: u8> ReadMachine for ExpectedChecker<C> {
    type Output = bool;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<bool>, Fail> {
        match self.skipper.step(buf)? {
            Status::Suspended(wants) => Ok(Status::Suspended(wants)),
            Status::Done(Some(c)) if c == C => {
                buf.skip();
                Ok(Status::Done(true))
            }
            Status::Done(_) => Ok(Status::Done(false)),
        }
    }
}

/// Skips whitespace, then requires `C` as the next byte, skipping it.
pub struct ExpectedReader<const C: u8> {
    skipper: WsSkipper,
}

impl<const C: u8> Default for ExpectedReader<C> {
    fn default() -> Self {
        Self {
            skipper: WsSkipper::default(),
        }
    }
}

impl<const C: u8> ReadMachine for ExpectedReader<C> {
    type Output = ();

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<()>, Fail> {
        match self.skipper.step(buf)? {
            Status::Suspended(wants) => Ok(Status::Suspended(wants)),
            Status::Done(Some(c)) if c == C => {
                buf.skip();
                Ok(Status::Done(()))
            }
            Status::Done(other) => {
                if other.is_none() && !buf.error_status().is_ok() {
                    return Err(Fail::Io {
                        status: buf.error_status(),
                    });
                }
                Err(Fail::parse(format!(
                    "{} expected, but got {}",
                    quoted_byte(Some(C)),
                    quoted_byte(other)
                )))
            }
        }
    }
}

/// Reads the opening bracket of a sequence.
pub type BeginSequenceReader = ExpectedReader<{ b'[' }>;
/// Checks for the closing bracket of a sequence.
pub type EndSequenceChecker = ExpectedChecker<{ b']' }>;

//==============================================================================
// Booleans
//==============================================================================

/// Reads `|` (true) or `&` (false).
#[derive(Default)]
pub struct BoolReader {
    skipper: WsSkipper,
}

impl ReadMachine for BoolReader {
    type Output = bool;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<bool>, Fail> {
        match self.skipper.step(buf)? {
            Status::Suspended(wants) => Ok(Status::Suspended(wants)),
            Status::Done(Some(b'|')) => {
                buf.skip();
                Ok(Status::Done(true))
            }
            Status::Done(Some(b'&')) => {
                buf.skip();
                Ok(Status::Done(false))
            }
            Status::Done(other) => {
                if other.is_none() && !buf.error_status().is_ok() {
                    return Err(Fail::Io {
                        status: buf.error_status(),
                    });
                }
                Err(Fail::parse(format!(
                    "boolean expected, but got {}",
                    quoted_byte(other)
                )))
            }
        }
    }
}

impl WireRead for bool {
    type Reader = BoolReader;
}

//==============================================================================
// Unsigned Integers
//==============================================================================

/// Capability set the integer readers need from an unsigned wire type.
pub trait UnsignedWire: Copy {
    fn zero() -> Self;
    fn checked_mul10_add(self, digit: u8) -> Option<Self>;
    fn greater_than(self, other: Self) -> bool;
}

macro_rules! unsigned_wire {
    ($($t:ty),+) => {
        $(
            impl UnsignedWire for $t {
                fn zero() -> Self {
                    0
                }

                fn checked_mul10_add(self, digit: u8) -> Option<Self> {
                    self.checked_mul(10)?.checked_add(digit as $t)
                }

                fn greater_than(self, other: Self) -> bool {
                    self > other
                }
            }
        )+
    };
}

unsigned_wire!(u16, u32, u64);

enum DigitsPhase {
    Skipping,
    Digits,
}

/// Reads an unsigned decimal integer. Overflow is a parse error.
pub struct UnsignedReader<T: UnsignedWire> {
    skipper: WsSkipper,
    phase: DigitsPhase,
    value: T,
}

impl<T: UnsignedWire> Default for UnsignedReader<T> {
    fn default() -> Self {
        Self {
            skipper: WsSkipper::default(),
            phase: DigitsPhase::Skipping,
            value: T::zero(),
        }
    }
}

impl<T: UnsignedWire> ReadMachine for UnsignedReader<T> {
    type Output = T;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<T>, Fail> {
        if let DigitsPhase::Skipping = self.phase {
            match self.skipper.step(buf)? {
                Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                Status::Done(Some(c)) if c.is_ascii_digit() => {
                    self.phase = DigitsPhase::Digits;
                }
                Status::Done(other) => {
                    if other.is_none() && !buf.error_status().is_ok() {
                        return Err(Fail::Io {
                            status: buf.error_status(),
                        });
                    }
                    return Err(Fail::parse(format!(
                        "digit expected, but got {}",
                        quoted_byte(other)
                    )));
                }
            }
        }

        loop {
            if !buf.readable() {
                return suspend();
            }
            match buf.peek() {
                Some(c) if c.is_ascii_digit() => {
                    self.value = self
                        .value
                        .checked_mul10_add(c - b'0')
                        .ok_or_else(|| Fail::parse("unsigned integer overflow"))?;
                    buf.skip();
                }
                _ => return Ok(Status::Done(self.value)),
            }
        }
    }
}

impl WireRead for u16 {
    type Reader = UnsignedReader<u16>;
}

impl WireRead for u32 {
    type Reader = UnsignedReader<u32>;
}

impl WireRead for u64 {
    type Reader = UnsignedReader<u64>;
}

//==============================================================================
// Signed Integers
//==============================================================================

/// Capability set connecting a signed wire type to its unsigned magnitude
/// type.
pub trait SignedWire: Copy {
    type Mag: UnsignedWire;

    fn max_magnitude(negative: bool) -> Self::Mag;
    fn from_magnitude(negative: bool, magnitude: Self::Mag) -> Self;
    fn magnitude(self) -> (bool, Self::Mag);
}

macro_rules! signed_wire {
    ($(($t:ty, $u:ty)),+) => {
        $(
            impl SignedWire for $t {
                type Mag = $u;

                fn max_magnitude(negative: bool) -> $u {
                    if negative {
                        (<$t>::min_value() as $u).wrapping_neg()
                    } else {
                        <$t>::max_value() as $u
                    }
                }

                fn from_magnitude(negative: bool, magnitude: $u) -> $t {
                    if negative {
                        magnitude.wrapping_neg() as $t
                    } else {
                        magnitude as $t
                    }
                }

                fn magnitude(self) -> (bool, $u) {
                    if self < 0 {
                        (true, (self as $u).wrapping_neg())
                    } else {
                        (false, self as $u)
                    }
                }
            }
        )+
    };
}

signed_wire!((i16, u16), (i32, u32), (i64, u64));

enum SignedPhase {
    Skipping,
    FirstDigit,
    Digits,
}

/// Reads a signed decimal integer: an optional `-`, then digits. Values
/// outside the target range are parse errors.
pub struct SignedReader<T: SignedWire> {
    skipper: WsSkipper,
    phase: SignedPhase,
    negative: bool,
    magnitude: T::Mag,
}

impl<T: SignedWire> Default for SignedReader<T> {
    fn default() -> Self {
        Self {
            skipper: WsSkipper::default(),
            phase: SignedPhase::Skipping,
            negative: false,
            magnitude: T::Mag::zero(),
        }
    }
}

impl<T: SignedWire> ReadMachine for SignedReader<T> {
    type Output = T;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<T>, Fail> {
        if let SignedPhase::Skipping = self.phase {
            match self.skipper.step(buf)? {
                Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                Status::Done(Some(b'-')) => {
                    buf.skip();
                    self.negative = true;
                    self.phase = SignedPhase::FirstDigit;
                }
                Status::Done(Some(c)) if c.is_ascii_digit() => {
                    self.phase = SignedPhase::Digits;
                }
                Status::Done(other) => {
                    if other.is_none() && !buf.error_status().is_ok() {
                        return Err(Fail::Io {
                            status: buf.error_status(),
                        });
                    }
                    return Err(Fail::parse(format!(
                        "signed integer expected, but got {}",
                        quoted_byte(other)
                    )));
                }
            }
        }

        if let SignedPhase::FirstDigit = self.phase {
            if !buf.readable() {
                return suspend();
            }
            match buf.peek() {
                Some(c) if c.is_ascii_digit() => {
                    self.phase = SignedPhase::Digits;
                }
                other => {
                    if other.is_none() && !buf.error_status().is_ok() {
                        return Err(Fail::Io {
                            status: buf.error_status(),
                        });
                    }
                    return Err(Fail::parse(format!(
                        "digit expected, but got {}",
                        quoted_byte(other)
                    )));
                }
            }
        }

        loop {
            if !buf.readable() {
                return suspend();
            }
            match buf.peek() {
                Some(c) if c.is_ascii_digit() => {
                    self.magnitude = self
                        .magnitude
                        .checked_mul10_add(c - b'0')
                        .ok_or_else(|| Fail::parse("signed integer overflow"))?;
                    if self.magnitude.greater_than(T::max_magnitude(self.negative)) {
                        return Err(Fail::parse("signed integer overflow"));
                    }
                    buf.skip();
                }
                _ => {
                    return Ok(Status::Done(T::from_magnitude(
                        self.negative,
                        self.magnitude,
                    )))
                }
            }
        }
    }
}

impl WireRead for i16 {
    type Reader = SignedReader<i16>;
}

impl WireRead for i32 {
    type Reader = SignedReader<i32>;
}

impl WireRead for i64 {
    type Reader = SignedReader<i64>;
}

//==============================================================================
// Strings & Blobs
//==============================================================================

/// A byte blob. On the wire, blobs share the quoted-string representation;
/// in memory they stay raw bytes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Blob(pub Vec<u8>);

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Blob(bytes)
    }
}

enum QuotedPhase {
    Skipping,
    Contents,
    Escape,
    HexHi,
    HexLo,
}

/// Reads a quoted token (`"..."`) into raw bytes, decoding the escapes
/// `\n`, `\t`, `\r`, `\"`, `\\`, `\'` and `\xHH`.
struct QuotedBytesReader {
    skipper: WsSkipper,
    phase: QuotedPhase,
    value: Vec<u8>,
    hex: u8,
}

impl Default for QuotedBytesReader {
    fn default() -> Self {
        Self {
            skipper: WsSkipper::default(),
            phase: QuotedPhase::Skipping,
            value: Vec::new(),
            hex: 0,
        }
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl ReadMachine for QuotedBytesReader {
    type Output = Vec<u8>;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<Vec<u8>>, Fail> {
        if let QuotedPhase::Skipping = self.phase {
            match self.skipper.step(buf)? {
                Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                Status::Done(Some(b'"')) => {
                    buf.skip();
                    self.phase = QuotedPhase::Contents;
                }
                Status::Done(other) => {
                    if other.is_none() && !buf.error_status().is_ok() {
                        return Err(Fail::Io {
                            status: buf.error_status(),
                        });
                    }
                    return Err(Fail::parse(format!(
                        "string expected, but got {}",
                        quoted_byte(other)
                    )));
                }
            }
        }

        loop {
            if !buf.readable() {
                return suspend();
            }
            let c = match buf.peek() {
                None => return Err(eof_failure(buf, "unterminated string")),
                Some(c) => c,
            };
            match self.phase {
                QuotedPhase::Contents => match c {
                    b'"' => {
                        buf.skip();
                        return Ok(Status::Done(std::mem::replace(
                            &mut self.value,
                            Vec::new(),
                        )));
                    }
                    b'\\' => {
                        buf.skip();
                        self.phase = QuotedPhase::Escape;
                    }
                    _ => {
                        self.value.push(c);
                        buf.skip();
                    }
                },
                QuotedPhase::Escape => {
                    buf.skip();
                    match c {
                        b'n' => {
                            self.value.push(b'\n');
                            self.phase = QuotedPhase::Contents;
                        }
                        b't' => {
                            self.value.push(b'\t');
                            self.phase = QuotedPhase::Contents;
                        }
                        b'r' => {
                            self.value.push(b'\r');
                            self.phase = QuotedPhase::Contents;
                        }
                        b'"' | b'\\' | b'\'' => {
                            self.value.push(c);
                            self.phase = QuotedPhase::Contents;
                        }
                        b'x' => {
                            self.phase = QuotedPhase::HexHi;
                        }
                        _ => {
                            return Err(Fail::parse(format!(
                                "unknown string escape {}",
                                quoted_byte(Some(c))
                            )))
                        }
                    }
                }
                QuotedPhase::HexHi => {
                    buf.skip();
                    self.hex = hex_value(c).ok_or_else(|| {
                        Fail::parse(format!(
                            "hex digit expected, but got {}",
                            quoted_byte(Some(c))
                        ))
                    })?;
                    self.phase = QuotedPhase::HexLo;
                }
                QuotedPhase::HexLo => {
                    buf.skip();
                    let lo = hex_value(c).ok_or_else(|| {
                        Fail::parse(format!(
                            "hex digit expected, but got {}",
                            quoted_byte(Some(c))
                        ))
                    })?;
                    self.value.push((self.hex << 4) | lo);
                    self.phase = QuotedPhase::Contents;
                }
                QuotedPhase::Skipping => unreachable!(),
            }
        }
    }
}

/// Reads a quoted string; the decoded bytes must be valid UTF-8.
#[derive(Default)]
pub struct StringReader {
    inner: QuotedBytesReader,
}

impl ReadMachine for StringReader {
    type Output = String;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<String>, Fail> {
        match self.inner.step(buf)? {
            Status::Suspended(wants) => Ok(Status::Suspended(wants)),
            Status::Done(bytes) => String::from_utf8(bytes)
                .map(Status::Done)
                .map_err(|_| Fail::parse("invalid utf-8 in string")),
        }
    }
}

impl WireRead for String {
    type Reader = StringReader;
}

/// Reads a quoted byte blob.
#[derive(Default)]
pub struct BlobReader {
    inner: QuotedBytesReader,
}

impl ReadMachine for BlobReader {
    type Output = Blob;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<Blob>, Fail> {
        match self.inner.step(buf)? {
            Status::Suspended(wants) => Ok(Status::Suspended(wants)),
            Status::Done(bytes) => Ok(Status::Done(Blob(bytes))),
        }
    }
}

impl WireRead for Blob {
    type Reader = BlobReader;
}

//==============================================================================
// Identifiers
//==============================================================================

enum IdentifierPhase {
    Skipping,
    Followers,
}

/// Reads an identifier token.
pub struct IdentifierReader {
    skipper: WsSkipper,
    phase: IdentifierPhase,
    value: Vec<u8>,
}

impl Default for IdentifierReader {
    fn default() -> Self {
        Self {
            skipper: WsSkipper::default(),
            phase: IdentifierPhase::Skipping,
            value: Vec::new(),
        }
    }
}

impl ReadMachine for IdentifierReader {
    type Output = Identifier;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<Identifier>, Fail> {
        if let IdentifierPhase::Skipping = self.phase {
            match self.skipper.step(buf)? {
                Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                Status::Done(Some(c)) if Identifier::is_leader(c) => {
                    self.phase = IdentifierPhase::Followers;
                }
                Status::Done(other) => {
                    if other.is_none() && !buf.error_status().is_ok() {
                        return Err(Fail::Io {
                            status: buf.error_status(),
                        });
                    }
                    return Err(Fail::parse(format!(
                        "identifier expected, but got {}",
                        quoted_byte(other)
                    )));
                }
            }
        }

        loop {
            if !buf.readable() {
                return suspend();
            }
            match buf.peek() {
                Some(c) if Identifier::is_follower(c) => {
                    self.value.push(c);
                    buf.skip();
                }
                _ => {
                    let name = String::from_utf8(std::mem::replace(
                        &mut self.value,
                        Vec::new(),
                    ))
                    .expect("identifier bytes are ascii");
                    return Ok(Status::Done(Identifier::from_validated(name)));
                }
            }
        }
    }
}

impl WireRead for Identifier {
    type Reader = IdentifierReader;
}

//==============================================================================
// Message Framing
//==============================================================================

/// Skips whitespace and requires the end-of-message newline, leaving it in
/// the buffer for the message drainer.
#[derive(Default)]
pub struct EomChecker {
    skipper: WsSkipper,
}

impl ReadMachine for EomChecker {
    type Output = ();

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<()>, Fail> {
        match self.skipper.step(buf)? {
            Status::Suspended(wants) => Ok(Status::Suspended(wants)),
            Status::Done(Some(b'\n')) => Ok(Status::Done(())),
            Status::Done(other) => {
                if other.is_none() && !buf.error_status().is_ok() {
                    return Err(Fail::Io {
                        status: buf.error_status(),
                    });
                }
                Err(Fail::parse(format!(
                    "end of message expected, but got {}",
                    quoted_byte(other)
                )))
            }
        }
    }
}

/// Skips whitespace and reports whether the input is at EOF.
#[derive(Default)]
pub struct EofChecker {
    skipper: WsSkipper,
}

impl ReadMachine for EofChecker {
    type Output = bool;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<bool>, Fail> {
        match self.skipper.step(buf)? {
            Status::Suspended(wants) => Ok(Status::Suspended(wants)),
            Status::Done(c) => Ok(Status::Done(c.is_none())),
        }
    }
}

/// Skips all remaining bytes of the current message, up to and including
/// its newline (or EOF). Keeps the connection aligned after a partial
/// parse.
#[derive(Default)]
pub struct MessageDrainer {}

impl ReadMachine for MessageDrainer {
    type Output = ();

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<()>, Fail> {
        loop {
            if !buf.readable() {
                return suspend();
            }
            match buf.peek() {
                None => return Ok(Status::Done(())),
                Some(b'\n') => {
                    buf.skip();
                    return Ok(Status::Done(()));
                }
                Some(_) => buf.skip(),
            }
        }
    }
}

//==============================================================================
// Sequences
//==============================================================================

enum SeqPhase {
    Open,
    CheckEnd,
    Element,
}

/// Reads a sequence (`[ ... ] `) into a vector.
pub struct VecReader<T: WireRead> {
    phase: SeqPhase,
    open: BeginSequenceReader,
    end: EndSequenceChecker,
    element: T::Reader,
    items: Vec<T>,
}

impl<T: WireRead> Default for VecReader<T> {
    fn default() -> Self {
        Self {
            phase: SeqPhase::Open,
            open: BeginSequenceReader::default(),
            end: EndSequenceChecker::default(),
            element: T::Reader::default(),
            items: Vec::new(),
        }
    }
}

impl<T: WireRead> ReadMachine for VecReader<T> {
    type Output = Vec<T>;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<Vec<T>>, Fail> {
        loop {
            match self.phase {
                SeqPhase::Open => match self.open.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => self.phase = SeqPhase::CheckEnd,
                },
                SeqPhase::CheckEnd => match self.end.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(true) => {
                        return Ok(Status::Done(std::mem::replace(
                            &mut self.items,
                            Vec::new(),
                        )));
                    }
                    Status::Done(false) => self.phase = SeqPhase::Element,
                },
                SeqPhase::Element => match self.element.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(item) => {
                        self.items.push(item);
                        self.element = T::Reader::default();
                        self.end = EndSequenceChecker::default();
                        self.phase = SeqPhase::CheckEnd;
                    }
                },
            }
        }
    }
}

impl<T: WireRead> WireRead for Vec<T> {
    type Reader = VecReader<T>;
}

/// Reads an optional value, encoded as a sequence of length zero or one.
pub struct OptionReader<T: WireRead> {
    phase: SeqPhase,
    open: BeginSequenceReader,
    end: EndSequenceChecker,
    element: T::Reader,
    value: Option<T>,
}

impl<T: WireRead> Default for OptionReader<T> {
    fn default() -> Self {
        Self {
            phase: SeqPhase::Open,
            open: BeginSequenceReader::default(),
            end: EndSequenceChecker::default(),
            element: T::Reader::default(),
            value: None,
        }
    }
}

impl<T: WireRead> ReadMachine for OptionReader<T> {
    type Output = Option<T>;

    fn step(&mut self, buf: &mut NbInbuf) -> Result<Status<Option<T>>, Fail> {
        loop {
            match self.phase {
                SeqPhase::Open => match self.open.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(()) => self.phase = SeqPhase::CheckEnd,
                },
                SeqPhase::CheckEnd => match self.end.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(true) => return Ok(Status::Done(self.value.take())),
                    Status::Done(false) => {
                        if self.value.is_some() {
                            return Err(Fail::parse("duplicate optional value"));
                        }
                        self.phase = SeqPhase::Element;
                    }
                },
                SeqPhase::Element => match self.element.step(buf)? {
                    Status::Suspended(wants) => return Ok(Status::Suspended(wants)),
                    Status::Done(item) => {
                        self.value = Some(item);
                        self.element = T::Reader::default();
                        self.end = EndSequenceChecker::default();
                        self.phase = SeqPhase::CheckEnd;
                    }
                },
            }
        }
    }
}

impl<T: WireRead> WireRead for Option<T> {
    type Reader = OptionReader<T>;
}
