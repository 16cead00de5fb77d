// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Codec tests: exact renderings, round trips over source chunk sizes
//! including 1 and the default, malformed input, the inline exception
//! marker, and bounded-stack reading of large sequences.

use wireline::buffers::{string_inbuf, string_outbuf, NbInbuf, NbOutbuf};
use wireline::fail::Fail;
use wireline::scheduler::{Scheduler, SelectorFactory};
use wireline::wire::{
    enum_from_underlying, Blob, EnumWire, EofChecker, Identifier, ReadMachine, RemoteError,
    Status, TupleMapped, WireRead, WireWrite, WriteMachine,
};
use wireline::{wire_enum, wire_mapped};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use std::fmt::Debug;

//==============================================================================
// Test Infrastructure
//==============================================================================

fn drive_read<M: ReadMachine>(
    machine: &mut M,
    inbuf: &mut NbInbuf,
    scheduler: &mut Scheduler,
) -> Result<M::Output, Fail> {
    loop {
        match machine.step(inbuf)? {
            Status::Done(value) => return Ok(value),
            Status::Suspended(_) => {
                inbuf.call_when_readable(scheduler);
                loop {
                    let ticket = scheduler.wait();
                    if inbuf.on_event(scheduler, ticket) {
                        break;
                    }
                }
            }
        }
    }
}

fn drive_write<M: WriteMachine>(
    machine: &mut M,
    outbuf: &mut NbOutbuf,
    scheduler: &mut Scheduler,
) -> Result<(), Fail> {
    loop {
        match machine.step(outbuf)? {
            Status::Done(()) => return Ok(()),
            Status::Suspended(_) => {
                outbuf.call_when_writable(scheduler);
                loop {
                    let ticket = scheduler.wait();
                    if outbuf.on_event(scheduler, ticket) {
                        break;
                    }
                }
            }
        }
    }
}

fn flush(outbuf: &mut NbOutbuf, scheduler: &mut Scheduler) {
    outbuf.start_flush();
    if !outbuf.writable() {
        outbuf.call_when_writable(scheduler);
        loop {
            let ticket = scheduler.wait();
            if outbuf.on_event(scheduler, ticket) {
                break;
            }
        }
    }
}

/// Serializes a value, draining the output through a sink accepting
/// `chunk` bytes at a time.
fn write_to_string<T: WireWrite>(value: T, chunk: usize) -> String {
    let mut scheduler = Scheduler::new(SelectorFactory::Poll);
    let (mut outbuf, handle) = string_outbuf(chunk, 64);
    let mut writer = value.writer();
    drive_write(&mut writer, &mut outbuf, &mut scheduler).expect("write failed");
    flush(&mut outbuf, &mut scheduler);
    handle.as_string()
}

/// Deserializes one value from `data`, fed in `chunk`-sized slices.
fn read_from_string<T: WireRead>(data: &str, chunk: usize) -> Result<T, Fail> {
    let mut scheduler = Scheduler::new(SelectorFactory::Poll);
    let mut inbuf = string_inbuf(data, chunk);
    let mut reader = T::Reader::default();
    drive_read(&mut reader, &mut inbuf, &mut scheduler)
}

/// Deserializes one value and requires EOF (no trailing garbage).
fn read_exactly<T: WireRead>(data: &str, chunk: usize) -> T {
    let mut scheduler = Scheduler::new(SelectorFactory::Poll);
    let mut inbuf = string_inbuf(data, chunk);
    let mut reader = T::Reader::default();
    let value = drive_read(&mut reader, &mut inbuf, &mut scheduler).expect("read failed");
    let mut eof = EofChecker::default();
    let at_eof = drive_read(&mut eof, &mut inbuf, &mut scheduler).expect("eof check failed");
    assert!(at_eof, "trailing garbage after value");
    value
}

fn round_trip<T>(value: T)
where
    T: WireRead + WireWrite + Clone + PartialEq + Debug,
{
    for &chunk in &[1usize, 3, 8 * 1024] {
        let serialized = write_to_string(value.clone(), chunk);
        let read: T = read_exactly(&serialized, chunk);
        assert_eq!(read, value, "chunk size {}", chunk);
    }
}

//==============================================================================
// Renderings
//==============================================================================

#[test]
fn exact_renderings() {
    assert_eq!(write_to_string(true, 16), "| ");
    assert_eq!(write_to_string(false, 16), "& ");
    assert_eq!(write_to_string(42u32, 16), "42 ");
    assert_eq!(write_to_string(-7i32, 16), "-7 ");
    assert_eq!(write_to_string(i32::min_value(), 16), "-2147483648 ");
    assert_eq!(
        write_to_string("hello".to_string(), 16),
        "\"hello\" "
    );
    assert_eq!(
        write_to_string("a\nb".to_string(), 16),
        "\"a\\nb\" "
    );
    assert_eq!(
        write_to_string(vec!["hello".to_string(), "world".to_string()], 16),
        "[ \"hello\" \"world\" ] "
    );
    assert_eq!(write_to_string(Vec::<u32>::new(), 16), "[ ] ");
    assert_eq!(write_to_string(Some(5u16), 16), "[ 5 ] ");
    assert_eq!(write_to_string(None::<u16>, 16), "[ ] ");
    assert_eq!(write_to_string((1u32, 2u32), 16), "{ 1 2 } ");
    assert_eq!(
        write_to_string(Identifier::new("add").unwrap(), 16),
        "add "
    );
}

#[test]
fn whitespace_tolerance() {
    let value: u32 = read_exactly(" \t\r  17 ", 1);
    assert_eq!(value, 17);
    let value: Vec<u32> = read_exactly("\t[   1\t2  3 ]  ", 2);
    assert_eq!(value, vec![1, 2, 3]);
}

//==============================================================================
// Round Trips
//==============================================================================

#[test]
fn primitive_round_trips() {
    round_trip(true);
    round_trip(false);
    round_trip(0u16);
    round_trip(u16::max_value());
    round_trip(0u32);
    round_trip(u32::max_value());
    round_trip(u64::max_value());
    round_trip(0i16);
    round_trip(i16::min_value());
    round_trip(i32::min_value());
    round_trip(i32::max_value());
    round_trip(i64::min_value());
    round_trip(i64::max_value());
}

#[test]
fn string_round_trips() {
    round_trip(String::new());
    round_trip("plain".to_string());
    round_trip("with \"quotes\" and \\backslashes\\".to_string());
    round_trip("tabs\tnewlines\ncarriage\rreturns".to_string());
    round_trip("unicode: grüße, こんにちは".to_string());
    round_trip("control \u{1} bytes".to_string());
}

#[test]
fn blob_round_trips() {
    round_trip(Blob(vec![]));
    round_trip(Blob(vec![0, 1, 2, 0xfe, 0xff]));
    round_trip(Blob((0u8..=255).collect()));
}

#[test]
fn composite_round_trips() {
    round_trip(vec![1u32, 2, 3]);
    round_trip(Vec::<u32>::new());
    round_trip(vec![vec!["a".to_string()], vec![], vec!["b".to_string()]]);
    round_trip(Some("present".to_string()));
    round_trip(None::<String>);
    round_trip((42u32,));
    round_trip((1i32, "two".to_string()));
    round_trip((1u16, 2u32, 3u64));
    round_trip((true, -1i16, "x".to_string(), vec![9u64]));
    round_trip([1u32, 2, 3]);
    round_trip(Identifier::new("some_method9").unwrap());
}

#[test]
fn randomized_round_trips() {
    let mut rng = SmallRng::seed_from_u64(0x7ea);
    for _ in 0..50 {
        round_trip(rng.gen::<i64>());
        round_trip(rng.gen::<u32>());
        let len = rng.gen_range(0, 20);
        let v: Vec<u16> = (0..len).map(|_| rng.gen()).collect();
        round_trip(v);
    }
}

//==============================================================================
// Enumerations & User Types
//==============================================================================

#[derive(Clone, Copy, Debug, Eq, PartialEq, num_derive::FromPrimitive)]
enum Color {
    Red = 0,
    Green = 1,
    Blue = 7,
}

impl EnumWire for Color {
    type Wire = i32;

    fn to_wire(self) -> i32 {
        self as i32
    }

    fn from_wire(wire: i32) -> Result<Self, Fail> {
        enum_from_underlying(wire as i64)
    }
}

wire_enum!(Color);

#[derive(Clone, Debug, Eq, PartialEq)]
struct Span {
    begin: u64,
    length: u64,
    label: String,
}

impl TupleMapped for Span {
    type Tuple = (u64, u64, String);

    fn into_tuple(self) -> Self::Tuple {
        (self.begin, self.length, self.label)
    }

    fn from_tuple(tuple: Self::Tuple) -> Result<Self, Fail> {
        let (begin, length, label) = tuple;
        Ok(Span {
            begin,
            length,
            label,
        })
    }
}

wire_mapped!(Span);

#[test]
fn enum_round_trips() {
    round_trip(Color::Red);
    round_trip(Color::Green);
    round_trip(Color::Blue);
    assert_eq!(write_to_string(Color::Blue, 16), "7 ");
}

#[test]
fn enum_out_of_range_is_a_parse_error() {
    let result: Result<Color, Fail> = read_from_string("3 ", 1);
    assert!(matches!(result, Err(Fail::Parse { .. })));
}

#[test]
fn user_type_round_trips() {
    round_trip(Span {
        begin: 10,
        length: 0,
        label: "gap".to_string(),
    });
    assert_eq!(
        write_to_string(
            Span {
                begin: 1,
                length: 2,
                label: "x".to_string(),
            },
            16
        ),
        "{ 1 2 \"x\" } "
    );
}

#[test]
fn remote_error_round_trips() {
    let error = RemoteError::new(
        Identifier::new("EIEIO").unwrap(),
        "farmyard error".to_string(),
    );
    for &chunk in &[1usize, 8 * 1024] {
        let serialized = write_to_string(error.clone(), chunk);
        let read: RemoteError = read_exactly(&serialized, chunk);
        assert_eq!(read.kind(), error.kind());
        assert_eq!(read.description(), error.description());
    }
}

//==============================================================================
// Malformed Input
//==============================================================================

#[test]
fn parse_errors() {
    assert!(matches!(
        read_from_string::<u32>("x ", 1),
        Err(Fail::Parse { .. })
    ));
    assert!(matches!(
        read_from_string::<i32>("- ", 1),
        Err(Fail::Parse { .. })
    ));
    assert!(matches!(
        read_from_string::<bool>("1 ", 1),
        Err(Fail::Parse { .. })
    ));
    assert!(matches!(
        read_from_string::<String>("\"unterminated", 1),
        Err(Fail::Parse { .. })
    ));
    assert!(matches!(
        read_from_string::<String>("\"bad \\q escape\" ", 1),
        Err(Fail::Parse { .. })
    ));
    assert!(matches!(
        read_from_string::<Vec<u32>>("[ 1 2 ", 1),
        Err(Fail::Parse { .. })
    ));
    assert!(matches!(
        read_from_string::<(u32, u32)>("{ 1 2 ", 1),
        Err(Fail::Parse { .. })
    ));
}

#[test]
fn integer_overflow_is_a_parse_error() {
    assert!(matches!(
        read_from_string::<u32>("4294967296 ", 1),
        Err(Fail::Parse { .. })
    ));
    assert!(matches!(
        read_from_string::<i32>("2147483648 ", 1),
        Err(Fail::Parse { .. })
    ));
    assert!(matches!(
        read_from_string::<i32>("-2147483649 ", 1),
        Err(Fail::Parse { .. })
    ));
    // The extremes themselves are fine.
    assert_eq!(read_exactly::<i32>("-2147483648 ", 1), i32::min_value());
    assert_eq!(read_exactly::<u32>("4294967295 ", 1), u32::max_value());
}

#[test]
fn hex_escapes_accepted_on_input() {
    let value: String = read_exactly("\"a\\x62c\" ", 1);
    assert_eq!(value, "abc");
    let blob: Blob = read_exactly("\"\\xff\\x00\" ", 1);
    assert_eq!(&*blob, &[0xff, 0x00][..]);
    assert!(matches!(
        read_from_string::<String>("\"\\xff\" ", 1),
        Err(Fail::Parse { .. })
    ));
}

//==============================================================================
// Inline Exception Marker
//==============================================================================

#[test]
fn inline_exception_surfaces_as_remote_error() {
    let result: Result<i32, Fail> =
        read_from_string("! { method_failed \"boom\" } \n", 1);
    match result {
        Err(Fail::Remote { error }) => {
            assert_eq!(error.kind().as_str(), "method_failed");
            assert_eq!(error.description(), "boom");
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[test]
fn exception_marker_recognized_mid_reply() {
    // The first value parses; the second is replaced by an inline error.
    let mut scheduler = Scheduler::new(SelectorFactory::Poll);
    let mut inbuf = string_inbuf("17 ! { bad_request \"late\" } \n", 1);

    let mut first = <u32 as WireRead>::Reader::default();
    let first = drive_read(&mut first, &mut inbuf, &mut scheduler).unwrap();
    assert_eq!(first, 17);

    let mut second = <u32 as WireRead>::Reader::default();
    let result = drive_read(&mut second, &mut inbuf, &mut scheduler);
    match result {
        Err(Fail::Remote { error }) => {
            assert_eq!(error.kind().as_str(), "bad_request");
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

//==============================================================================
// Boxed Argument Lists
//==============================================================================

#[test]
fn boxed_argument_lists() {
    use std::sync::{Arc, Mutex};
    use wireline::rpc::{BoxedInputs, BoxedOutputs};

    let mut scheduler = Scheduler::new(SelectorFactory::Poll);
    let (mut outbuf, handle) = string_outbuf(4, 64);

    let mut outputs = BoxedOutputs::new();
    outputs.push(7u32);
    outputs.push("x".to_string());
    drive_write(&mut outputs, &mut outbuf, &mut scheduler).unwrap();
    flush(&mut outbuf, &mut scheduler);
    assert_eq!(handle.as_string(), "7 \"x\" ");

    let number = Arc::new(Mutex::new(0u32));
    let text = Arc::new(Mutex::new(String::new()));
    let mut inputs = BoxedInputs::new();
    {
        let number = number.clone();
        inputs.push::<u32, _>(move |v| *number.lock().unwrap() = v);
    }
    {
        let text = text.clone();
        inputs.push::<String, _>(move |v| *text.lock().unwrap() = v);
    }

    let mut inbuf = string_inbuf("7 \"x\" ", 1);
    drive_read(&mut inputs, &mut inbuf, &mut scheduler).unwrap();
    assert_eq!(*number.lock().unwrap(), 7);
    assert_eq!(&*text.lock().unwrap(), "x");
}

//==============================================================================
// Bounded Stack
//==============================================================================

#[test]
fn reading_a_million_elements_runs_in_constant_stack() {
    let n: usize = 1_000_000;
    let mut data = String::with_capacity(3 * n + 8);
    data.push_str("[ ");
    for _ in 0..n {
        data.push_str("1 ");
    }
    data.push_str("] ");

    let value: Vec<u32> = read_exactly(&data, 8 * 1024);
    assert_eq!(value.len(), n);
    assert!(value.iter().all(|&v| v == 1));
}
