// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::buffers::throughput::{ThroughputChecker, ThroughputSettings};
use crate::buffers::NbSink;
use crate::fail::ErrorStatus;
use crate::scheduler::{Scheduler, Ticket};

use std::time::{Duration, Instant};

//==============================================================================
// Non-Blocking Output Buffer
//==============================================================================

/// Non-blocking output buffer. `writable()` iff buffer slack is available
/// up to the `limit` pointer; `start_flush()` reduces the limit to the
/// write pointer, making the buffer unwritable until the sink has drained
/// it. A sink-side error is sticky; thereafter writes are absorbed and
/// dropped.
pub struct NbOutbuf {
    sink: Box<dyn NbSink>,
    checker: Option<ThroughputChecker>,

    writable_ticket: Option<Ticket>,
    alarm_ticket: Option<Ticket>,

    buf: Box<[u8]>,
    rp: usize,
    wp: usize,
    limit: usize,

    error: ErrorStatus,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate functions for [NbOutbuf].
impl NbOutbuf {
    pub fn new(sink: Box<dyn NbSink>, bufsize: usize) -> Self {
        assert!(bufsize != 0);
        Self {
            sink,
            checker: None,
            writable_ticket: None,
            alarm_ticket: None,
            buf: vec![0u8; bufsize].into_boxed_slice(),
            rp: 0,
            wp: 0,
            limit: bufsize,
            error: ErrorStatus::Ok,
        }
    }

    /// Enables throughput checking, which is disabled by default. Must not
    /// be called while a readiness wait is pending.
    pub fn enable_throughput_checking(&mut self, settings: ThroughputSettings) {
        debug_assert!(self.writable_ticket.is_none());
        self.checker = Some(ThroughputChecker::new(settings, Instant::now()));
    }

    /// Disables throughput checking, cancelling any pending tick alarm.
    pub fn disable_throughput_checking(&mut self, scheduler: &mut Scheduler) {
        self.checker = None;
        if self.writable_ticket.is_some() {
            if let Some(ticket) = self.alarm_ticket.take() {
                scheduler.cancel(ticket);
            }
        }
    }

    /// The buffer's sticky error status.
    pub fn error_status(&self) -> ErrorStatus {
        self.error
    }

    /// Tells if buffer space is available.
    pub fn writable(&self) -> bool {
        self.wp != self.limit
    }

    /// Writes a single byte.
    /// PRE: self.writable().
    pub fn put(&mut self, byte: u8) {
        assert!(self.writable());
        if self.error.is_ok() {
            self.buf[self.wp] = byte;
            self.wp += 1;
        }
    }

    /// Writes up to `data.len()` bytes, returning the number consumed.
    /// After a sticky error the bytes are absorbed and dropped.
    /// PRE: self.writable().
    pub fn write(&mut self, data: &[u8]) -> usize {
        assert!(self.writable());
        let mut count = data.len();
        if self.error.is_ok() {
            let available = self.limit - self.wp;
            if count > available {
                count = available;
            }
            self.buf[self.wp..self.wp + count].copy_from_slice(&data[..count]);
            self.wp += count;
        }
        count
    }

    /// Enters flushing mode. The buffer becomes writable again when all
    /// buffered bytes have reached the sink.
    pub fn start_flush(&mut self) {
        if self.rp != self.wp {
            self.limit = self.wp;
        }
    }

    /// Schedules a wakeup for when the buffer is detected to be writable,
    /// cancelling any previously requested wakeup. The completion is
    /// delivered through `on_event`.
    pub fn call_when_writable(&mut self, scheduler: &mut Scheduler) {
        self.cancel_when_writable(scheduler);

        if self.writable() {
            self.alarm_ticket = Some(scheduler.call_alarm_in(Duration::from_millis(0)));
        } else {
            self.writable_ticket = Some(self.sink.call_when_ready(scheduler));
            if let Some(checker) = &self.checker {
                self.alarm_ticket = Some(scheduler.call_alarm(checker.next_tick()));
            }
        }
    }

    /// Cancels any pending wakeup; no effect if there is none.
    pub fn cancel_when_writable(&mut self, scheduler: &mut Scheduler) {
        if let Some(ticket) = self.writable_ticket.take() {
            scheduler.cancel(ticket);
        }
        if let Some(ticket) = self.alarm_ticket.take() {
            scheduler.cancel(ticket);
        }
    }

    /// Tells if a readiness wakeup is pending.
    pub fn has_pending_wait(&self) -> bool {
        self.writable_ticket.is_some() || self.alarm_ticket.is_some()
    }

    /// The tickets currently owned by this buffer.
    pub fn pending_tickets(&self) -> (Option<Ticket>, Option<Ticket>) {
        (self.writable_ticket, self.alarm_ticket)
    }

    /// Dispatches a fired scheduler ticket to this buffer. Returns true
    /// when the registered wait has completed and the buffer is writable
    /// again. Returns false for foreign tickets and internal reschedules.
    pub fn on_event(&mut self, scheduler: &mut Scheduler, ticket: Ticket) -> bool {
        if self.alarm_ticket == Some(ticket) {
            self.alarm_ticket = None;
            if self.writable_ticket.is_none() {
                // Zero-delay wakeup: the buffer was writable all along.
                return true;
            }
            return self.on_next_tick(scheduler);
        }

        if self.writable_ticket == Some(ticket) {
            self.writable_ticket = None;
            return self.on_sink_writable(scheduler);
        }

        false
    }

    fn on_sink_writable(&mut self, scheduler: &mut Scheduler) -> bool {
        debug_assert!(!self.writable());
        debug_assert!(self.error.is_ok());

        let outcome = self.sink.write(&self.buf[self.rp..self.wp]);
        let now = Instant::now();

        match outcome {
            Err(status) => {
                self.error = status;
            }
            Ok(Some(n)) => {
                if let Some(checker) = &mut self.checker {
                    self.error = checker.record_transfer(n, now);
                }
                if self.error.is_ok() {
                    self.rp += n;
                }
            }
            Ok(None) => {
                if let Some(checker) = &mut self.checker {
                    self.error = checker.record_transfer(0, now);
                }
            }
        }

        if !self.error.is_ok() {
            // Absorb whatever is left.
            self.rp = self.wp;
        } else if self.rp != self.wp {
            // More to drain: reschedule.
            self.writable_ticket = Some(self.sink.call_when_ready(scheduler));
            return false;
        }

        // Enter the writable state.
        if let Some(ticket) = self.alarm_ticket.take() {
            scheduler.cancel(ticket);
        }
        self.rp = 0;
        self.wp = 0;
        self.limit = self.buf.len();
        true
    }

    fn on_next_tick(&mut self, scheduler: &mut Scheduler) -> bool {
        debug_assert!(!self.writable());
        debug_assert!(self.error.is_ok());

        let now = Instant::now();
        let (status, next_tick) = match &mut self.checker {
            Some(checker) => (checker.record_transfer(0, now), checker.next_tick()),
            None => return false,
        };

        self.error = status;
        if self.error.is_ok() {
            self.alarm_ticket = Some(scheduler.call_alarm(next_tick));
            return false;
        }

        // Low throughput: drop the backlog and complete the wait.
        if let Some(ticket) = self.writable_ticket.take() {
            scheduler.cancel(ticket);
        }
        self.rp = 0;
        self.wp = 0;
        self.limit = self.buf.len();
        true
    }

    pub fn describe(&self) -> String {
        self.sink.describe()
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::{string_outbuf, StringSinkHandle};
    use crate::scheduler::SelectorFactory;

    fn wait_until_writable(outbuf: &mut NbOutbuf, scheduler: &mut Scheduler) {
        outbuf.call_when_writable(scheduler);
        loop {
            let ticket = scheduler.wait();
            if outbuf.on_event(scheduler, ticket) {
                break;
            }
        }
    }

    fn flush(outbuf: &mut NbOutbuf, scheduler: &mut Scheduler) {
        outbuf.start_flush();
        wait_until_writable(outbuf, scheduler);
    }

    #[test]
    fn writes_reach_the_sink_after_flush() {
        let mut scheduler = Scheduler::new(SelectorFactory::Poll);
        let (mut outbuf, handle): (NbOutbuf, StringSinkHandle) = string_outbuf(3, 16);

        let mut pending = &b"hello"[..];
        while !pending.is_empty() {
            wait_until_writable(&mut outbuf, &mut scheduler);
            let n = outbuf.write(pending);
            pending = &pending[n..];
        }
        flush(&mut outbuf, &mut scheduler);

        assert_eq!(handle.bytes(), b"hello");
        assert!(outbuf.error_status().is_ok());
    }

    #[test]
    fn small_buffer_forces_intermediate_drains() {
        let mut scheduler = Scheduler::new(SelectorFactory::Poll);
        let (mut outbuf, handle) = string_outbuf(1, 2);

        let data = b"streamed byte by byte";
        for &byte in data.iter() {
            wait_until_writable(&mut outbuf, &mut scheduler);
            outbuf.put(byte);
            flush(&mut outbuf, &mut scheduler);
        }

        assert_eq!(handle.bytes(), &data[..]);
    }

    #[test]
    fn flush_on_empty_buffer_is_a_no_op() {
        let mut scheduler = Scheduler::new(SelectorFactory::Poll);
        let (mut outbuf, handle) = string_outbuf(4, 16);

        flush(&mut outbuf, &mut scheduler);
        assert!(outbuf.writable());
        assert_eq!(handle.bytes(), b"");
    }
}
