// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::buffers::throughput::{ThroughputChecker, ThroughputSettings};
use crate::buffers::NbSource;
use crate::fail::ErrorStatus;
use crate::scheduler::{Scheduler, Ticket};

use std::time::{Duration, Instant};

//==============================================================================
// Constants & Structures
//==============================================================================

/// Default buffer capacity for non-blocking buffers.
pub const DEFAULT_BUFSIZE: usize = 8 * 1024;

/// Non-blocking input buffer. Owns a byte buffer and a non-blocking source,
/// carries a sticky error status, an optional throughput checker, at most
/// one pending readiness ticket and at most one alarm ticket.
///
/// Invariants: `readable()` iff buffered bytes are available or EOF has been
/// latched; a pending ticket implies a wait was registered through
/// `call_when_readable`; once the error status is non-ok, reads report EOF.
pub struct NbInbuf {
    source: Box<dyn NbSource>,
    checker: Option<ThroughputChecker>,

    readable_ticket: Option<Ticket>,
    alarm_ticket: Option<Ticket>,

    buf: Box<[u8]>,
    rp: usize,
    ep: usize,

    at_eof: bool,
    error: ErrorStatus,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate functions for [NbInbuf].
impl NbInbuf {
    pub fn new(source: Box<dyn NbSource>, bufsize: usize) -> Self {
        assert!(bufsize != 0);
        Self {
            source,
            checker: None,
            readable_ticket: None,
            alarm_ticket: None,
            buf: vec![0u8; bufsize].into_boxed_slice(),
            rp: 0,
            ep: 0,
            at_eof: false,
            error: ErrorStatus::Ok,
        }
    }

    /// Enables throughput checking, which is disabled by default. Must not
    /// be called while a readiness wait is pending.
    pub fn enable_throughput_checking(&mut self, settings: ThroughputSettings) {
        debug_assert!(self.readable_ticket.is_none());
        self.checker = Some(ThroughputChecker::new(settings, Instant::now()));
    }

    /// Disables throughput checking, cancelling any pending tick alarm.
    pub fn disable_throughput_checking(&mut self, scheduler: &mut Scheduler) {
        self.checker = None;
        if self.readable_ticket.is_some() {
            if let Some(ticket) = self.alarm_ticket.take() {
                scheduler.cancel(ticket);
            }
        }
    }

    /// The buffer's sticky error status.
    pub fn error_status(&self) -> ErrorStatus {
        self.error
    }

    /// Tells if input is available or EOF has been seen.
    pub fn readable(&self) -> bool {
        self.rp != self.ep || self.at_eof
    }

    /// The current input byte, or `None` at EOF.
    /// PRE: self.readable().
    pub fn peek(&self) -> Option<u8> {
        assert!(self.readable());
        if self.rp != self.ep {
            Some(self.buf[self.rp])
        } else {
            None
        }
    }

    /// Skips the current input byte.
    /// PRE: self.readable().
    pub fn skip(&mut self) {
        assert!(self.readable());
        if self.rp != self.ep {
            self.rp += 1;
        }
    }

    /// Copies up to `out.len()` buffered bytes into `out`, returning the
    /// number copied (0 at EOF).
    /// PRE: self.readable().
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        assert!(self.readable());
        let count = out.len().min(self.ep - self.rp);
        out[..count].copy_from_slice(&self.buf[self.rp..self.rp + count]);
        self.rp += count;
        count
    }

    /// Schedules a wakeup for when the buffer is detected to be readable,
    /// cancelling any previously requested wakeup. The completion is
    /// delivered through `on_event`.
    pub fn call_when_readable(&mut self, scheduler: &mut Scheduler) {
        self.cancel_when_readable(scheduler);

        if self.readable() {
            self.alarm_ticket = Some(scheduler.call_alarm_in(Duration::from_millis(0)));
        } else {
            self.readable_ticket = Some(self.source.call_when_ready(scheduler));
            if let Some(checker) = &self.checker {
                self.alarm_ticket = Some(scheduler.call_alarm(checker.next_tick()));
            }
        }
    }

    /// Cancels any pending wakeup; no effect if there is none.
    pub fn cancel_when_readable(&mut self, scheduler: &mut Scheduler) {
        if let Some(ticket) = self.readable_ticket.take() {
            scheduler.cancel(ticket);
        }
        if let Some(ticket) = self.alarm_ticket.take() {
            scheduler.cancel(ticket);
        }
    }

    /// Tells if a readiness wakeup is pending.
    pub fn has_pending_wait(&self) -> bool {
        self.readable_ticket.is_some() || self.alarm_ticket.is_some()
    }

    /// The tickets currently owned by this buffer.
    pub fn pending_tickets(&self) -> (Option<Ticket>, Option<Ticket>) {
        (self.readable_ticket, self.alarm_ticket)
    }

    /// Dispatches a fired scheduler ticket to this buffer. Returns true
    /// when the registered wait has completed, that is, the buffer has
    /// become readable (possibly by latching EOF or an error). Returns
    /// false for foreign tickets and for internal reschedules.
    pub fn on_event(&mut self, scheduler: &mut Scheduler, ticket: Ticket) -> bool {
        if self.alarm_ticket == Some(ticket) {
            self.alarm_ticket = None;
            if self.readable_ticket.is_none() {
                // Zero-delay wakeup: the buffer was readable all along.
                return true;
            }
            return self.on_next_tick(scheduler);
        }

        if self.readable_ticket == Some(ticket) {
            self.readable_ticket = None;
            return self.on_source_readable(scheduler);
        }

        false
    }

    fn on_source_readable(&mut self, scheduler: &mut Scheduler) -> bool {
        debug_assert!(!self.readable());
        debug_assert!(self.error.is_ok());

        let outcome = self.source.read(&mut self.buf);
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
                    self.rp = 0;
                    self.ep = n;
                    self.at_eof = n == 0;
                }
            }
            Ok(None) => {
                if let Some(checker) = &mut self.checker {
                    self.error = checker.record_transfer(0, now);
                }
                if self.error.is_ok() {
                    // Spurious wakeup: reschedule.
                    self.readable_ticket = Some(self.source.call_when_ready(scheduler));
                    return false;
                }
            }
        }

        if !self.error.is_ok() {
            self.rp = 0;
            self.ep = 0;
            self.at_eof = true;
        }

        if let Some(ticket) = self.alarm_ticket.take() {
            scheduler.cancel(ticket);
        }
        true
    }

    fn on_next_tick(&mut self, scheduler: &mut Scheduler) -> bool {
        debug_assert!(!self.readable());
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

        // Low throughput: latch EOF and complete the wait.
        if let Some(ticket) = self.readable_ticket.take() {
            scheduler.cancel(ticket);
        }
        self.rp = 0;
        self.ep = 0;
        self.at_eof = true;
        true
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::string_inbuf;
    use crate::scheduler::SelectorFactory;

    /// A source that never produces data; readiness waits are parked on a
    /// distant alarm so only throughput ticks can fire.
    struct PendingSource;

    impl NbSource for PendingSource {
        fn read(&mut self, _buf: &mut [u8]) -> Result<Option<usize>, ErrorStatus> {
            Ok(None)
        }

        fn call_when_ready(&mut self, scheduler: &mut Scheduler) -> Ticket {
            scheduler.call_alarm_in(Duration::from_secs(3600))
        }

        fn describe(&self) -> String {
            "pending source".to_string()
        }
    }

    fn wait_until_readable(inbuf: &mut NbInbuf, scheduler: &mut Scheduler) {
        inbuf.call_when_readable(scheduler);
        loop {
            let ticket = scheduler.wait();
            if inbuf.on_event(scheduler, ticket) {
                break;
            }
        }
    }

    #[test]
    fn reads_all_data_then_eof() {
        let mut scheduler = Scheduler::new(SelectorFactory::Poll);
        let mut inbuf = string_inbuf("abc", 2);

        let mut collected = Vec::new();
        loop {
            wait_until_readable(&mut inbuf, &mut scheduler);
            match inbuf.peek() {
                None => break,
                Some(c) => {
                    collected.push(c);
                    inbuf.skip();
                }
            }
        }
        assert_eq!(collected, b"abc");
        assert!(inbuf.error_status().is_ok());
    }

    #[test]
    fn bulk_read_caps_at_available() {
        let mut scheduler = Scheduler::new(SelectorFactory::Poll);
        let mut inbuf = string_inbuf("hello world", 4);

        wait_until_readable(&mut inbuf, &mut scheduler);
        let mut out = [0u8; 16];
        let n = inbuf.read(&mut out);
        assert_eq!(&out[..n], b"hell");
    }

    #[test]
    fn reregistering_cancels_previous_wait() {
        let mut scheduler = Scheduler::new(SelectorFactory::Poll);
        let mut inbuf = string_inbuf("x", 1);

        inbuf.call_when_readable(&mut scheduler);
        let first = inbuf.pending_tickets();
        inbuf.call_when_readable(&mut scheduler);
        let second = inbuf.pending_tickets();
        assert_ne!(first, second);

        // Only the second registration is ever delivered.
        let ticket = scheduler.wait();
        assert_ne!(Some(ticket), first.0);
        assert_ne!(Some(ticket), first.1);
        assert!(inbuf.on_event(&mut scheduler, ticket));
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn starved_buffer_reports_insufficient_throughput() {
        let mut scheduler = Scheduler::new(SelectorFactory::Poll);
        let mut inbuf = NbInbuf::new(Box::new(PendingSource), 64);
        inbuf.enable_throughput_checking(ThroughputSettings {
            min_bytes_per_tick: 1,
            low_ticks_limit: 2,
            tick_length: Duration::from_millis(5),
        });

        wait_until_readable(&mut inbuf, &mut scheduler);
        assert_eq!(
            inbuf.error_status(),
            ErrorStatus::InsufficientThroughput
        );
        assert!(inbuf.readable());
        assert_eq!(inbuf.peek(), None);
    }
}
