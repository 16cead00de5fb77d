// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Single-threaded event multiplexing. Each worker thread owns one
//! [Scheduler]; the dispatcher core owns another. A scheduler hands out
//! one-shot alarms and file-descriptor readiness watches, identified by
//! cancellation tickets, and `wait()` blocks until it can hand back exactly
//! one fired ticket for the caller to dispatch.

mod selector;

pub use self::selector::{FdWatch, Interest, Selector, SelectorFactory};

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

//==============================================================================
// Constants & Structures
//==============================================================================

/// Category of a scheduled callback.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TicketKind {
    Alarm,
    Readable,
    Writable,
}

/// Handle for a scheduled event. Valid for cancellation only until the
/// ticket is returned by `wait()`; callers always cancel before the next
/// `wait()`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Ticket {
    kind: TicketKind,
    id: u64,
}

/// Associate functions for [Ticket].
impl Ticket {
    pub fn kind(self) -> TicketKind {
        self.kind
    }
}

/// Per-thread event scheduler: an alarm queue plus an fd watch set behind a
/// pluggable [Selector].
pub struct Scheduler {
    selector: Box<dyn Selector>,
    next_id: u64,
    alarms: HashMap<u64, Instant>,
    alarm_queue: BinaryHeap<Reverse<(Instant, u64)>>,
    watches: Vec<FdWatch>,
    ready: VecDeque<Ticket>,
    fired: Vec<u64>,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate functions for [Scheduler].
impl Scheduler {
    /// Creates a scheduler using the selector produced by `factory`.
    pub fn new(factory: SelectorFactory) -> Self {
        Self {
            selector: factory.create(),
            next_id: 0,
            alarms: HashMap::new(),
            alarm_queue: BinaryHeap::new(),
            watches: Vec::new(),
            ready: VecDeque::new(),
            fired: Vec::new(),
        }
    }

    fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Schedules a one-shot callback at or after `when`. Alarms fire in
    /// deadline order; ties are broken by insertion order.
    pub fn call_alarm(&mut self, when: Instant) -> Ticket {
        let id = self.fresh_id();
        self.alarms.insert(id, when);
        self.alarm_queue.push(Reverse((when, id)));
        Ticket {
            kind: TicketKind::Alarm,
            id,
        }
    }

    /// Schedules a one-shot callback at or after `timeout` from now.
    pub fn call_alarm_in(&mut self, timeout: Duration) -> Ticket {
        self.call_alarm(Instant::now() + timeout)
    }

    /// Schedules a one-shot callback for when `fd` is ready for reading.
    /// Spurious wakeups are permitted; callers must tolerate them.
    pub fn call_when_readable(&mut self, fd: RawFd) -> Ticket {
        let id = self.fresh_id();
        self.watches.push(FdWatch {
            id,
            fd,
            interest: Interest::Readable,
        });
        Ticket {
            kind: TicketKind::Readable,
            id,
        }
    }

    /// Schedules a one-shot callback for when `fd` is ready for writing.
    pub fn call_when_writable(&mut self, fd: RawFd) -> Ticket {
        let id = self.fresh_id();
        self.watches.push(FdWatch {
            id,
            fd,
            interest: Interest::Writable,
        });
        Ticket {
            kind: TicketKind::Writable,
            id,
        }
    }

    /// Cancels a pending event before it is delivered by `wait()`.
    pub fn cancel(&mut self, ticket: Ticket) {
        match ticket.kind {
            TicketKind::Alarm => {
                self.alarms.remove(&ticket.id);
            }
            TicketKind::Readable | TicketKind::Writable => {
                self.watches.retain(|w| w.id != ticket.id);
            }
        }
        self.ready.retain(|t| t.id != ticket.id);
    }

    /// Tells if any alarm or watch is pending.
    pub fn has_pending(&self) -> bool {
        !self.ready.is_empty() || !self.alarms.is_empty() || !self.watches.is_empty()
    }

    /// Blocks until at least one scheduled event is ready and returns its
    /// ticket. Each ticket is returned exactly once.
    ///
    /// Panics if nothing is pending; callers register before waiting.
    pub fn wait(&mut self) -> Ticket {
        loop {
            if let Some(ticket) = self.ready.pop_front() {
                return ticket;
            }

            assert!(
                !self.alarms.is_empty() || !self.watches.is_empty(),
                "scheduler: wait() without pending events"
            );

            let now = Instant::now();
            self.collect_due_alarms(now);
            if !self.ready.is_empty() {
                continue;
            }

            // Stale queue heads (cancelled alarms) may shorten the timeout;
            // the loop re-checks, so that is only a spurious iteration.
            let timeout = self
                .alarm_queue
                .peek()
                .map(|Reverse((when, _))| when.saturating_duration_since(now));

            self.fired.clear();
            if let Err(status) = self.selector.select(&self.watches, timeout, &mut self.fired)
            {
                panic!("scheduler: selector failure: {}", status);
            }

            for i in 0..self.fired.len() {
                let id = self.fired[i];
                if let Some(pos) = self.watches.iter().position(|w| w.id == id) {
                    let watch = self.watches.swap_remove(pos);
                    let kind = match watch.interest {
                        Interest::Readable => TicketKind::Readable,
                        Interest::Writable => TicketKind::Writable,
                    };
                    self.ready.push_back(Ticket { kind, id });
                }
            }

            self.collect_due_alarms(Instant::now());
        }
    }

    fn collect_due_alarms(&mut self, now: Instant) {
        while let Some(&Reverse((when, id))) = self.alarm_queue.peek() {
            if when > now {
                break;
            }
            self.alarm_queue.pop();
            // Skip heap entries whose alarm was cancelled or re-armed.
            if self.alarms.get(&id) == Some(&when) {
                self.alarms.remove(&id);
                self.ready.push_back(Ticket {
                    kind: TicketKind::Alarm,
                    id,
                });
            }
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarms_fire_in_deadline_order() {
        let mut scheduler = Scheduler::new(SelectorFactory::Poll);
        let now = Instant::now();
        let late = scheduler.call_alarm(now + Duration::from_millis(20));
        let early = scheduler.call_alarm(now + Duration::from_millis(1));
        assert_eq!(scheduler.wait(), early);
        assert_eq!(scheduler.wait(), late);
    }

    #[test]
    fn alarm_ties_fire_in_insertion_order() {
        let mut scheduler = Scheduler::new(SelectorFactory::Poll);
        let when = Instant::now() + Duration::from_millis(1);
        let first = scheduler.call_alarm(when);
        let second = scheduler.call_alarm(when);
        assert_eq!(scheduler.wait(), first);
        assert_eq!(scheduler.wait(), second);
    }

    #[test]
    fn cancelled_alarm_never_fires() {
        let mut scheduler = Scheduler::new(SelectorFactory::Poll);
        let now = Instant::now();
        let doomed = scheduler.call_alarm(now + Duration::from_millis(1));
        let kept = scheduler.call_alarm(now + Duration::from_millis(2));
        scheduler.cancel(doomed);
        assert_eq!(scheduler.wait(), kept);
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn tickets_are_unique() {
        let mut scheduler = Scheduler::new(SelectorFactory::Poll);
        let a = scheduler.call_alarm_in(Duration::from_millis(1));
        let b = scheduler.call_alarm_in(Duration::from_millis(1));
        assert_ne!(a, b);
    }
}
