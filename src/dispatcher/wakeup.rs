// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::net::EventPipe;
use crate::sync::Interrupter;

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU32, Ordering};

//==============================================================================
// Wakeup Flag
//==============================================================================

/// A counter plus self-pipe used to break a scheduler's `wait()` from
/// outside its thread. `raise` and `lower` are signal- and thread-safe;
/// the pipe's read side is watched by the scheduler that is to be woken.
pub struct WakeupFlag {
    counter: AtomicU32,
    pipe: EventPipe,
}

/// Associate functions for [WakeupFlag].
impl WakeupFlag {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            counter: AtomicU32::new(0),
            pipe: EventPipe::new()?,
        })
    }

    /// Tells if the flag is up. Signal- and thread-safe.
    pub fn is_up(&self) -> bool {
        self.counter.load(Ordering::Acquire) != 0
    }

    /// The file descriptor that becomes readable while the flag is up.
    pub fn read_fd(&self) -> RawFd {
        self.pipe.read_fd()
    }
}

/// Interrupter trait implementation for [WakeupFlag].
impl Interrupter for WakeupFlag {
    fn raise(&self) {
        if self.counter.fetch_add(1, Ordering::AcqRel) == 0 {
            let written = self.pipe.write_byte(b'*');
            debug_assert!(written);
        }
    }

    fn lower(&self) -> bool {
        let mut old = self.counter.load(Ordering::Acquire);
        while old != 0 {
            match self.counter.compare_exchange_weak(
                old,
                old - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(v) => old = v,
            }
        }

        if old == 1 {
            let byte = self.pipe.read_byte();
            debug_assert_eq!(byte, Some(b'*'));
        }

        old != 0
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_lower_balance() {
        let flag = WakeupFlag::new().unwrap();
        assert!(!flag.is_up());

        flag.raise();
        flag.raise();
        assert!(flag.is_up());

        assert!(flag.lower());
        assert!(flag.is_up());
        assert!(flag.lower());
        assert!(!flag.is_up());
        assert!(!flag.lower());
    }
}
