// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::fail::ErrorStatus;

use std::time::{Duration, Instant};

//==============================================================================
// Constants & Structures
//==============================================================================

/// Throughput enforcement settings. The throughput is considered too low
/// when fewer than `min_bytes_per_tick` bytes were transferred during each
/// of `low_ticks_limit` consecutive ticks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ThroughputSettings {
    pub min_bytes_per_tick: usize,
    pub low_ticks_limit: u32,
    pub tick_length: Duration,
}

/// Default trait implementation for [ThroughputSettings].
impl Default for ThroughputSettings {
    fn default() -> Self {
        Self {
            min_bytes_per_tick: 512,
            low_ticks_limit: 120,
            tick_length: Duration::from_secs(1),
        }
    }
}

/// Rolling throughput monitor attached to a non-blocking buffer.
#[derive(Debug)]
pub struct ThroughputChecker {
    settings: ThroughputSettings,
    next_tick: Instant,
    current_tick_bytes: usize,
    n_low_ticks: u32,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate functions for [ThroughputChecker].
impl ThroughputChecker {
    pub fn new(settings: ThroughputSettings, now: Instant) -> Self {
        assert!(settings.tick_length > Duration::from_millis(0));
        Self {
            next_tick: now + settings.tick_length,
            settings,
            current_tick_bytes: 0,
            n_low_ticks: 0,
        }
    }

    /// The time of the next tick, which is a good moment to check for low
    /// throughput.
    pub fn next_tick(&self) -> Instant {
        self.next_tick
    }

    /// Records a data transfer, returning a non-ok status when the
    /// throughput is determined to be too low. Specify `n_bytes` as 0 to
    /// check without recording a transfer. Overdue ticks are accounted for
    /// before the transfer is recorded.
    pub fn record_transfer(&mut self, n_bytes: usize, now: Instant) -> ErrorStatus {
        while self.next_tick <= now {
            if self.n_low_ticks < self.settings.low_ticks_limit {
                if self.current_tick_bytes < self.settings.min_bytes_per_tick {
                    self.n_low_ticks += 1;
                } else {
                    self.n_low_ticks = 0;
                }
            }
            self.current_tick_bytes = 0;
            self.next_tick += self.settings.tick_length;
        }

        if n_bytes < self.settings.min_bytes_per_tick - self.current_tick_bytes {
            self.current_tick_bytes += n_bytes;
        } else {
            self.current_tick_bytes = self.settings.min_bytes_per_tick;
        }

        if self.n_low_ticks < self.settings.low_ticks_limit {
            ErrorStatus::Ok
        } else {
            ErrorStatus::InsufficientThroughput
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ThroughputSettings {
        ThroughputSettings {
            min_bytes_per_tick: 100,
            low_ticks_limit: 3,
            tick_length: Duration::from_secs(1),
        }
    }

    #[test]
    fn starving_reader_fails_after_limit() {
        let start = Instant::now();
        let mut checker = ThroughputChecker::new(settings(), start);

        let mut now = start;
        for _ in 0..2 {
            now += Duration::from_secs(1);
            assert!(checker.record_transfer(0, now).is_ok());
        }
        now += Duration::from_secs(1);
        assert_eq!(
            checker.record_transfer(0, now),
            ErrorStatus::InsufficientThroughput
        );
    }

    #[test]
    fn satisfied_tick_resets_low_count() {
        let start = Instant::now();
        let mut checker = ThroughputChecker::new(settings(), start);

        let mut now = start;
        // Two low ticks...
        now += Duration::from_secs(2);
        assert!(checker.record_transfer(0, now).is_ok());
        // ...then a tick that meets the minimum...
        assert!(checker.record_transfer(100, now).is_ok());
        // ...buys another low_ticks_limit worth of patience.
        now += Duration::from_secs(3);
        assert!(checker.record_transfer(0, now).is_ok());
        now += Duration::from_secs(1);
        assert_eq!(
            checker.record_transfer(0, now),
            ErrorStatus::InsufficientThroughput
        );
    }

    #[test]
    fn meeting_minimum_every_tick_never_fails() {
        let start = Instant::now();
        let mut checker = ThroughputChecker::new(settings(), start);

        let mut now = start;
        for _ in 0..1000 {
            assert!(checker.record_transfer(100, now).is_ok());
            now += Duration::from_secs(1);
        }
    }

    #[test]
    fn sticky_after_limit() {
        let start = Instant::now();
        let mut checker = ThroughputChecker::new(settings(), start);

        let now = start + Duration::from_secs(10);
        assert_eq!(
            checker.record_transfer(0, now),
            ErrorStatus::InsufficientThroughput
        );
        // Even a generous transfer does not clear the verdict.
        assert_eq!(
            checker.record_transfer(1000, now),
            ErrorStatus::InsufficientThroughput
        );
    }
}
