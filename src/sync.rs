// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex};

//==============================================================================
// Fair Lock
//==============================================================================

/// Something an urgent lock acquirer can poke to break the lock holder out
/// of a blocking wait.
pub trait Interrupter {
    /// Signal- and thread-safe.
    fn raise(&self);

    /// Consumes one raise; returns whether the flag was up.
    fn lower(&self) -> bool;
}

struct LockState {
    locked: bool,
    n_urgent_waiters: u32,
}

/// A two-level fair lock: one mutex, two condition variables, one urgent
/// waiter counter. Normal acquirers yield to urgent waiters; an urgent
/// acquirer finding the lock held raises the interrupter so the holder
/// (typically blocked in a scheduler `wait`) lets go. This lock and the
/// interrupter's pipe are the only cross-thread synchronization in the
/// dispatcher.
pub struct FairLock<T> {
    state: Mutex<LockState>,
    unlocked_with_urgent_waiters: Condvar,
    unlocked_without_urgent_waiters: Condvar,
    cell: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for FairLock<T> {}
unsafe impl<T: Send> Sync for FairLock<T> {}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate functions for [FairLock].
impl<T> FairLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(LockState {
                locked: false,
                n_urgent_waiters: 0,
            }),
            unlocked_with_urgent_waiters: Condvar::new(),
            unlocked_without_urgent_waiters: Condvar::new(),
            cell: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, waiting while it is held or urgent waiters are
    /// queued.
    pub fn normal_lock(&self) -> FairGuard<T> {
        let mut state = self.state.lock().unwrap();
        while state.locked || state.n_urgent_waiters != 0 {
            state = self.unlocked_without_urgent_waiters.wait(state).unwrap();
        }
        state.locked = true;
        FairGuard { lock: self }
    }

    /// Acquires the lock ahead of any normal waiter. If the lock is held,
    /// the interrupter is raised to break the holder out of its wait, and
    /// lowered once the lock is ours.
    pub fn urgent_lock<I: Interrupter>(&self, interrupter: &I) -> FairGuard<T> {
        let mut state = self.state.lock().unwrap();
        if state.locked {
            state.n_urgent_waiters += 1;
            interrupter.raise();

            while state.locked {
                state = self.unlocked_with_urgent_waiters.wait(state).unwrap();
            }

            let was_up = interrupter.lower();
            debug_assert!(was_up);
            state.n_urgent_waiters -= 1;
        }
        state.locked = true;
        FairGuard { lock: self }
    }

    fn unlock(&self) {
        let had_urgent_waiters;
        {
            let mut state = self.state.lock().unwrap();
            debug_assert!(state.locked);
            had_urgent_waiters = state.n_urgent_waiters != 0;
            state.locked = false;
        }

        if had_urgent_waiters {
            self.unlocked_with_urgent_waiters.notify_one();
        } else {
            self.unlocked_without_urgent_waiters.notify_one();
        }
    }
}

//==============================================================================
// Guard
//==============================================================================

/// RAII guard for [FairLock]; releases on drop.
pub struct FairGuard<'a, T> {
    lock: &'a FairLock<T>,
}

impl<'a, T> Deref for FairGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.cell.get() }
    }
}

impl<'a, T> DerefMut for FairGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.cell.get() }
    }
}

impl<'a, T> Drop for FairGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    struct CountingInterrupter {
        raised: AtomicU32,
    }

    impl Interrupter for CountingInterrupter {
        fn raise(&self) {
            self.raised.fetch_add(1, Ordering::SeqCst);
        }

        fn lower(&self) -> bool {
            let mut old = self.raised.load(Ordering::SeqCst);
            while old != 0 {
                match self.raised.compare_exchange_weak(
                    old,
                    old - 1,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => return true,
                    Err(v) => old = v,
                }
            }
            false
        }
    }

    #[test]
    fn exclusion() {
        let lock = Arc::new(FairLock::new(0u32));
        let mut threads = Vec::new();
        for _ in 0..4 {
            let lock = lock.clone();
            threads.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let mut guard = lock.normal_lock();
                    *guard += 1;
                }
            }));
        }
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(*lock.normal_lock(), 4000);
    }

    #[test]
    fn urgent_acquirer_raises_and_lowers() {
        let lock = Arc::new(FairLock::new(()));
        let interrupter = Arc::new(CountingInterrupter {
            raised: AtomicU32::new(0),
        });

        let guard = lock.normal_lock();
        let urgent = {
            let lock = lock.clone();
            let interrupter = interrupter.clone();
            thread::spawn(move || {
                let _guard = lock.urgent_lock(&*interrupter);
            })
        };

        // Wait for the urgent waiter to raise the flag, then release.
        while interrupter.raised.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        drop(guard);

        urgent.join().unwrap();
        assert_eq!(interrupter.raised.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn uncontended_urgent_lock_does_not_raise() {
        let lock = FairLock::new(());
        let interrupter = CountingInterrupter {
            raised: AtomicU32::new(0),
        };
        let _guard = lock.urgent_lock(&interrupter);
        assert_eq!(interrupter.raised.load(Ordering::SeqCst), 0);
    }
}
