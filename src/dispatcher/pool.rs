// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::dispatcher::wakeup::WakeupFlag;
use crate::sync::Interrupter;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;

//==============================================================================
// Constants & Structures
//==============================================================================

/// What a pooled worker knows about itself: its id and the wakeup flag
/// through which the pool (or anyone) can interrupt it.
#[derive(Clone)]
pub struct WorkerHandle {
    pub id: usize,
    pub wakeup: Arc<WakeupFlag>,
}

struct PoolWorker {
    wakeup: Arc<WakeupFlag>,
    handle: Option<thread::JoinHandle<()>>,
}

struct PoolInner {
    frozen: bool,
    workers: Vec<PoolWorker>,
}

/// A growable, bounded pool of dispatcher worker threads.
pub struct ThreadPool {
    max_size: usize,
    inner: Mutex<PoolInner>,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate functions for [ThreadPool].
impl ThreadPool {
    /// Creates a pool bounded at `max_size` threads; 0 means unbounded.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            inner: Mutex::new(PoolInner {
                frozen: false,
                workers: Vec::new(),
            }),
        }
    }

    /// Starts one more worker running `f`, unless the pool is frozen or at
    /// capacity. Returns whether a thread was started.
    pub fn add<F>(&self, f: F) -> bool
    where
        F: FnOnce(WorkerHandle) + Send + 'static,
    {
        let mut inner = self.inner.lock().unwrap();

        if inner.frozen || (self.max_size != 0 && inner.workers.len() == self.max_size) {
            return false;
        }

        let wakeup = match WakeupFlag::new() {
            Ok(flag) => Arc::new(flag),
            Err(e) => {
                error!("thread pool: cannot create wakeup flag: {}", e);
                return false;
            }
        };
        let worker = WorkerHandle {
            id: inner.workers.len(),
            wakeup: wakeup.clone(),
        };

        let handle = thread::spawn(move || {
            // A panicking worker would leave the dispatcher's shared state
            // wedged; treat it as fatal.
            if catch_unwind(AssertUnwindSafe(|| f(worker))).is_err() {
                error!("FATAL: panic in dispatcher thread");
                std::process::abort();
            }
        });

        inner.workers.push(PoolWorker {
            wakeup,
            handle: Some(handle),
        });

        if self.max_size > 1 && inner.workers.len() == self.max_size {
            warn!(
                "maximum thread pool size ({}) reached; concurrent requests may be delayed",
                self.max_size
            );
        }

        true
    }

    /// Freezes the pool, interrupts every worker, and joins them all.
    /// Thread-safe.
    pub fn join(&self) {
        let workers = {
            let mut inner = self.inner.lock().unwrap();
            inner.frozen = true;
            std::mem::replace(&mut inner.workers, Vec::new())
        };

        for mut worker in workers {
            worker.wakeup.raise();
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
