// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::fmt;
use std::sync::Arc;

//==============================================================================
// Backend
//==============================================================================

/// Initializes a stderr logging backend honoring `RUST_LOG`; `info` when
/// unset. Safe to call more than once.
pub fn init_logging() {
    flexi_logger::Logger::with_env_or_str("info").start().ok();
}

//==============================================================================
// Logging Context
//==============================================================================

/// A label identifying the connection or actor a log record belongs to.
/// Handlers and the dispatcher thread log records through the `log` facade;
/// the context supplies the entity prefix so that records from concurrent
/// connections can be told apart.
#[derive(Clone)]
pub struct LoggingContext {
    name: Arc<String>,
}

/// Associate functions for [LoggingContext].
impl LoggingContext {
    /// Creates a logging context labeled `name`.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: Arc::new(name.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Display trait implementation for [LoggingContext].
impl fmt::Display for LoggingContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Debug trait implementation for [LoggingContext].
impl fmt::Debug for LoggingContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LoggingContext({})", self.name)
    }
}
