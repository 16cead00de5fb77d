// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::wire::RemoteError;

use custom_error::custom_error;

use std::fmt;
use std::io;

//==============================================================================
// Error Status
//==============================================================================

/// Low-level status of a non-blocking buffer or socket operation. Once a
/// buffer records a non-ok status, the status is sticky: reads turn into EOF
/// and writes are absorbed and dropped.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum ErrorStatus {
    /// No error.
    Ok,
    /// OS-reported error (raw errno value).
    System(i32),
    /// The peer failed to sustain the configured minimum throughput.
    InsufficientThroughput,
}

/// Associate functions for [ErrorStatus].
impl ErrorStatus {
    pub fn is_ok(self) -> bool {
        self == ErrorStatus::Ok
    }

    /// Translates an I/O error into a status value. `WouldBlock` is not an
    /// error at this level; callers report it through a distinguished
    /// sentinel instead.
    pub fn from_io_error(e: &io::Error) -> ErrorStatus {
        ErrorStatus::System(e.raw_os_error().unwrap_or(libc::EIO))
    }

    pub fn last_os_error() -> ErrorStatus {
        ErrorStatus::from_io_error(&io::Error::last_os_error())
    }
}

/// Default trait implementation for [ErrorStatus].
impl Default for ErrorStatus {
    fn default() -> Self {
        ErrorStatus::Ok
    }
}

/// Display trait implementation for [ErrorStatus].
impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ErrorStatus::Ok => write!(f, "no error"),
            ErrorStatus::System(code) => {
                write!(f, "{}", io::Error::from_raw_os_error(code))
            }
            ErrorStatus::InsufficientThroughput => {
                write!(f, "insufficient throughput")
            }
        }
    }
}

//==============================================================================
// Fail
//==============================================================================

custom_error! {pub Fail
    Parse{details: String} = "parse error: {details}",
    Io{status: ErrorStatus} = "i/o error: {status}",
    Method{details: String} = "{details}",
    Remote{error: RemoteError} = "remote error: {error}",
    Address{details: String} = "address error: {details}"
}

/// Associate functions for [Fail]. Readers and writers deliver exactly one
/// outcome to their caller: a value or one of these.
impl Fail {
    pub fn parse<S: Into<String>>(details: S) -> Fail {
        Fail::Parse {
            details: details.into(),
        }
    }

    pub fn method<S: Into<String>>(details: S) -> Fail {
        Fail::Method {
            details: details.into(),
        }
    }

    pub fn address<S: Into<String>>(details: S) -> Fail {
        Fail::Address {
            details: details.into(),
        }
    }

    /// The remote error carried by this failure, if it is one.
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            Fail::Remote { error } => Some(error),
            _ => None,
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
    fn status_truthiness() {
        assert!(ErrorStatus::Ok.is_ok());
        assert!(!ErrorStatus::System(libc::EPIPE).is_ok());
        assert!(!ErrorStatus::InsufficientThroughput.is_ok());
    }

    #[test]
    fn status_ordering() {
        assert!(ErrorStatus::Ok < ErrorStatus::System(1));
        assert_eq!(ErrorStatus::System(2), ErrorStatus::System(2));
        assert_ne!(ErrorStatus::System(2), ErrorStatus::System(3));
    }

    #[test]
    fn status_prints() {
        assert_eq!(format!("{}", ErrorStatus::Ok), "no error");
        assert_eq!(
            format!("{}", ErrorStatus::InsufficientThroughput),
            "insufficient throughput"
        );
    }
}
