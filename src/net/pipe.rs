// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::io;
use std::os::unix::io::RawFd;

//==============================================================================
// Event Pipe
//==============================================================================

/// A self-pipe used to break a scheduler's `wait()` from another thread or
/// from signal context. The write side is async-signal-safe; the read side
/// can be watched by a scheduler.
pub struct EventPipe {
    read_fd: RawFd,
    write_fd: RawFd,
}

/// Associate functions for [EventPipe].
impl EventPipe {
    pub fn new() -> io::Result<Self> {
        let mut fds = [0 as libc::c_int; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            read_fd: fds[0],
            write_fd: fds[1],
        })
    }

    /// Makes writes non-blocking, so a raise from signal context can never
    /// stall on a full pipe.
    pub fn set_write_nonblocking(&self) {
        unsafe {
            let flags = libc::fcntl(self.write_fd, libc::F_GETFL);
            libc::fcntl(self.write_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
    }

    /// Writes a single byte. Returns false if the pipe is full or broken.
    /// This function is signal- and thread-safe.
    pub fn write_byte(&self, byte: u8) -> bool {
        let buf = [byte];
        let rc = unsafe {
            libc::write(self.write_fd, buf.as_ptr() as *const libc::c_void, 1)
        };
        rc == 1
    }

    /// Reads a single byte, blocking until one is available. Returns `None`
    /// on EOF.
    pub fn read_byte(&self) -> Option<u8> {
        let mut buf = [0u8];
        loop {
            let rc = unsafe {
                libc::read(self.read_fd, buf.as_mut_ptr() as *mut libc::c_void, 1)
            };
            if rc == 1 {
                return Some(buf[0]);
            }
            if rc == 0 {
                return None;
            }
            let e = io::Error::last_os_error();
            if e.kind() != io::ErrorKind::Interrupted {
                return None;
            }
        }
    }

    pub fn read_fd(&self) -> RawFd {
        self.read_fd
    }
}

/// Drop trait implementation for [EventPipe].
impl Drop for EventPipe {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

unsafe impl Send for EventPipe {}
unsafe impl Sync for EventPipe {}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trip() {
        let pipe = EventPipe::new().unwrap();
        assert!(pipe.write_byte(b'*'));
        assert_eq!(pipe.read_byte(), Some(b'*'));
    }
}
