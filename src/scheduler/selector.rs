// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::fail::ErrorStatus;

use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

#[cfg(target_os = "linux")]
use std::collections::HashMap;

//==============================================================================
// Constants & Structures
//==============================================================================

/// Readiness condition a watch waits for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Interest {
    Readable,
    Writable,
}

/// A single one-shot file descriptor watch, identified by the scheduler's
/// ticket id.
#[derive(Clone, Copy, Debug)]
pub struct FdWatch {
    pub id: u64,
    pub fd: RawFd,
    pub interest: Interest,
}

/// OS event demultiplexer. The scheduler hands the selector its current
/// watch set on every call; the selector reports the ids of the watches
/// whose condition holds. Spurious reports are permitted.
pub trait Selector: Send {
    fn select(
        &mut self,
        watches: &[FdWatch],
        timeout: Option<Duration>,
        fired: &mut Vec<u64>,
    ) -> Result<(), ErrorStatus>;
}

/// Configuration knob selecting the selector implementation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SelectorFactory {
    Poll,
    #[cfg(target_os = "linux")]
    Epoll,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate functions for [SelectorFactory].
impl SelectorFactory {
    pub fn create(self) -> Box<dyn Selector> {
        match self {
            SelectorFactory::Poll => Box::new(PollSelector::new()),
            #[cfg(target_os = "linux")]
            SelectorFactory::Epoll => Box::new(EpollSelector::new()),
        }
    }
}

/// Default trait implementation for [SelectorFactory].
impl Default for SelectorFactory {
    fn default() -> Self {
        SelectorFactory::Poll
    }
}

/// Display trait implementation for [SelectorFactory].
impl fmt::Display for SelectorFactory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SelectorFactory::Poll => write!(f, "poll"),
            #[cfg(target_os = "linux")]
            SelectorFactory::Epoll => write!(f, "epoll"),
        }
    }
}

/// Converts an optional timeout to poll(2)-style milliseconds, rounding up
/// so a short positive timeout never degrades to a busy spin.
fn timeout_millis(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(d) => {
            let mut ms = d.as_millis();
            if ms == 0 && d > Duration::from_millis(0) {
                ms = 1;
            }
            if ms > i32::max_value() as u128 {
                ms = i32::max_value() as u128;
            }
            ms as i32
        }
    }
}

//==============================================================================
// Poll Selector
//==============================================================================

/// Portable selector built on poll(2).
pub struct PollSelector {
    pollfds: Vec<libc::pollfd>,
}

/// Associate functions for [PollSelector].
impl PollSelector {
    pub fn new() -> Self {
        Self {
            pollfds: Vec::new(),
        }
    }
}

/// Selector trait implementation for [PollSelector].
impl Selector for PollSelector {
    fn select(
        &mut self,
        watches: &[FdWatch],
        timeout: Option<Duration>,
        fired: &mut Vec<u64>,
    ) -> Result<(), ErrorStatus> {
        self.pollfds.clear();
        for watch in watches {
            let events = match watch.interest {
                Interest::Readable => libc::POLLIN,
                Interest::Writable => libc::POLLOUT,
            };
            self.pollfds.push(libc::pollfd {
                fd: watch.fd,
                events,
                revents: 0,
            });
        }

        let rc = unsafe {
            libc::poll(
                self.pollfds.as_mut_ptr(),
                self.pollfds.len() as libc::nfds_t,
                timeout_millis(timeout),
            )
        };
        if rc < 0 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(ErrorStatus::from_io_error(&e));
        }

        for (watch, pollfd) in watches.iter().zip(self.pollfds.iter()) {
            if pollfd.revents != 0 {
                fired.push(watch.id);
            }
        }

        Ok(())
    }
}

//==============================================================================
// Epoll Selector
//==============================================================================

/// Linux selector built on epoll(7). The kernel-side registration set is
/// kept in sync with the watch set the scheduler passes in; watches sharing
/// a file descriptor are folded into one combined registration.
#[cfg(target_os = "linux")]
pub struct EpollSelector {
    epfd: RawFd,
    registered: HashMap<RawFd, u32>,
}

#[cfg(target_os = "linux")]
impl EpollSelector {
    pub fn new() -> Self {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        assert!(epfd >= 0, "epoll_create1 failed");
        Self {
            epfd,
            registered: HashMap::new(),
        }
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, events: u32) -> io::Result<()> {
        let mut ev = libc::epoll_event {
            events,
            u64: fd as u64,
        };
        let rc = unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut ev) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl Selector for EpollSelector {
    fn select(
        &mut self,
        watches: &[FdWatch],
        timeout: Option<Duration>,
        fired: &mut Vec<u64>,
    ) -> Result<(), ErrorStatus> {
        // Fold the watch set into per-fd interest masks.
        let mut wanted: HashMap<RawFd, u32> = HashMap::new();
        for watch in watches {
            let bits = match watch.interest {
                Interest::Readable => libc::EPOLLIN as u32,
                Interest::Writable => libc::EPOLLOUT as u32,
            };
            *wanted.entry(watch.fd).or_insert(0) |= bits;
        }

        // Sync the kernel registration set.
        let stale: Vec<RawFd> = self
            .registered
            .keys()
            .filter(|fd| !wanted.contains_key(*fd))
            .cloned()
            .collect();
        for fd in stale {
            let _ = self.ctl(libc::EPOLL_CTL_DEL, fd, 0);
            self.registered.remove(&fd);
        }
        for (&fd, &events) in wanted.iter() {
            match self.registered.get(&fd) {
                Some(&old) if old == events => {}
                Some(_) => {
                    self.ctl(libc::EPOLL_CTL_MOD, fd, events)
                        .map_err(|e| ErrorStatus::from_io_error(&e))?;
                    self.registered.insert(fd, events);
                }
                None => {
                    self.ctl(libc::EPOLL_CTL_ADD, fd, events)
                        .map_err(|e| ErrorStatus::from_io_error(&e))?;
                    self.registered.insert(fd, events);
                }
            }
        }

        let mut events = [libc::epoll_event { events: 0, u64: 0 }; 64];
        let rc = unsafe {
            libc::epoll_wait(
                self.epfd,
                events.as_mut_ptr(),
                events.len() as libc::c_int,
                timeout_millis(timeout),
            )
        };
        if rc < 0 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(ErrorStatus::from_io_error(&e));
        }

        for ev in events.iter().take(rc as usize) {
            let fd = ev.u64 as RawFd;
            let readable = ev.events & (libc::EPOLLIN as u32 | libc::EPOLLHUP as u32
                | libc::EPOLLERR as u32) != 0;
            let writable = ev.events & (libc::EPOLLOUT as u32 | libc::EPOLLHUP as u32
                | libc::EPOLLERR as u32) != 0;
            for watch in watches {
                if watch.fd != fd {
                    continue;
                }
                let hit = match watch.interest {
                    Interest::Readable => readable,
                    Interest::Writable => writable,
                };
                if hit {
                    fired.push(watch.id);
                }
            }
        }

        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl Drop for EpollSelector {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}
