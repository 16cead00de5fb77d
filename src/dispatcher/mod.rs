// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The dispatcher: serves many TCP endpoints and many concurrent
//! connections with a bounded pool of worker threads.
//!
//! A single core scheduler owns the listener watches and the readable
//! watches of all monitored connections. A worker thread that wants the
//! next request calls `select_client` under the core lock; a worker
//! returning a served connection takes the lock urgently, raising the
//! wakeup flag so the core's `wait()` lets go. Each worker drives one
//! request handler to completion on its own scheduler.

mod pool;
mod wakeup;

pub use self::pool::{ThreadPool, WorkerHandle};
pub use self::wakeup::WakeupFlag;

use crate::buffers::{tcp_buffers, NbInbuf, NbOutbuf, ThroughputSettings, DEFAULT_BUFSIZE};
use crate::fail::Fail;
use crate::logging::LoggingContext;
use crate::net::{Endpoint, EventPipe, TcpAcceptor, TcpConnection};
use crate::rpc::{MethodMap, RequestHandler};
use crate::scheduler::{Scheduler, SelectorFactory, Ticket};
use crate::sync::{FairLock, Interrupter};
use crate::wire::Status;

use slab::Slab;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

//==============================================================================
// Constants & Structures
//==============================================================================

/// Dispatcher tuning knobs.
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Buffer capacity for each connection's buffer pair.
    pub bufsize: usize,
    /// Upper bound on monitored connections; 0 means unbounded. When the
    /// bound is hit, the least recently active connection is evicted.
    pub max_connections: usize,
    /// Upper bound on worker threads; 0 means unbounded.
    pub max_thread_pool_size: usize,
    /// Throughput requirements enforced while a request is being handled.
    pub throughput_settings: ThroughputSettings,
    /// Selector implementation for every scheduler the dispatcher creates.
    pub selector: SelectorFactory,
}

/// Default trait implementation for [DispatcherConfig].
impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            bufsize: DEFAULT_BUFSIZE,
            max_connections: 0,
            max_thread_pool_size: 0,
            throughput_settings: ThroughputSettings::default(),
            selector: SelectorFactory::default(),
        }
    }
}

/// One accepted server-side connection: the buffer pair, the method map in
/// effect for the listener that accepted it, and the logging label.
struct ServerConnection {
    ctx: LoggingContext,
    inbuf: NbInbuf,
    outbuf: NbOutbuf,
    map: Arc<MethodMap>,
    tracked_tickets: Vec<Ticket>,
}

/// Associate functions for [ServerConnection].
impl ServerConnection {
    fn new(conn: TcpConnection, bufsize: usize, map: Arc<MethodMap>) -> Self {
        let ctx = LoggingContext::new(format!("connection from {}", conn.peer_endpoint()));
        let (inbuf, outbuf) = tcp_buffers(conn, bufsize);
        Self {
            ctx,
            inbuf,
            outbuf,
            map,
            tracked_tickets: Vec::new(),
        }
    }
}

struct Listener {
    acceptor: TcpAcceptor,
    map: Arc<MethodMap>,
}

enum CoreEvent {
    Wakeup,
    Listener(usize),
    Conn(usize),
}

/// State owned by the dispatcher core, guarded by the fair lock.
struct CoreState {
    scheduler: Scheduler,
    listeners: Slab<Listener>,
    conns: Slab<ServerConnection>,
    /// Monitored connections, most recently active first.
    monitored: VecDeque<usize>,
    events: HashMap<Ticket, CoreEvent>,
    n_idle_threads: usize,
}

struct Shared {
    config: DispatcherConfig,
    core: FairLock<CoreState>,
    wakeup: WakeupFlag,
    stopping: AtomicBool,
    signal_pipe: EventPipe,
}

/// The dispatcher itself.
pub struct Dispatcher {
    shared: Arc<Shared>,
}

/// Signal-safe handle for stopping a running dispatcher.
#[derive(Clone)]
pub struct DispatcherControl {
    shared: Arc<Shared>,
}

//==============================================================================
// Core State
//==============================================================================

/// Associate functions for [CoreState].
impl CoreState {
    fn register_wakeup(&mut self, wakeup: &WakeupFlag) {
        let ticket = self.scheduler.call_when_readable(wakeup.read_fd());
        self.events.insert(ticket, CoreEvent::Wakeup);
    }

    fn register_listener(&mut self, key: usize) {
        let fd = self.listeners[key].acceptor.fd();
        let ticket = self.scheduler.call_when_readable(fd);
        self.events.insert(ticket, CoreEvent::Listener(key));
    }

    /// Re-records the event-map entries for a connection's buffer tickets
    /// after the buffer (re)registered its waits.
    fn sync_conn_tickets(&mut self, key: usize) {
        let old: Vec<Ticket> = self.conns[key].tracked_tickets.drain(..).collect();
        for ticket in old {
            self.events.remove(&ticket);
        }
        let (readable, alarm) = self.conns[key].inbuf.pending_tickets();
        for ticket in readable.into_iter().chain(alarm) {
            self.events.insert(ticket, CoreEvent::Conn(key));
            self.conns[key].tracked_tickets.push(ticket);
        }
    }

    fn scrub_conn_tickets(&mut self, key: usize) {
        let old: Vec<Ticket> = self.conns[key].tracked_tickets.drain(..).collect();
        for ticket in old {
            self.events.remove(&ticket);
        }
    }

    fn remove_from_monitored(&mut self, key: usize) {
        self.monitored.retain(|&k| k != key);
    }

    /// Drops a monitored connection, cancelling its watches.
    fn drop_connection(&mut self, key: usize) {
        self.remove_from_monitored(key);
        self.scrub_conn_tickets(key);
        let CoreState {
            ref mut scheduler,
            ref mut conns,
            ..
        } = *self;
        conns[key].inbuf.cancel_when_readable(scheduler);
        self.conns.remove(key);
    }

    /// Moves a connection from the worker back under the core's watch, or
    /// drops it on error or interruption. Admission of a fresh connection
    /// goes through the same path with `completed` set.
    fn resume_monitoring(
        &mut self,
        conn: ServerConnection,
        completed: bool,
        config: &DispatcherConfig,
    ) {
        if !completed {
            error!("request handling on {} interrupted", conn.ctx);
            return;
        }
        let status = conn.inbuf.error_status();
        if !status.is_ok() {
            error!("input error on {}: {}", conn.ctx, status);
            return;
        }
        let status = conn.outbuf.error_status();
        if !status.is_ok() {
            error!("output error on {}: {}", conn.ctx, status);
            return;
        }

        if config.max_connections != 0 && self.monitored.len() == config.max_connections {
            if let Some(&oldest) = self.monitored.back() {
                error!(
                    "maximum number of connections ({}) exceeded; \
                     evicting least recently active {}",
                    config.max_connections, self.conns[oldest].ctx
                );
                self.drop_connection(oldest);
            }
        }

        let key = self.conns.insert(conn);
        self.monitored.push_front(key);
        {
            let CoreState {
                ref mut scheduler,
                ref mut conns,
                ..
            } = *self;
            conns[key].inbuf.call_when_readable(scheduler);
        }
        self.sync_conn_tickets(key);
    }

    fn on_listener_ready(&mut self, key: usize, config: &DispatcherConfig) {
        let (accepted, status) = self.listeners[key].acceptor.accept();
        if !status.is_ok() {
            warn!(
                "failure to accept on endpoint {}: {}",
                self.listeners[key].acceptor.local_endpoint(),
                status
            );
        }

        if let Some(conn) = accepted {
            let conn =
                ServerConnection::new(conn, config.bufsize, self.listeners[key].map.clone());
            info!("accepted {}", conn.ctx);
            self.resume_monitoring(conn, true, config);
        }

        self.register_listener(key);
    }

    /// Blocks on the core scheduler until either a monitored connection
    /// has a request byte pending (returned for serving) or the wakeup
    /// flag was raised (`None`).
    fn select_client(
        &mut self,
        wakeup: &WakeupFlag,
        config: &DispatcherConfig,
    ) -> Option<usize> {
        loop {
            let ticket = self.scheduler.wait();
            let event = match self.events.remove(&ticket) {
                Some(event) => event,
                None => continue,
            };
            match event {
                CoreEvent::Wakeup => {
                    let up = wakeup.is_up();
                    self.register_wakeup(wakeup);
                    if up {
                        return None;
                    }
                }
                CoreEvent::Listener(key) => {
                    self.on_listener_ready(key, config);
                }
                CoreEvent::Conn(key) => {
                    let done = {
                        let CoreState {
                            ref mut scheduler,
                            ref mut conns,
                            ..
                        } = *self;
                        match conns.get_mut(key) {
                            Some(conn) => conn.inbuf.on_event(scheduler, ticket),
                            None => continue,
                        }
                    };
                    if !done {
                        self.sync_conn_tickets(key);
                        continue;
                    }

                    if self.conns[key].inbuf.peek().is_none() {
                        info!("end of input on {}", self.conns[key].ctx);
                        self.drop_connection(key);
                    } else {
                        self.remove_from_monitored(key);
                        self.scrub_conn_tickets(key);
                        return Some(key);
                    }
                }
            }
        }
    }
}

//==============================================================================
// Request Handling
//==============================================================================

/// Drives one request handler to completion on the worker's scheduler.
/// Returns false if the handler was interrupted or failed; the connection
/// is then in an unspecified intermediate state and must be dropped.
fn handle_request(
    scheduler: &mut Scheduler,
    worker: &WorkerHandle,
    conn: &mut ServerConnection,
    config: &DispatcherConfig,
) -> bool {
    conn.inbuf
        .enable_throughput_checking(config.throughput_settings);
    conn.outbuf
        .enable_throughput_checking(config.throughput_settings);

    let mut handler = RequestHandler::new(conn.map.clone(), conn.ctx.clone());
    let mut wake_ticket = Some(scheduler.call_when_readable(worker.wakeup.read_fd()));
    let mut completed = false;

    'handling: loop {
        match handler.step(&mut conn.inbuf, &mut conn.outbuf) {
            Ok(Status::Done(())) => {
                completed = true;
                break;
            }
            Err(e) => {
                error!("{}: request handler failed: {}", conn.ctx, e);
                break;
            }
            Ok(Status::Suspended(wants)) => {
                if wants.read {
                    conn.inbuf.call_when_readable(scheduler);
                }
                if wants.write {
                    conn.outbuf.call_when_writable(scheduler);
                }
                loop {
                    let ticket = scheduler.wait();
                    if wake_ticket == Some(ticket) {
                        if worker.wakeup.lower() {
                            wake_ticket = None;
                            break 'handling;
                        }
                        wake_ticket =
                            Some(scheduler.call_when_readable(worker.wakeup.read_fd()));
                        continue;
                    }
                    if conn.inbuf.on_event(scheduler, ticket) {
                        break;
                    }
                    if conn.outbuf.on_event(scheduler, ticket) {
                        break;
                    }
                }
            }
        }
    }

    if let Some(ticket) = wake_ticket {
        scheduler.cancel(ticket);
    }
    conn.inbuf.cancel_when_readable(scheduler);
    conn.outbuf.cancel_when_writable(scheduler);
    conn.inbuf.disable_throughput_checking(scheduler);
    conn.outbuf.disable_throughput_checking(scheduler);

    completed
}

//==============================================================================
// Worker Loop
//==============================================================================

fn serve(shared: &Arc<Shared>, pool: &Arc<ThreadPool>, worker: &WorkerHandle) {
    info!("dispatcher thread {} started", worker.id);

    let mut scheduler = Scheduler::new(shared.config.selector);
    let mut current: Option<(ServerConnection, bool)> = None;

    loop {
        let mut handed: Option<ServerConnection> = None;
        {
            let mut core = match current.take() {
                Some((conn, completed)) => {
                    // Returning a served connection takes the urgent path
                    // so the core's wait lets go of the lock.
                    let mut core = shared.core.urgent_lock(&shared.wakeup);
                    core.resume_monitoring(conn, completed, &shared.config);
                    core.n_idle_threads += 1;
                    core
                }
                None => shared.core.normal_lock(),
            };

            if shared.stopping.load(Ordering::Acquire) {
                core.n_idle_threads -= 1;
                break;
            }

            if let Some(key) = core.select_client(&shared.wakeup, &shared.config) {
                let mut conn = core.conns.remove(key);
                conn.tracked_tickets.clear();
                core.n_idle_threads -= 1;

                if core.n_idle_threads == 0 {
                    // The last idle thread is about to go busy; try to
                    // grow the pool so further requests find a waiter.
                    let shared2 = shared.clone();
                    let pool2 = pool.clone();
                    if pool.add(move |w| serve(&shared2, &pool2, &w)) {
                        core.n_idle_threads += 1;
                    }
                }

                handed = Some(conn);
            }
        }

        if let Some(mut conn) = handed {
            info!(
                "handling request from {} on dispatcher thread {}",
                conn.ctx, worker.id
            );
            let completed = handle_request(&mut scheduler, worker, &mut conn, &shared.config);
            current = Some((conn, completed));
        }
    }

    info!("dispatcher thread {} stopped", worker.id);
}

//==============================================================================
// Dispatcher
//==============================================================================

/// Associate functions for [Dispatcher].
impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Result<Self, Fail> {
        let wakeup = WakeupFlag::new()
            .map_err(|e| Fail::address(format!("cannot create wakeup pipe: {}", e)))?;
        let signal_pipe = EventPipe::new()
            .map_err(|e| Fail::address(format!("cannot create signal pipe: {}", e)))?;
        signal_pipe.set_write_nonblocking();

        let mut core = CoreState {
            scheduler: Scheduler::new(config.selector),
            listeners: Slab::new(),
            conns: Slab::new(),
            monitored: VecDeque::new(),
            events: HashMap::new(),
            n_idle_threads: 0,
        };
        core.register_wakeup(&wakeup);

        info!("dispatcher created (selector: {})", config.selector);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                core: FairLock::new(core),
                wakeup,
                stopping: AtomicBool::new(false),
                signal_pipe,
            }),
        })
    }

    /// Starts listening on `endpoint`, serving the methods in `map`.
    /// Returns the actually bound endpoint. Listeners are added before
    /// `run`.
    pub fn add_listener(
        &self,
        endpoint: &Endpoint,
        map: Arc<MethodMap>,
    ) -> Result<Endpoint, Fail> {
        let acceptor = TcpAcceptor::bind(endpoint)?;
        let local = acceptor.local_endpoint().clone();
        info!("listening on endpoint {}", local);

        let mut core = self.shared.core.normal_lock();
        let key = core.listeners.insert(Listener { acceptor, map });
        core.register_listener(key);

        Ok(local)
    }

    /// A handle through which `stop` can be called from another thread or
    /// from signal context.
    pub fn control(&self) -> DispatcherControl {
        DispatcherControl {
            shared: self.shared.clone(),
        }
    }

    /// Serves requests until `stop` is called, then joins all worker
    /// threads.
    pub fn run(&self) -> Result<(), Fail> {
        let pool = Arc::new(ThreadPool::new(self.shared.config.max_thread_pool_size));

        info!("dispatcher running");

        {
            let mut core = self.shared.core.normal_lock();
            debug_assert_eq!(core.n_idle_threads, 0);
            core.n_idle_threads = 1;
        }

        let shared = self.shared.clone();
        let pool2 = pool.clone();
        let started = pool.add(move |w| serve(&shared, &pool2, &w));
        assert!(started, "cannot start initial dispatcher thread");

        let sig = self.shared.signal_pipe.read_byte();
        info!("caught signal {}, stopping dispatcher", sig.unwrap_or(0));

        self.shared.stopping.store(true, Ordering::Release);
        self.shared.wakeup.raise();

        pool.join();

        {
            let core = self.shared.core.normal_lock();
            debug_assert_eq!(core.n_idle_threads, 0);
        }

        let was_up = self.shared.wakeup.lower();
        debug_assert!(was_up);
        self.shared.stopping.store(false, Ordering::Release);

        info!("dispatcher stopped");
        Ok(())
    }
}

/// Associate functions for [DispatcherControl].
impl DispatcherControl {
    /// Requests a graceful stop. Signal- and thread-safe.
    pub fn stop(&self, sig: i32) {
        self.shared.signal_pipe.write_byte(sig as u8);
    }
}
