use std::fmt;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, trace, warn};
use vhalclient_frame::{
    encode_length_prefix, ControlMessage, FrameError, CONTROL_MESSAGE_SIZE, LENGTH_PREFIX_SIZE,
};
use vhalclient_transport::{Endpoint, Transport, TransportError};

use crate::config::{EngineConfig, EngineMode};
use crate::error::{Result, SinkError};
use crate::readiness::{self, Interest, Readiness, ShutdownSignal};

/// How often a hung-up passive connection is rechecked while unread bytes remain.
const DRAIN_CHECK: Duration = Duration::from_millis(20);

/// Callback invoked on the engine thread for every control message.
///
/// It must return promptly: no further message is read until it does.
pub type ControlCallback = Box<dyn FnMut(&ControlMessage) + Send + 'static>;

/// Connection state published by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// Counters describing an engine's lifetime so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Calls to `Transport::connect`, successful or not.
    pub connect_attempts: u64,
    /// Successful connects.
    pub connects: u64,
    /// Control messages handed to a callback.
    pub messages_dispatched: u64,
    /// Short or failed control reads that forced a reconnect.
    pub framing_errors: u64,
}

#[derive(Default)]
struct Counters {
    connect_attempts: AtomicU64,
    connects: AtomicU64,
    messages_dispatched: AtomicU64,
    framing_errors: AtomicU64,
}

struct Shared<T> {
    transport: T,
    config: EngineConfig,
    callback: Mutex<Option<ControlCallback>>,
    writer: Mutex<()>,
    state: Mutex<ConnectionState>,
    state_changed: Condvar,
    stop: AtomicBool,
    signal: ShutdownSignal,
    counters: Counters,
}

/// Owns a transport and keeps it connected from a background thread.
///
/// In [`EngineMode::Control`] the thread waits for control messages and
/// hands each one to the registered callback, in wire order, one at a time.
/// Writes go straight to the transport from the caller's thread, so the two
/// directions of the connection are independent.
///
/// Dropping the engine stops the thread and closes the transport.
pub struct ReconnectingEngine<T: Transport> {
    shared: Arc<Shared<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Transport> ReconnectingEngine<T> {
    /// Start the background thread with default configuration.
    pub fn start(transport: T) -> Result<Self> {
        Self::start_with_config(transport, EngineConfig::default())
    }

    /// Start the background thread with explicit configuration.
    pub fn start_with_config(transport: T, config: EngineConfig) -> Result<Self> {
        Self::spawn(transport, config, None)
    }

    /// Start with a callback already installed, so no control message that
    /// arrives right after the first connect can be missed.
    pub fn start_with_callback<F>(transport: T, config: EngineConfig, callback: F) -> Result<Self>
    where
        F: FnMut(&ControlMessage) + Send + 'static,
    {
        Self::spawn(transport, config, Some(Box::new(callback)))
    }

    fn spawn(transport: T, config: EngineConfig, callback: Option<ControlCallback>) -> Result<Self> {
        let signal = ShutdownSignal::new().map_err(SinkError::Spawn)?;
        let thread_name = config.thread_name.clone();
        let shared = Arc::new(Shared {
            transport,
            config,
            callback: Mutex::new(callback),
            writer: Mutex::new(()),
            state: Mutex::new(ConnectionState::Disconnected),
            state_changed: Condvar::new(),
            stop: AtomicBool::new(false),
            signal,
            counters: Counters::default(),
        });

        let worker = thread::Builder::new()
            .name(thread_name)
            .spawn({
                let shared = Arc::clone(&shared);
                move || shared.run()
            })
            .map_err(SinkError::Spawn)?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Install the control callback, replacing any previous one.
    ///
    /// May be called at any time, including from inside the callback; the
    /// new callback sees the next message.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: FnMut(&ControlMessage) + Send + 'static,
    {
        *lock(&self.shared.callback) = Some(Box::new(callback));
    }

    /// Send one data frame: the 8-byte length, then the payload.
    ///
    /// Returns the byte count of the payload send. A count below
    /// `payload.len()` leaves the stream mid-frame and must be treated as
    /// fatal by the caller. Failures are never retried and do not trigger a
    /// reconnect; the background thread notices a dead peer on its own.
    pub fn write_packet(&self, payload: &[u8]) -> Result<usize> {
        let max = self.shared.config.max_payload_size;
        if payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max,
            }
            .into());
        }

        let _writer = lock(&self.shared.writer);
        let transport = &self.shared.transport;

        let sent = transport.send(&encode_length_prefix(payload.len()))?;
        if sent != LENGTH_PREFIX_SIZE {
            return Err(SinkError::ShortWrite {
                expected: LENGTH_PREFIX_SIZE,
                written: sent,
            });
        }

        Ok(transport.send(payload)?)
    }

    /// One receive on the transport, for engines in [`EngineMode::Passive`].
    ///
    /// A closed or failed connection is dropped so the background thread
    /// reconnects.
    pub(crate) fn read_packet(&self, buf: &mut [u8]) -> Result<usize> {
        match self.shared.transport.recv(buf) {
            Ok(0) if !buf.is_empty() => {
                info!("peer closed the connection; reconnecting");
                self.shared.drop_connection();
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(TransportError::NotConnected) => Err(TransportError::NotConnected.into()),
            Err(err) => {
                warn!(error = %err, "receive failed; reconnecting");
                self.shared.drop_connection();
                Err(err.into())
            }
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *lock(&self.shared.state)
    }

    /// Whether the transport currently holds a connection.
    pub fn is_connected(&self) -> bool {
        self.shared.transport.is_connected()
    }

    /// Block until the engine reports `Connected` or `timeout` elapses.
    pub fn wait_until_connected(&self, timeout: Duration) -> bool {
        self.wait_for_state(ConnectionState::Connected, timeout)
    }

    /// Block until the engine reports `target` or `timeout` elapses.
    pub fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> bool {
        let guard = lock(&self.shared.state);
        let (guard, _) = self
            .shared
            .state_changed
            .wait_timeout_while(guard, timeout, |state| *state != target)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard == target
    }

    /// Snapshot of the engine counters.
    pub fn stats(&self) -> EngineStats {
        let c = &self.shared.counters;
        EngineStats {
            connect_attempts: c.connect_attempts.load(Ordering::Relaxed),
            connects: c.connects.load(Ordering::Relaxed),
            messages_dispatched: c.messages_dispatched.load(Ordering::Relaxed),
            framing_errors: c.framing_errors.load(Ordering::Relaxed),
        }
    }

    /// The transport's endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        self.shared.transport.endpoint()
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Whether the background thread is still running.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Stop the background thread, wait for it, and close the transport.
    ///
    /// Idempotent. Also run on drop.
    pub fn shutdown(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.signal.notify();

        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == thread::current().id() {
                debug!("engine dropped from its own callback; not joining");
            } else if worker.join().is_err() {
                warn!("engine thread panicked");
            }
        }

        self.shared.drop_connection();
    }
}

impl<T: Transport> Drop for ReconnectingEngine<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Transport> fmt::Debug for ReconnectingEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectingEngine")
            .field("endpoint", self.endpoint())
            .field("state", &self.state())
            .field("mode", &self.shared.config.mode)
            .finish()
    }
}

impl<T: Transport> Shared<T> {
    fn run(&self) {
        let span = info_span!("vhal_engine", endpoint = %self.transport.endpoint());
        let _enter = span.enter();
        debug!(mode = ?self.config.mode, "engine thread started");

        let mut attempt: u64 = 0;
        while !self.stop.load(Ordering::SeqCst) {
            if !self.transport.is_connected() {
                self.set_state(ConnectionState::Connecting);
                self.counters.connect_attempts.fetch_add(1, Ordering::Relaxed);
                match self.transport.connect() {
                    Ok(()) => {
                        self.counters.connects.fetch_add(1, Ordering::Relaxed);
                        info!(after_retries = attempt, "connected to VHAL");
                        attempt = 0;
                        self.set_state(ConnectionState::Connected);
                    }
                    Err(err) => {
                        attempt += 1;
                        debug!(attempt, error = %err, retry_in = ?self.config.retry_delay, "connect failed");
                        self.set_state(ConnectionState::Disconnected);
                        self.pause(self.config.retry_delay);
                        continue;
                    }
                }
            }

            match self.config.mode {
                EngineMode::Control => self.monitor(Interest::Readable),
                EngineMode::Passive => self.monitor(Interest::Hangup),
            }
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("engine thread stopped");
    }

    /// One bounded wait on the connection, then act on what it reported.
    fn monitor(&self, interest: Interest) {
        let Some(fd) = self.transport.native_handle() else {
            return;
        };

        match readiness::wait(Some((fd, interest)), self.signal.fd(), self.config.poll_timeout) {
            Ok(Readiness::Shutdown) => {}
            Ok(Readiness::TimedOut) => trace!("no traffic within poll timeout"),
            Ok(Readiness::Ready) => match interest {
                Interest::Readable => self.receive_control(),
                Interest::Hangup => {
                    info!("connection failed; reconnecting");
                    self.drop_connection();
                }
            },
            Ok(Readiness::HungUp) => match interest {
                Interest::Readable => self.receive_control(),
                Interest::Hangup => self.peer_hung_up(fd),
            },
            Err(err) => {
                warn!(error = %err, "readiness wait failed; reconnecting");
                self.drop_connection();
            }
        }
    }

    /// In passive mode bytes the peer sent before closing belong to the
    /// reader. The connection is kept until they are consumed.
    fn peer_hung_up(&self, fd: RawFd) {
        match readiness::pending_bytes(fd) {
            Ok(0) => {
                info!("connection hung up; reconnecting");
                self.drop_connection();
            }
            Ok(pending) => {
                trace!(pending, "peer hung up with unread bytes");
                self.pause(self.config.poll_timeout.min(DRAIN_CHECK));
            }
            Err(err) => {
                debug!(error = %err, "cannot inspect hung-up connection; reconnecting");
                self.drop_connection();
            }
        }
    }

    fn receive_control(&self) {
        let mut buf = [0u8; CONTROL_MESSAGE_SIZE];
        let received = match self.transport.recv(&mut buf) {
            Ok(0) => {
                info!("VHAL closed the connection; reconnecting");
                self.drop_connection();
                return;
            }
            Ok(n) => n,
            Err(err) => {
                warn!(error = %err, "control receive failed; reconnecting");
                self.counters.framing_errors.fetch_add(1, Ordering::Relaxed);
                self.drop_connection();
                return;
            }
        };

        match ControlMessage::decode(&buf[..received]) {
            Ok(msg) => self.dispatch(msg),
            Err(err) => {
                warn!(
                    received,
                    expected = CONTROL_MESSAGE_SIZE,
                    error = %err,
                    "malformed control message; reconnecting"
                );
                self.counters.framing_errors.fetch_add(1, Ordering::Relaxed);
                self.drop_connection();
            }
        }
    }

    fn dispatch(&self, msg: ControlMessage) {
        debug!(command = %msg.command, "control message from VHAL");

        // Run the callback outside the lock so it may re-register itself.
        let taken = lock(&self.callback).take();
        let Some(mut callback) = taken else {
            warn!(command = %msg.command, "no callback registered; dropping control message");
            return;
        };

        callback(&msg);
        self.counters
            .messages_dispatched
            .fetch_add(1, Ordering::Relaxed);

        let mut slot = lock(&self.callback);
        if slot.is_none() {
            *slot = Some(callback);
        }
    }

    fn drop_connection(&self) {
        self.transport.close();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Sleep that returns early on shutdown.
    fn pause(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        if let Err(err) = readiness::wait(None, self.signal.fd(), delay) {
            debug!(error = %err, "interruptible pause failed; sleeping");
            thread::sleep(deadline.saturating_duration_since(Instant::now()));
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = lock(&self.state);
        let previous = *state;
        if previous != next {
            trace!(from = %previous, to = %next, "state change");
            *state = next;
            self.state_changed.notify_all();
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
