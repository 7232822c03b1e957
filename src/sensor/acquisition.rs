//! # Acquisition Module
//!
//! One [`AcquisitionLoop`] per device. It runs as its own tokio task and
//! cycles through read, decode and publish:
//!
//! - a decoded frame replaces the channel's latest reading, then every
//!   current subscriber is called with it, in arrival order;
//! - an "out of range" frame is dropped silently;
//! - a malformed frame or a failed read counts as an error and puts the loop
//!   into [`LoopState::BackingOff`] for the configured delay before the next
//!   read.
//!
//! The loop stops ([`LoopState::Closed`]) when [`AcquisitionLoop::close`] is
//! called or when its channel reports closed after a failed read. Streaming
//! faults never reach the caller; they only leave the latest reading stale.

use log::{debug, info, trace, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use super::frame::{Frame, parse_frame};
use super::grammar::Grammar;
use super::reading::Reading;
use super::store::ReadingStore;
use super::subscription::{SubscriptionHandle, Subscribers};
use crate::error::{ChannelError, Result};
use crate::serial::{LineChannel, PortSettings, SerialLineChannel};

/// Delay after a failed read or malformed frame.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of an acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Constructed, task not started yet.
    Idle,
    /// Waiting for the next line.
    Running,
    /// Sleeping after an error.
    BackingOff,
    /// Terminal. The channel has been released.
    Closed,
}

/// Delay schedule applied while backing off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every error.
    Fixed(Duration),
    /// Doubles with every consecutive error, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay before the next read after `consecutive_errors` errors in a row.
    pub fn delay(&self, consecutive_errors: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let doublings = consecutive_errors.saturating_sub(1);
                let factor = 1u32.checked_shl(doublings).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(DEFAULT_BACKOFF)
    }
}

/// Tuning of an acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopConfig {
    /// Delay schedule after errors.
    pub backoff: Backoff,
    /// Longest wait for a line before it counts as a read failure.
    /// `None` waits forever, so a silent device leaves its reading stale.
    pub stall_timeout: Option<Duration>,
}

impl LoopConfig {
    /// Fixed backoff of `delay`, no stall timeout.
    pub fn with_backoff(delay: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed(delay),
            stall_timeout: None,
        }
    }
}

/// Counters of a running loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopStats {
    /// Lines received.
    pub frames: u64,
    /// Readings published.
    pub readings: u64,
    /// Frames matching the out-of-range sentinel.
    pub out_of_range: u64,
    /// Frames that failed to decode.
    pub malformed: u64,
    /// Failed reads.
    pub read_errors: u64,
    /// Backoff cycles entered.
    pub backoffs: u64,
    /// Errors since the last published reading.
    pub consecutive_errors: u64,
}

#[derive(Default)]
struct Counters {
    frames: AtomicU64,
    readings: AtomicU64,
    out_of_range: AtomicU64,
    malformed: AtomicU64,
    read_errors: AtomicU64,
    backoffs: AtomicU64,
    consecutive_errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> LoopStats {
        LoopStats {
            frames: self.frames.load(Ordering::Relaxed),
            readings: self.readings.load(Ordering::Relaxed),
            out_of_range: self.out_of_range.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            backoffs: self.backoffs.load(Ordering::Relaxed),
            consecutive_errors: self.consecutive_errors.load(Ordering::Relaxed),
        }
    }
}

struct Shared {
    name: Arc<str>,
    grammar: Grammar,
    config: LoopConfig,
    store: ReadingStore,
    subscribers: Arc<Subscribers<Arc<Reading>>>,
    counters: Counters,
    state: watch::Sender<LoopState>,
    close_requested: watch::Sender<bool>,
}

impl Shared {
    fn set_state(&self, state: LoopState) {
        self.state.send_if_modified(|current| {
            if *current == state || *current == LoopState::Closed {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Read-decode-publish loop of one device.
pub struct AcquisitionLoop {
    shared: Arc<Shared>,
    task: Mutex<Option<Task>>,
}

impl AcquisitionLoop {
    /// Opens the serial device described by `settings`.
    ///
    /// Must be called from inside a tokio runtime. Failing to open the port
    /// is the only error an acquisition loop ever reports.
    pub fn open(
        name: impl Into<String>,
        settings: &PortSettings,
        grammar: Grammar,
        config: LoopConfig,
    ) -> Result<Self> {
        grammar.validate()?;
        let channel = SerialLineChannel::open(settings)?;
        Self::new(name, channel, grammar, config)
    }

    /// Wraps an already opened channel. The loop does not run until
    /// [`start`](Self::start).
    pub fn new<C: LineChannel>(
        name: impl Into<String>,
        channel: C,
        grammar: Grammar,
        config: LoopConfig,
    ) -> Result<Self> {
        grammar.validate()?;
        let (state, _) = watch::channel(LoopState::Idle);
        let (close_requested, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            name: Arc::from(name.into()),
            grammar,
            config,
            store: ReadingStore::new(),
            subscribers: Subscribers::new(),
            counters: Counters::default(),
            state,
            close_requested,
        });
        let task: Task = Box::pin(run(channel, Arc::clone(&shared)));
        Ok(Self {
            shared,
            task: Mutex::new(Some(task)),
        })
    }

    /// Spawns the loop on the current tokio runtime and returns immediately.
    /// Starting an already started loop does nothing.
    pub fn start(&self) -> Result<()> {
        let handle = Handle::try_current().map_err(|e| {
            crate::error::SensorError::runtime(format!(
                "cannot start acquisition on '{}': {e}",
                self.shared.name
            ))
        })?;
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            debug!("[{}] starting acquisition", self.shared.name);
            handle.spawn(task);
        }
        Ok(())
    }

    /// Requests the loop to stop and release its channel.
    ///
    /// Returns immediately; the loop reaches [`LoopState::Closed`] at its
    /// next read attempt. A pending read is abandoned. Calling it more than
    /// once has no further effect.
    pub fn close(&self) {
        let newly = self.shared.close_requested.send_if_modified(|closed| {
            let was = *closed;
            *closed = true;
            !was
        });
        if !newly {
            return;
        }
        info!("[{}] close requested", self.shared.name);
        // Never started: nothing will observe the request, so finish here.
        let pending = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = pending {
            drop(task);
            self.shared.set_state(LoopState::Closed);
        }
    }

    /// Latest published reading, without waiting.
    pub fn latest(&self) -> Option<Arc<Reading>> {
        self.shared.store.latest()
    }

    /// Receiver woken whenever a new reading is published.
    pub fn watch(&self) -> watch::Receiver<Option<Arc<Reading>>> {
        self.shared.store.watch()
    }

    /// Calls `callback` with every reading published from now on.
    ///
    /// The callback runs on the loop's task, before the next line is read,
    /// so it should return quickly. A panic inside it is logged and does not
    /// stop the loop.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Arc<Reading>) + Send + Sync + 'static,
    {
        self.shared.subscribers.subscribe(callback)
    }

    /// Like [`subscribe`](Self::subscribe), delivering into an unbounded channel.
    pub fn subscribe_channel(&self) -> (SubscriptionHandle, mpsc::UnboundedReceiver<Arc<Reading>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe(move |reading| {
            let _ = tx.send(Arc::clone(reading));
        });
        (handle, rx)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        *self.shared.state.borrow()
    }

    /// Resolves once the loop is [`LoopState::Closed`].
    pub async fn wait_closed(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| *state == LoopState::Closed).await;
    }

    /// Counters since construction.
    pub fn stats(&self) -> LoopStats {
        self.shared.counters.snapshot()
    }

    /// Name given at construction.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.shared.name)
    }

    /// Frame layout this loop decodes.
    pub fn grammar(&self) -> &Grammar {
        &self.shared.grammar
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for AcquisitionLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionLoop")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

async fn close_signal(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

async fn next_line<C: LineChannel>(
    channel: &mut C,
    stall_timeout: Option<Duration>,
) -> std::result::Result<String, ChannelError> {
    match stall_timeout {
        Some(limit) => tokio::time::timeout(limit, channel.read_line())
            .await
            .unwrap_or(Err(ChannelError::Timeout(limit))),
        None => channel.read_line().await,
    }
}

async fn run<C: LineChannel>(mut channel: C, shared: Arc<Shared>) {
    let name = Arc::clone(&shared.name);
    let mut close_rx = shared.close_requested.subscribe();
    let mut consecutive_errors: u32 = 0;
    let mut sequence: u64 = 0;

    info!("[{name}] acquisition running on {}", channel.name());
    shared.set_state(LoopState::Running);

    loop {
        if *close_rx.borrow_and_update() || !channel.is_open() {
            break;
        }

        let line = tokio::select! {
            biased;
            _ = close_signal(&mut close_rx) => break,
            line = next_line(&mut channel, shared.config.stall_timeout) => line,
        };

        let failed = match line {
            Ok(line) => {
                shared.counters.frames.fetch_add(1, Ordering::Relaxed);
                match parse_frame(&line, &shared.grammar) {
                    Ok(Frame::Measurement(measurement)) => {
                        sequence += 1;
                        let reading = Arc::new(Reading::new(sequence, measurement));
                        shared.store.publish(Arc::clone(&reading));
                        shared.counters.readings.fetch_add(1, Ordering::Relaxed);
                        shared.subscribers.notify(&reading);
                        consecutive_errors = 0;
                        shared.counters.consecutive_errors.store(0, Ordering::Relaxed);
                        trace!("[{name}] {reading}");
                        false
                    }
                    Ok(Frame::OutOfRange) => {
                        shared.counters.out_of_range.fetch_add(1, Ordering::Relaxed);
                        false
                    }
                    Err(e) => {
                        shared.counters.malformed.fetch_add(1, Ordering::Relaxed);
                        warn!("[{name}] malformed frame {line:?}: {e}");
                        true
                    }
                }
            }
            Err(e) => {
                shared.counters.read_errors.fetch_add(1, Ordering::Relaxed);
                warn!("[{name}] read failed: {e}");
                true
            }
        };

        if failed {
            consecutive_errors = consecutive_errors.saturating_add(1);
            shared
                .counters
                .consecutive_errors
                .store(u64::from(consecutive_errors), Ordering::Relaxed);
            shared.counters.backoffs.fetch_add(1, Ordering::Relaxed);
            shared.set_state(LoopState::BackingOff);

            let delay = shared.config.backoff.delay(consecutive_errors);
            tokio::select! {
                biased;
                _ = close_signal(&mut close_rx) => break,
                _ = tokio::time::sleep(delay) => {}
            }
            if !channel.is_open() {
                debug!("[{name}] channel reported closed while backing off");
                break;
            }
            shared.set_state(LoopState::Running);
        }
    }

    channel.close();
    shared.set_state(LoopState::Closed);
    info!("[{name}] acquisition closed");
}
