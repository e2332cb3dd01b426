use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::interface::{is_placeholder, PortOpener, SerialLink};
use super::protocol::{decode_line, LineAssembler};
use super::SerialError;
use crate::config::Settings;
use crate::input::EventRouter;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: SerialError,
    },

    #[error("Reader for the previous port is still running; not opening {port}")]
    ReaderStillRunning { port: String },
}

/// Serial session lifecycle as seen by the front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Closed,
    Opening(String),
    Open(String),
    /// The reader stopped on an I/O error; the user has to select a port again
    Failed { port: String, reason: String },
}

impl SessionState {
    pub fn is_open(&self) -> bool {
        matches!(self, SessionState::Open(_))
    }
}

/// Timing knobs for the reader and for teardown
#[derive(Debug, Clone, Copy)]
pub struct SessionTimings {
    pub poll_interval: Duration,
    pub read_timeout: Duration,
    pub settle_delay: Duration,
    pub join_timeout: Duration,
}

impl From<&Settings> for SessionTimings {
    fn from(settings: &Settings) -> Self {
        let settings = settings.clone().validated();
        Self {
            poll_interval: settings.poll_interval(),
            read_timeout: settings.read_timeout(),
            settle_delay: settings.settle_delay(),
            join_timeout: settings.join_timeout(),
        }
    }
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// Counters kept by the reader across sessions
#[derive(Debug, Default)]
struct ReaderCounters {
    lines_read: AtomicU64,
    events_routed: AtomicU64,
    frames_dropped: AtomicU64,
    buffer_trims: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReaderStats {
    pub lines_read: u64,
    pub events_routed: u64,
    pub frames_dropped: u64,
    pub buffer_trims: u64,
}

/// The live session: its port, run flag and reader task
struct ActiveSession {
    port_name: String,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        // A session dropped without teardown still stops its reader
        self.running.store(false, Ordering::Release);
    }
}

/// Decrements the live-reader count when the reader exits, however it exits
struct LiveReaderGuard(Arc<AtomicUsize>);

impl LiveReaderGuard {
    fn enter(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        Self(count.clone())
    }
}

impl Drop for LiveReaderGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Everything the blocking reader needs, moved onto its thread
struct ReaderContext {
    port_name: String,
    running: Arc<AtomicBool>,
    router: Arc<EventRouter>,
    state_tx: Arc<watch::Sender<SessionState>>,
    counters: Arc<ReaderCounters>,
    poll_interval: Duration,
    _live: LiveReaderGuard,
}

/// Owns at most one serial session and its background reader.
///
/// Selecting a port tears down the current session first: clear the run flag,
/// wait (bounded) for the reader to drop its port, pause for the OS to release
/// the handle, then open the new port.
pub struct SessionManager {
    opener: Arc<dyn PortOpener>,
    router: Arc<EventRouter>,
    timings: SessionTimings,
    active: Option<ActiveSession>,
    state_tx: Arc<watch::Sender<SessionState>>,
    live_readers: Arc<AtomicUsize>,
    counters: Arc<ReaderCounters>,
}

impl SessionManager {
    pub fn new(opener: Arc<dyn PortOpener>, router: Arc<EventRouter>, timings: SessionTimings) -> Self {
        let (state_tx, _state_rx) = watch::channel(SessionState::Closed);
        Self {
            opener,
            router,
            timings,
            active: None,
            state_tx: Arc::new(state_tx),
            live_readers: Arc::new(AtomicUsize::new(0)),
            counters: Arc::new(ReaderCounters::default()),
        }
    }

    /// Switch the session to `port_name`.
    ///
    /// Empty names and the "No Ports Found" placeholder are ignored. On open
    /// failure the manager stays closed; there is no retry. A previous reader
    /// that outlived its join keeps the new port from opening until it exits.
    pub async fn select_port(&mut self, port_name: &str) -> Result<(), SessionError> {
        if is_placeholder(port_name) {
            log::debug!("Ignoring selection of placeholder port {:?}", port_name);
            return Ok(());
        }

        if self.active.is_some() {
            self.teardown().await;
            tokio::time::sleep(self.timings.settle_delay).await;
        }

        let stragglers = self.live_readers();
        if stragglers != 0 {
            log::error!(
                "Not opening {}: {} previous serial reader(s) still running",
                port_name, stragglers
            );
            self.state_tx.send_replace(SessionState::Closed);
            return Err(SessionError::ReaderStillRunning {
                port: port_name.to_string(),
            });
        }

        self.state_tx.send_replace(SessionState::Opening(port_name.to_string()));
        let link = match self.opener.open(port_name, self.timings.read_timeout) {
            Ok(link) => link,
            Err(e) => {
                log::error!("Failed to connect to {}: {}", port_name, e);
                self.state_tx.send_replace(SessionState::Closed);
                return Err(SessionError::Open {
                    port: port_name.to_string(),
                    source: e,
                });
            }
        };
        log::info!("Connected to {} at {} bps", port_name, super::BAUD_RATE);

        let running = Arc::new(AtomicBool::new(true));
        let context = ReaderContext {
            port_name: port_name.to_string(),
            running: running.clone(),
            router: self.router.clone(),
            state_tx: self.state_tx.clone(),
            counters: self.counters.clone(),
            poll_interval: self.timings.poll_interval,
            _live: LiveReaderGuard::enter(&self.live_readers),
        };
        let reader = tokio::task::spawn_blocking(move || read_loop(link, context));

        self.active = Some(ActiveSession {
            port_name: port_name.to_string(),
            running,
            reader: Some(reader),
        });
        self.state_tx.send_replace(SessionState::Open(port_name.to_string()));
        Ok(())
    }

    /// Stop the reader and close the port. Safe to call when already closed.
    pub async fn teardown(&mut self) {
        let Some(mut session) = self.active.take() else {
            return;
        };

        session.running.store(false, Ordering::Release);
        if let Some(reader) = session.reader.take() {
            match timeout(self.timings.join_timeout, reader).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("Serial reader for {} panicked: {}", session.port_name, e),
                Err(_) => log::warn!(
                    "Serial reader for {} did not stop within {:?}",
                    session.port_name, self.timings.join_timeout
                ),
            }
        }

        log::info!("Disconnected from {}", session.port_name);
        self.state_tx.send_replace(SessionState::Closed);
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Port of the current session, whether or not its reader is still alive
    pub fn current_port(&self) -> Option<&str> {
        self.active.as_ref().map(|session| session.port_name.as_str())
    }

    /// True while a session exists and its reader has not exited
    pub fn is_open(&self) -> bool {
        self.active
            .as_ref()
            .and_then(|session| session.reader.as_ref())
            .is_some_and(|reader| !reader.is_finished())
    }

    /// Number of reader threads currently running
    pub fn live_readers(&self) -> usize {
        self.live_readers.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> ReaderStats {
        ReaderStats {
            lines_read: self.counters.lines_read.load(Ordering::Relaxed),
            events_routed: self.counters.events_routed.load(Ordering::Relaxed),
            frames_dropped: self.counters.frames_dropped.load(Ordering::Relaxed),
            buffer_trims: self.counters.buffer_trims.load(Ordering::Relaxed),
        }
    }
}

/// Blocking read loop; runs on the blocking pool until the run flag clears or
/// the port fails. The port is closed (dropped) before this returns.
fn read_loop(mut link: Box<dyn SerialLink>, ctx: ReaderContext) {
    log::info!("Serial reader started on {}", ctx.port_name);
    let mut assembler = LineAssembler::new();
    let mut buf = [0u8; 512];

    let failure: Option<String> = loop {
        if !ctx.running.load(Ordering::Acquire) {
            break None;
        }

        match link.bytes_available() {
            Ok(0) => std::thread::sleep(ctx.poll_interval),
            Ok(_) => match link.read(&mut buf) {
                Ok(0) => break Some("port closed".to_string()),
                Ok(n) => {
                    let trims_before = assembler.trims();
                    for line in assembler.push(&buf[..n]) {
                        process_line(&line, &ctx);
                    }
                    if assembler.trims() != trims_before {
                        ctx.counters.buffer_trims.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) if is_timeout(&e) => {}
                Err(e) => break Some(e.to_string()),
            },
            Err(e) => break Some(e.to_string()),
        }
    };

    drop(link);
    let released = ctx.router.release_held();
    if released > 0 {
        log::info!("Released {} held input(s) after closing {}", released, ctx.port_name);
    }

    match failure {
        Some(reason) => {
            log::error!("Serial read error on {}: {}", ctx.port_name, reason);
            // A cancelled reader must not overwrite the state of a newer session
            if ctx.running.load(Ordering::Acquire) {
                ctx.state_tx.send_replace(SessionState::Failed {
                    port: ctx.port_name.clone(),
                    reason,
                });
            }
        }
        None => log::info!("Serial reader stopped on {}", ctx.port_name),
    }
}

fn process_line(line: &str, ctx: &ReaderContext) {
    ctx.counters.lines_read.fetch_add(1, Ordering::Relaxed);
    match decode_line(line) {
        Some(event) => {
            ctx.router.route(event);
            ctx.counters.events_routed.fetch_add(1, Ordering::Relaxed);
        }
        None => {
            ctx.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!("Dropped malformed frame from {}: {:?}", ctx.port_name, line);
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}
