use crate::{
    batcher::EventBatcher,
    config::{ConnectConfig, ReadConfig, RrOutcome, RrRequest, DEFAULT_CHUNK_SIZE, WRITE_BUDGET},
    error::{ClientError, ClientResult},
    event::{ClientEvent, DisconnectReason},
    rr,
    session::{Session, TransferCounters},
    socket::{Probe, SocketHandle},
    state::ConnState,
};
use arc_swap::ArcSwapOption;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex};
use tracing::instrument;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Snapshot of the client's transfer totals across all sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub rr_total: u64,
    pub rr_timeouts: u64,
}

/// The public facade: owns at most one session, enforces the mutual
/// exclusion between the stream reader and the RR engine, and fans
/// events out to host listeners.
///
/// Cloning is cheap and shares the same client.
#[derive(Clone)]
pub struct TcpClient {
    inner: Arc<ClientShared>,
}

struct ClientShared {
    /// Current session; read-mostly operations load it lock-free
    session: ArcSwapOption<Session>,
    /// Serializes connect/disconnect (single-flight lifecycle ops)
    lifecycle: AsyncMutex<()>,
    events_tx: broadcast::Sender<ClientEvent>,
    state_tx: watch::Sender<ConnState>,
    state_rx: watch::Receiver<ConnState>,
    /// Advisory reader idle tick, shared with every session
    read_timeout_ms: Arc<AtomicU64>,
    counters: Arc<TransferCounters>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl Default for TcpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpClient {
    pub fn new() -> Self {
        let (events_tx, _keep) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnState::Idle);
        Self {
            inner: Arc::new(ClientShared {
                session: ArcSwapOption::from(None),
                lifecycle: AsyncMutex::new(()),
                events_tx,
                state_tx,
                state_rx,
                read_timeout_ms: Arc::new(AtomicU64::new(
                    crate::config::DEFAULT_READ_TIMEOUT.as_millis() as u64,
                )),
                counters: Arc::new(TransferCounters::default()),
                last_error: Arc::new(Mutex::new(None)),
            }),
        }
    }

    /// Subscribe to `Data` / `Disconnected` events. Subscriptions
    /// outlive individual sessions.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events_tx().subscribe()
    }

    /// Observe connection state transitions without polling.
    pub fn watch_state(&self) -> watch::Receiver<ConnState> {
        self.inner.state_rx.clone()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnState {
        *self.inner.state_rx.borrow()
    }

    /// Establish a session. Any prior session is torn down first (with a
    /// `Manual` disconnect, emitted only if one existed); overlapping
    /// connects serialize. A failed connect leaves no session and emits
    /// no disconnect event.
    #[instrument(level = "debug", skip_all, fields(host = %cfg.host, port = cfg.port))]
    pub async fn connect(&self, cfg: ConnectConfig) -> ClientResult<()> {
        cfg.validate()?;
        let _lc = self.inner.lifecycle.lock().await;

        if let Some(old) = self.inner.session.swap(None) {
            teardown(&old).await;
        }

        let _ = self.inner.state_tx.send(ConnState::Connecting);
        match SocketHandle::connect(&cfg).await {
            Ok(socket) => {
                let batcher = EventBatcher::new(self.inner.events_tx.clone());
                let session = Session::new(
                    socket,
                    batcher,
                    self.inner.state_tx.clone(),
                    self.inner.state_rx.clone(),
                    DEFAULT_CHUNK_SIZE,
                    Arc::clone(&self.inner.read_timeout_ms),
                    Arc::clone(&self.inner.counters),
                    Arc::clone(&self.inner.last_error),
                );
                let _ = self.inner.state_tx.send(ConnState::Open);
                self.inner.session.store(Some(session));
                Ok(())
            }
            Err(e) => {
                let _ = self.inner.state_tx.send(ConnState::Idle);
                Err(e)
            }
        }
    }

    /// Idempotent teardown: stops the reader, flushes pending batched
    /// data, emits `Manual` iff a session existed, closes the socket.
    #[instrument(level = "debug", skip_all)]
    pub async fn disconnect(&self) -> ClientResult<()> {
        let _lc = self.inner.lifecycle.lock().await;
        if let Some(session) = self.inner.session.swap(None) {
            teardown(&session).await;
        }
        Ok(())
    }

    /// Liveness check. While the reader or an RR cycle is active this is
    /// their status; otherwise a non-consuming one-byte peek probes the
    /// socket, and an observed EOF or error tears the session down (with
    /// its one disconnect notification).
    pub fn is_connected(&self) -> bool {
        let Some(session) = self.inner.session.load_full() else {
            return false;
        };
        if !session.is_open() {
            return false;
        }
        if session.reader_active.load(Ordering::Acquire) || session.rr_in_flight() {
            return true;
        }
        match session.socket.probe() {
            Probe::Healthy => true,
            Probe::Eof => {
                session.remote_closed();
                false
            }
            Probe::Fatal(e) => {
                session.report_op_error(&ClientError::Io(e));
                false
            }
        }
    }

    /// Reader active and session open.
    pub fn is_reading(&self) -> bool {
        self.inner
            .session
            .load_full()
            .map(|s| s.is_reading())
            .unwrap_or(false)
    }

    /// Send `data` under the shared write lock. Distinct writes never
    /// interleave on the wire. Fails with `Busy` while an RR cycle is in
    /// flight; fatal send errors end the session.
    #[instrument(level = "debug", skip_all, fields(len = data.len()))]
    pub async fn write(&self, data: &[u8]) -> ClientResult<usize> {
        if data.is_empty() {
            return Err(ClientError::InvalidArgument("data must not be empty".into()));
        }
        let session = self.open_session()?;
        if session.rr_in_flight() {
            return Err(ClientError::Busy);
        }

        let deadline = Instant::now() + WRITE_BUDGET;
        let _w = session.write_lock.lock().await;
        match session.socket.send_all(data, deadline).await {
            Ok(n) => {
                session
                    .counters
                    .bytes_sent
                    .fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => {
                session.report_op_error(&e);
                Err(e)
            }
        }
    }

    /// Start (or confirm) the stream reader. Idempotent: a second start
    /// returns `true` without reconfiguring. Resets the batcher state on
    /// an actual start.
    #[instrument(level = "debug", skip_all, fields(chunk = cfg.chunk_size))]
    pub async fn start_read(&self, cfg: ReadConfig) -> ClientResult<bool> {
        cfg.validate()?;
        let session = self.open_session()?;
        if session.rr_in_flight() {
            return Err(ClientError::Busy);
        }
        if session.start_reader(Some(&cfg)).await {
            Ok(true)
        } else {
            // Lost a race with teardown between the open check and here.
            Err(ClientError::NotConnected)
        }
    }

    /// Stop the stream reader; flushes any pending batch before
    /// returning. Idempotent, and a no-op without a session.
    #[instrument(level = "debug", skip_all)]
    pub async fn stop_read(&self) -> ClientResult<bool> {
        if let Some(session) = self.inner.session.load_full() {
            session.stop_reader().await;
        }
        Ok(false)
    }

    /// Advisory idle tick for the stream reader's readable-wait; applies
    /// to the current session and every future one.
    pub fn set_read_timeout(&self, timeout: Duration) {
        self.inner
            .read_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Release);
    }

    /// One atomic write-then-read cycle; see [`RrRequest`] for the knobs.
    #[instrument(level = "debug", skip_all, fields(len = req.payload.len()))]
    pub async fn write_and_read(&self, req: RrRequest) -> ClientResult<RrOutcome> {
        let session = self.open_session()?;
        rr::execute(&session, &req).await
    }

    /// Transfer totals across all sessions of this client.
    pub fn stats(&self) -> ClientStats {
        let c = &self.inner.counters;
        ClientStats {
            bytes_sent: c.bytes_sent.load(Ordering::Relaxed),
            bytes_received: c.bytes_received.load(Ordering::Relaxed),
            rr_total: c.rr_total.load(Ordering::Relaxed),
            rr_timeouts: c.rr_timeouts.load(Ordering::Relaxed),
        }
    }

    /// Message of the last session-fatal error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().ok().and_then(|g| g.clone())
    }

    fn open_session(&self) -> ClientResult<Arc<Session>> {
        self.inner
            .session
            .load_full()
            .filter(|s| s.is_open())
            .ok_or(ClientError::NotConnected)
    }

    fn events_tx(&self) -> &broadcast::Sender<ClientEvent> {
        &self.inner.events_tx
    }
}

async fn teardown(session: &Arc<Session>) {
    session.stop_reader().await;
    session.close_with(DisconnectReason::Manual);
}
