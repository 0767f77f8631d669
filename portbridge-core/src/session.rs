use crate::{
    batcher::EventBatcher,
    config::ReadConfig,
    error::ClientError,
    event::DisconnectReason,
    reader,
    rr::IdleEstimator,
    socket::SocketHandle,
    state::ConnState,
};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};
use tokio::{
    sync::{watch, Mutex as AsyncMutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Transfer totals kept at the client and updated by every session.
#[derive(Debug, Default)]
pub(crate) struct TransferCounters {
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub rr_total: AtomicU64,
    pub rr_timeouts: AtomicU64,
}

/// The running stream reader: its cancel token and join handle.
struct ReaderSlot {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Per-session shared state. Created on connect success, mutated only
/// through the coordinator, torn down with exactly one disconnect
/// notification.
pub(crate) struct Session {
    pub(crate) socket: SocketHandle,
    pub(crate) batcher: Arc<EventBatcher>,

    state_tx: watch::Sender<ConnState>,
    state_rx: watch::Receiver<ConnState>,

    /// Session-wide cancellation; child tokens drive the reader
    cancel: CancellationToken,
    reader: AsyncMutex<Option<ReaderSlot>>,
    pub(crate) reader_active: AtomicBool,

    /// RR exclusion flag, compare-and-set by the RR engine
    pub(crate) rr_inflight: AtomicBool,
    /// Serializes plain writes against the RR write phase
    pub(crate) write_lock: AsyncMutex<()>,

    /// Last configured `Data` slice size, reused on reader resume
    pub(crate) chunk_size: AtomicUsize,
    /// Advisory reader idle tick (ms), shared with the owning client
    pub(crate) read_timeout_ms: Arc<AtomicU64>,

    /// Inter-arrival samples feeding the RR adaptive idle threshold
    pub(crate) idle: Mutex<IdleEstimator>,

    pub(crate) counters: Arc<TransferCounters>,
    last_error: Arc<Mutex<Option<String>>>,

    /// One-shot guard: a session that reached `Open` reports exactly one
    /// disconnect, no matter how many components observe the failure
    disconnect_done: AtomicBool,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        socket: SocketHandle,
        batcher: Arc<EventBatcher>,
        state_tx: watch::Sender<ConnState>,
        state_rx: watch::Receiver<ConnState>,
        chunk_size: usize,
        read_timeout_ms: Arc<AtomicU64>,
        counters: Arc<TransferCounters>,
        last_error: Arc<Mutex<Option<String>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            socket,
            batcher,
            state_tx,
            state_rx,
            cancel: CancellationToken::new(),
            reader: AsyncMutex::new(None),
            reader_active: AtomicBool::new(false),
            rr_inflight: AtomicBool::new(false),
            write_lock: AsyncMutex::new(()),
            chunk_size: AtomicUsize::new(chunk_size),
            read_timeout_ms,
            idle: Mutex::new(IdleEstimator::new()),
            counters,
            last_error,
            disconnect_done: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn state(&self) -> ConnState {
        *self.state_rx.borrow()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    #[inline]
    pub fn is_reading(&self) -> bool {
        self.reader_active.load(Ordering::Acquire) && self.is_open()
    }

    #[inline]
    pub fn rr_in_flight(&self) -> bool {
        self.rr_inflight.load(Ordering::Acquire)
    }

    /// End the session with `reason`. Idempotent: only the first caller
    /// wins; the reader, the RR engine and the health probe may all race
    /// here on the same remote EOF.
    ///
    /// Ordering: pending batched data flushes before the disconnect
    /// notification, and the socket shutdown wakes anything parked on
    /// readiness so in-flight waits unblock.
    pub fn close_with(&self, reason: DisconnectReason) {
        if self.disconnect_done.swap(true, Ordering::AcqRel) {
            return;
        }
        if let DisconnectReason::Error(msg) = &reason {
            warn!(error = %msg, "session failed");
            let _ = self
                .last_error
                .lock()
                .map(|mut g| *g = Some(msg.clone()));
        } else {
            debug!(reason = reason.tag(), "session closed");
        }
        let _ = self.state_tx.send(ConnState::Closing);
        self.cancel.cancel();
        self.batcher.seal(reason);
        self.socket.shutdown();
        let _ = self.state_tx.send(ConnState::Closed);
    }

    #[inline]
    pub fn remote_closed(&self) {
        self.close_with(DisconnectReason::Remote);
    }

    #[inline]
    pub fn fail(&self, msg: impl Into<String>) {
        self.close_with(DisconnectReason::Error(msg.into()));
    }

    /// Route an operation error into the one-shot disconnect path.
    /// Session-fatal kinds end the session with the matching reason;
    /// everything else (`Busy`, `NotConnected`, timeouts, validation)
    /// leaves it untouched.
    pub fn report_op_error(&self, e: &ClientError) {
        if !e.is_disconnect() {
            return;
        }
        match e {
            ClientError::Closed => self.remote_closed(),
            other => self.fail(other.to_string()),
        }
    }

    /// Idempotent reader start. An already-active reader is left exactly
    /// as it is; otherwise a fresh reader task is spawned with a child
    /// token. Returns the reading status.
    pub async fn start_reader(self: &Arc<Self>, cfg: Option<&ReadConfig>) -> bool {
        let mut slot = self.reader.lock().await;
        if self.reader_active.load(Ordering::Acquire) {
            return true;
        }
        // A previous reader may have exited on its own; reap it.
        if let Some(old) = slot.take() {
            old.cancel.cancel();
            let _ = old.handle.await;
        }
        if !self.is_open() {
            return false;
        }
        // An explicit start reconfigures and re-arms the batcher. A
        // resume after RR suspension must not: bytes still sitting in
        // the debounce window belong to the stream and flush as usual.
        if let Some(cfg) = cfg {
            self.chunk_size.store(cfg.chunk_size, Ordering::Release);
            if let Some(tick) = cfg.read_timeout {
                self.read_timeout_ms
                    .store(tick.as_millis() as u64, Ordering::Release);
            }
            self.batcher.reset(cfg.chunk_size);
        }

        let cancel = self.cancel.child_token();
        self.reader_active.store(true, Ordering::Release);
        let handle = reader::spawn(Arc::clone(self), cancel.clone());
        *slot = Some(ReaderSlot { cancel, handle });
        debug!("stream reader started");
        true
    }

    /// Idempotent reader stop; flushes pending batched data before
    /// returning so callers observe `stop_read`'s flush guarantee.
    pub async fn stop_reader(&self) {
        let mut slot = self.reader.lock().await;
        if let Some(s) = slot.take() {
            s.cancel.cancel();
            let _ = s.handle.await;
            debug!("stream reader stopped");
        }
        self.reader_active.store(false, Ordering::Release);
        self.batcher.flush_now();
    }

    /// Cancel the reader for the duration of an RR cycle and wait for its
    /// exit. Returns whether it was active, so the engine can resume it.
    pub async fn suspend_reader(&self) -> bool {
        let mut slot = self.reader.lock().await;
        let was_active = self.reader_active.load(Ordering::Acquire);
        if let Some(s) = slot.take() {
            s.cancel.cancel();
            let _ = s.handle.await;
        }
        self.reader_active.store(false, Ordering::Release);
        was_active
    }
}
