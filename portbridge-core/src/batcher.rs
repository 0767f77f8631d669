use crate::{
    config::{DEFAULT_CHUNK_SIZE, MERGE_CAP, MERGE_WINDOW},
    event::{ClientEvent, DisconnectReason},
};
use bytes::BytesMut;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::trace;

/// Coalesces stream-reader bytes into batched `Data` events.
///
/// `append` arms a debounce flush after [`MERGE_WINDOW`] unless the
/// pending buffer reaches [`MERGE_CAP`] first, which flushes immediately.
/// Every flush slices the accumulated buffer into chunks of at most the
/// configured chunk size and emits them in order.
///
/// The inner mutex is the ordering point for the whole event stream:
/// flushes and the final disconnect notification are serialized on it, so
/// a `Data` event can never be observed after `Disconnected` within one
/// session. The lock is never held across an await.
#[derive(Debug)]
pub(crate) struct EventBatcher {
    inner: Mutex<BatchInner>,
    events_tx: broadcast::Sender<ClientEvent>,
}

#[derive(Debug)]
struct BatchInner {
    buf: BytesMut,
    chunk_size: usize,
    /// Bumped on every flush so stale debounce timers no-op
    flush_gen: u64,
    timer_armed: bool,
    /// Set once the disconnect notification went out; late appends drop
    sealed: bool,
}

impl EventBatcher {
    pub fn new(events_tx: broadcast::Sender<ClientEvent>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(BatchInner {
                buf: BytesMut::new(),
                chunk_size: DEFAULT_CHUNK_SIZE,
                flush_gen: 0,
                timer_armed: false,
                sealed: false,
            }),
            events_tx,
        })
    }

    /// Drop pending bytes and adopt a new chunk size. Called on
    /// `start_read` so a fresh reader never inherits stale data.
    pub fn reset(&self, chunk_size: usize) {
        let mut g = self.inner.lock().expect("batcher lock");
        g.buf.clear();
        g.flush_gen += 1;
        g.timer_armed = false;
        g.chunk_size = chunk_size.max(1);
    }

    /// Accumulate bytes; flush immediately at the size cap, otherwise arm
    /// the debounce timer if none is pending.
    pub fn append(self: &Arc<Self>, bytes: &[u8]) {
        debug_assert!(!bytes.is_empty());
        let mut g = self.inner.lock().expect("batcher lock");
        if g.sealed {
            return;
        }
        g.buf.extend_from_slice(bytes);

        if g.buf.len() >= MERGE_CAP {
            Self::flush_locked(&mut g, &self.events_tx);
            return;
        }
        if !g.timer_armed {
            g.timer_armed = true;
            let generation = g.flush_gen;
            let this = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(MERGE_WINDOW).await;
                this.flush_if_current(generation);
            });
        }
    }

    /// Synchronously drain whatever is pending.
    pub fn flush_now(&self) {
        let mut g = self.inner.lock().expect("batcher lock");
        Self::flush_locked(&mut g, &self.events_tx);
    }

    /// Flush pending bytes, then emit the disconnect notification, then
    /// refuse all further input. One atomic step under the order lock.
    pub fn seal(&self, reason: DisconnectReason) {
        let mut g = self.inner.lock().expect("batcher lock");
        if g.sealed {
            return;
        }
        Self::flush_locked(&mut g, &self.events_tx);
        g.sealed = true;
        let _ = self.events_tx.send(ClientEvent::Disconnected(reason));
    }

    fn flush_if_current(&self, generation: u64) {
        let mut g = self.inner.lock().expect("batcher lock");
        if g.flush_gen != generation || !g.timer_armed {
            return;
        }
        Self::flush_locked(&mut g, &self.events_tx);
    }

    fn flush_locked(g: &mut BatchInner, tx: &broadcast::Sender<ClientEvent>) {
        g.flush_gen += 1;
        g.timer_armed = false;
        let total = g.buf.len();
        if total == 0 {
            return;
        }
        trace!(bytes = total, chunk = g.chunk_size, "batch flush");
        while !g.buf.is_empty() {
            let n = g.chunk_size.min(g.buf.len());
            let slice = g.buf.split_to(n).freeze();
            let _ = tx.send(ClientEvent::Data(slice));
        }
    }
}
