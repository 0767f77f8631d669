use crate::{
    error::{is_would_block, ClientError},
    session::Session,
};
use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};
use tokio::{task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Reusable read buffer size; larger than any chunk size so a single
/// drain pass keeps up with fast peers.
const READ_BUF: usize = 16 * 1024;

/// Bounds for the advisory idle tick so a misconfigured value can
/// neither spin the loop nor park it indefinitely.
const MIN_TICK: Duration = Duration::from_millis(10);
const MAX_TICK: Duration = Duration::from_secs(60);

pub(crate) fn spawn(session: Arc<Session>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run(session, cancel))
}

/// Drain the socket into the event batcher until cancelled, peer EOF or
/// a fatal read error. No lock is held across any wait in this loop.
async fn run(session: Arc<Session>, cancel: CancellationToken) {
    let mut buf = vec![0u8; READ_BUF];
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let tick = idle_tick(&session);
        tokio::select! {
            _ = cancel.cancelled() => break,
            waited = timeout(tick, session.socket.readable()) => match waited {
                // Idle tick elapsed; loop to re-check cancellation and
                // pick up a changed advisory timeout.
                Err(_elapsed) => continue,
                Ok(Err(e)) => {
                    session.report_op_error(&ClientError::Io(e));
                    break;
                }
                Ok(Ok(())) => match session.socket.try_read(&mut buf) {
                    Ok(0) => {
                        session.remote_closed();
                        break;
                    }
                    Ok(n) => {
                        session
                            .counters
                            .bytes_received
                            .fetch_add(n as u64, Ordering::Relaxed);
                        session.batcher.append(&buf[..n]);
                    }
                    Err(ref e) if is_would_block(e) => continue,
                    Err(e) => {
                        session.report_op_error(&ClientError::Io(e));
                        break;
                    }
                },
            }
        }
    }
    session.reader_active.store(false, Ordering::Release);
    debug!("stream reader exited");
}

fn idle_tick(session: &Session) -> Duration {
    let ms = session.read_timeout_ms.load(Ordering::Acquire);
    Duration::from_millis(ms).clamp(MIN_TICK, MAX_TICK)
}
