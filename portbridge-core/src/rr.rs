//! Request/response engine: one atomic write-then-read cycle under a
//! global deadline, with a response cap, optional pattern early-exit and
//! optional suspension of the stream reader.

use crate::{
    config::{RrOutcome, RrRequest, READ_SLICE, RR_MAX_STEP},
    error::{is_would_block, ClientError, ClientResult},
    pattern,
    session::Session,
};
use bytes::BytesMut;
use std::{
    sync::{atomic::Ordering, Arc},
    time::{Duration, Instant},
};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Lower clamp of the adaptive idle threshold (and its no-sample default).
const IDLE_FLOOR: Duration = Duration::from_millis(50);
/// Upper clamp of the adaptive idle threshold.
const IDLE_CEIL: Duration = Duration::from_millis(200);

/// Ring of the most recent inter-arrival gaps. The threshold derived
/// from it decides when a reply without a terminator counts as complete.
#[derive(Debug)]
pub(crate) struct IdleEstimator {
    samples: [Duration; 5],
    len: usize,
    next: usize,
}

impl IdleEstimator {
    pub fn new() -> Self {
        Self {
            samples: [Duration::ZERO; 5],
            len: 0,
            next: 0,
        }
    }

    pub fn record(&mut self, gap: Duration) {
        self.samples[self.next] = gap;
        self.next = (self.next + 1) % self.samples.len();
        self.len = (self.len + 1).min(self.samples.len());
    }

    /// `clamp(median(last <=5 gaps) * 1.75, 50 ms, 200 ms)`; 50 ms when
    /// no samples exist yet.
    pub fn threshold(&self) -> Duration {
        if self.len == 0 {
            return IDLE_FLOOR;
        }
        let mut sorted = self.samples[..self.len].to_vec();
        sorted.sort_unstable();
        let median = if self.len % 2 == 1 {
            sorted[self.len / 2]
        } else {
            (sorted[self.len / 2 - 1] + sorted[self.len / 2]) / 2
        };
        // 1.75x the median, exact in integer nanoseconds.
        (median.saturating_mul(7) / 4).clamp(IDLE_FLOOR, IDLE_CEIL)
    }
}

/// Clears the in-flight flag on every exit path, unwind included.
struct InflightGuard<'a> {
    session: &'a Session,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.session.rr_inflight.store(false, Ordering::Release);
    }
}

/// Run one RR cycle on `session`.
///
/// Preconditions (checked here): session `Open`, no other RR in flight.
/// The stream reader, when `suspend_stream` is set, is cancelled before
/// the write phase and resumed afterwards only if the session is still
/// open.
pub(crate) async fn execute(session: &Arc<Session>, req: &RrRequest) -> ClientResult<RrOutcome> {
    req.validate()?;
    if !session.is_open() {
        return Err(ClientError::NotConnected);
    }
    if session
        .rr_inflight
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(ClientError::Busy);
    }
    let _flag = InflightGuard {
        session: session.as_ref(),
    };
    session.counters.rr_total.fetch_add(1, Ordering::Relaxed);

    let was_reading = if req.suspend_stream {
        session.suspend_reader().await
    } else {
        false
    };

    let result = exchange(session, req).await;

    if was_reading && session.is_open() {
        session.start_reader(None).await;
    }
    if matches!(result, Err(ClientError::Timeout { .. })) {
        session.counters.rr_timeouts.fetch_add(1, Ordering::Relaxed);
    }
    result
}

async fn exchange(session: &Arc<Session>, req: &RrRequest) -> ClientResult<RrOutcome> {
    let deadline = Instant::now() + req.effective_timeout();

    // Write phase under the shared write lock: plain writes and the RR
    // write phase never interleave on the wire.
    {
        let _w = session.write_lock.lock().await;
        match session.socket.send_all(&req.payload, deadline).await {
            Ok(n) => {
                session
                    .counters
                    .bytes_sent
                    .fetch_add(n as u64, Ordering::Relaxed);
                trace!(bytes = n, "rr request written");
            }
            Err(e) => {
                session.report_op_error(&e);
                return Err(e);
            }
        }
    }

    receive(session, req, deadline).await
}

async fn receive(
    session: &Arc<Session>,
    req: &RrRequest,
    deadline: Instant,
) -> ClientResult<RrOutcome> {
    let cap = req.max_bytes;
    let sent = req.payload.len();
    let mut acc = BytesMut::with_capacity(cap.min(READ_SLICE));
    let mut slice = [0u8; READ_SLICE];
    let mut last_arrival: Option<Instant> = None;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return finish_on_deadline(acc, sent);
        }

        // With a pattern (or before the first byte) wait in fixed steps
        // up to the deadline; in adaptive mode the step is the current
        // idle threshold so an idle gap is noticed promptly.
        let step = if req.expect.is_some() || acc.is_empty() {
            RR_MAX_STEP.min(remaining)
        } else {
            idle_threshold(session).min(remaining)
        };

        match timeout(step, session.socket.readable()).await {
            Err(_elapsed) => {
                if req.expect.is_none() {
                    if let Some(prev) = last_arrival {
                        if prev.elapsed() >= idle_threshold(session) {
                            debug!(bytes = acc.len(), "rr settled on idle gap");
                            return Ok(outcome(sent, acc, false));
                        }
                    }
                }
                continue;
            }
            Ok(Err(e)) => {
                let e = ClientError::Io(e);
                session.report_op_error(&e);
                return Err(e);
            }
            Ok(Ok(())) => {
                let want = READ_SLICE.min(cap - acc.len());
                match session.socket.try_read(&mut slice[..want]) {
                    Ok(0) => {
                        // Peer FIN mid-cycle: collected bytes are still a
                        // valid reply; an empty accumulator is not.
                        session.remote_closed();
                        return if acc.is_empty() {
                            Err(ClientError::Closed)
                        } else {
                            Ok(outcome(sent, acc, false))
                        };
                    }
                    Ok(n) => {
                        let now = Instant::now();
                        if let Some(prev) = last_arrival {
                            if let Ok(mut est) = session.idle.lock() {
                                est.record(now.duration_since(prev));
                            }
                        }
                        last_arrival = Some(now);
                        acc.extend_from_slice(&slice[..n]);
                        session
                            .counters
                            .bytes_received
                            .fetch_add(n as u64, Ordering::Relaxed);

                        if let Some(pat) = &req.expect {
                            if pattern::contains(&acc, pat) {
                                debug!(bytes = acc.len(), "rr pattern matched");
                                return Ok(outcome(sent, acc, true));
                            }
                        }
                        if acc.len() >= cap {
                            debug!(bytes = acc.len(), "rr response cap reached");
                            return Ok(outcome(sent, acc, false));
                        }
                    }
                    Err(ref e) if is_would_block(e) => continue,
                    Err(e) => {
                        let e = ClientError::Io(e);
                        session.report_op_error(&e);
                        return Err(e);
                    }
                }
            }
        }
    }
}

/// Deadline policy: collected bytes are a successful partial response;
/// an empty accumulator is a timeout error (the write already completed,
/// which is why the caller still learns the full request length).
fn finish_on_deadline(acc: BytesMut, sent: usize) -> ClientResult<RrOutcome> {
    if acc.is_empty() {
        debug!("rr deadline elapsed with no reply");
        return Err(ClientError::response_timeout());
    }
    Ok(outcome(sent, acc, false))
}

fn outcome(sent: usize, acc: BytesMut, matched: bool) -> RrOutcome {
    RrOutcome {
        bytes_sent: sent,
        data: acc.freeze(),
        matched,
    }
}

fn idle_threshold(session: &Session) -> Duration {
    session
        .idle
        .lock()
        .map(|est| est.threshold())
        .unwrap_or(IDLE_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_samples_defaults_to_floor() {
        let est = IdleEstimator::new();
        assert_eq!(est.threshold(), IDLE_FLOOR);
    }

    #[test]
    fn short_gaps_clamp_to_floor() {
        let mut est = IdleEstimator::new();
        for _ in 0..3 {
            est.record(Duration::from_millis(10));
        }
        // 10 * 1.75 = 17.5 ms, below the floor
        assert_eq!(est.threshold(), IDLE_FLOOR);
    }

    #[test]
    fn median_scaling_inside_the_band() {
        let mut est = IdleEstimator::new();
        est.record(Duration::from_millis(30));
        est.record(Duration::from_millis(60));
        est.record(Duration::from_millis(40));
        // median 40 ms * 1.75 = 70 ms
        assert_eq!(est.threshold(), Duration::from_millis(70));
    }

    #[test]
    fn long_gaps_clamp_to_ceiling() {
        let mut est = IdleEstimator::new();
        for _ in 0..5 {
            est.record(Duration::from_millis(500));
        }
        assert_eq!(est.threshold(), IDLE_CEIL);
    }

    #[test]
    fn ring_keeps_only_last_five() {
        let mut est = IdleEstimator::new();
        for _ in 0..5 {
            est.record(Duration::from_millis(500));
        }
        // Five fast gaps displace every slow one.
        for _ in 0..5 {
            est.record(Duration::from_millis(20));
        }
        assert_eq!(est.threshold(), IDLE_FLOOR);
    }

    #[test]
    fn even_sample_count_averages_middle_pair() {
        let mut est = IdleEstimator::new();
        est.record(Duration::from_millis(40));
        est.record(Duration::from_millis(80));
        // median (40+80)/2 = 60 ms, * 1.75 = 105 ms
        assert_eq!(est.threshold(), Duration::from_millis(105));
    }
}
