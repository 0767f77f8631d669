use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use std::time::Duration;

/// Debounce window before a partially filled batch buffer is flushed.
pub const MERGE_WINDOW: Duration = Duration::from_millis(10);

/// Batch buffer size that forces an immediate flush.
pub const MERGE_CAP: usize = 16 * 1024;

/// Upper bound for a single socket read in the RR receive loop.
pub const READ_SLICE: usize = 4096;

/// Default maximum size of one emitted `Data` event.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default reader idle tick (also the advisory `set_read_timeout` default).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Budget for a plain `write` to drain its payload.
pub const WRITE_BUDGET: Duration = Duration::from_secs(10);

/// Writability wait step inside send loops.
pub const WRITE_STEP: Duration = Duration::from_millis(10);

/// Longest single readability wait anywhere in the RR receive loop.
pub const RR_MAX_STEP: Duration = Duration::from_millis(200);

/// Connection parameters, immutable per attempt.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Target hostname or literal IP
    pub host: String,
    /// TCP port, 1..=65535
    pub port: u16,
    /// Global connect deadline across all resolved candidates
    pub timeout: Duration,
    /// Disable Nagle on the connected socket
    pub no_delay: bool,
    /// Enable TCP keepalive on the connected socket
    pub keep_alive: bool,
}

impl ConnectConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Boundary validation; rejects before any I/O.
    pub(crate) fn validate(&self) -> ClientResult<()> {
        if self.host.trim().is_empty() {
            return Err(ClientError::InvalidArgument("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ClientError::InvalidArgument("port must be 1..=65535".into()));
        }
        Ok(())
    }

    /// A zero deadline is treated as the 1 ms minimum.
    #[inline]
    pub(crate) fn effective_timeout(&self) -> Duration {
        self.timeout.max(Duration::from_millis(1))
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 9100,
            timeout: Duration::from_millis(3000),
            no_delay: true,
            keep_alive: true,
        }
    }
}

/// Streaming read configuration for `start_read`.
#[derive(Debug, Clone, Copy)]
pub struct ReadConfig {
    /// Max bytes per emitted `Data` event slice
    pub chunk_size: usize,
    /// Advisory idle tick for the reader's readable-wait
    pub read_timeout: Option<Duration>,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout: None,
        }
    }
}

impl ReadConfig {
    pub(crate) fn validate(&self) -> ClientResult<()> {
        if self.chunk_size == 0 {
            return Err(ClientError::InvalidArgument("chunkSize must be > 0".into()));
        }
        Ok(())
    }
}

/// One atomic write-then-read cycle.
#[derive(Debug, Clone)]
pub struct RrRequest {
    /// Request payload written before the receive phase
    pub payload: Bytes,
    /// Global deadline covering write and receive phases
    pub timeout: Duration,
    /// Response cap in bytes
    pub max_bytes: usize,
    /// Optional literal byte pattern for early exit
    pub expect: Option<Bytes>,
    /// Cancel the stream reader for the duration of the cycle
    pub suspend_stream: bool,
}

impl RrRequest {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> ClientResult<()> {
        if self.payload.is_empty() {
            return Err(ClientError::InvalidArgument("data must not be empty".into()));
        }
        if self.max_bytes == 0 {
            return Err(ClientError::InvalidArgument("maxBytes must be > 0".into()));
        }
        if let Some(p) = &self.expect {
            if p.is_empty() {
                return Err(ClientError::InvalidArgument(
                    "expect pattern must not be empty".into(),
                ));
            }
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn effective_timeout(&self) -> Duration {
        self.timeout.max(Duration::from_millis(1))
    }
}

impl Default for RrRequest {
    fn default() -> Self {
        Self {
            payload: Bytes::new(),
            timeout: Duration::from_millis(1000),
            max_bytes: 4096,
            expect: None,
            suspend_stream: true,
        }
    }
}

/// Outcome of a completed RR cycle.
#[derive(Debug, Clone)]
pub struct RrOutcome {
    /// Bytes written during the write phase (always the full request)
    pub bytes_sent: usize,
    /// Collected response, `len() <= max_bytes`
    pub data: Bytes,
    /// Whether the expect pattern matched inside `data`
    pub matched: bool,
}
