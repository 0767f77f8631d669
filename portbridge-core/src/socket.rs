use crate::{
    config::{ConnectConfig, WRITE_STEP},
    error::{is_peer_gone, is_would_block, ClientError, ClientResult},
};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::{
    io,
    mem::MaybeUninit,
    net::{IpAddr, Shutdown, SocketAddr},
    time::Instant,
};
use tokio::{net::TcpStream, time::timeout};
use tracing::{debug, trace};

/// Result of the cheap health probe.
#[derive(Debug)]
pub(crate) enum Probe {
    /// Socket looks alive (peeked data or no data pending)
    Healthy,
    /// Peer closed its send direction
    Eof,
    /// Unexpected OS error; the session is dead
    Fatal(io::Error),
}

/// Owns one OS socket in non-blocking mode.
///
/// All I/O goes through tokio's readiness API so `WouldBlock` surfaces
/// unchanged; connect-time socket options are applied with `socket2`
/// before the connect is initiated.
#[derive(Debug)]
pub(crate) struct SocketHandle {
    stream: TcpStream,
}

impl SocketHandle {
    /// Connect with one global deadline across all resolved candidates.
    ///
    /// Candidates are tried in order: a literal IP resolves without DNS,
    /// otherwise the resolver's answer is used as-is. The first candidate
    /// that completes wins. Exhausting the budget reports `Timeout`;
    /// anything else reports the last OS-level error.
    pub async fn connect(cfg: &ConnectConfig) -> ClientResult<Self> {
        let deadline = Instant::now() + cfg.effective_timeout();
        let candidates = resolve(&cfg.host, cfg.port, deadline).await?;

        let mut last_err: Option<io::Error> = None;
        for addr in candidates {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::connect_timeout());
            }
            match connect_candidate(addr, cfg, deadline).await {
                Ok(stream) => {
                    debug!(%addr, "connected");
                    return Ok(Self { stream });
                }
                Err(CandidateError::Deadline) => {
                    return Err(ClientError::connect_timeout());
                }
                Err(CandidateError::Os(e)) => {
                    trace!(%addr, error = %e, "candidate failed");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(ClientError::Io(e)),
            None => Err(ClientError::connect_timeout()),
        }
    }

    /// Wait until the socket is readable.
    #[inline]
    pub async fn readable(&self) -> io::Result<()> {
        self.stream.readable().await
    }

    /// Non-blocking read; `Ok(0)` is peer EOF, `WouldBlock` passes through.
    #[inline]
    pub fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.try_read(buf)
    }

    /// Send the whole payload before `deadline`, waiting for writability
    /// in short steps on `WouldBlock`. Partial writes advance the cursor.
    pub async fn send_all(&self, data: &[u8], deadline: Instant) -> ClientResult<usize> {
        let mut sent = 0;
        while sent < data.len() {
            match self.stream.try_write(&data[sent..]) {
                Ok(n) => {
                    sent += n;
                }
                Err(e) if is_would_block(&e) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(ClientError::write_timeout());
                    }
                    match timeout(WRITE_STEP.min(remaining), self.stream.writable()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => return Err(classify_send(e)),
                        Err(_elapsed) => {}
                    }
                }
                Err(e) => return Err(classify_send(e)),
            }
        }
        Ok(sent)
    }

    /// Non-blocking, non-consuming one-byte peek with an immediate poll.
    ///
    /// Peeked bytes stay in the kernel buffer for the next real read.
    pub fn probe(&self) -> Probe {
        let sock = SockRef::from(&self.stream);
        let mut buf = [MaybeUninit::<u8>::uninit(); 1];
        match sock.peek(&mut buf) {
            Ok(0) => Probe::Eof,
            Ok(_) => Probe::Healthy,
            Err(e) if is_would_block(&e) => Probe::Healthy,
            Err(e) => Probe::Fatal(e),
        }
    }

    /// Best-effort full shutdown; wakes any task parked on readiness.
    pub fn shutdown(&self) {
        let _ = SockRef::from(&self.stream).shutdown(Shutdown::Both);
    }
}

/// Broken-pipe-class send failures read as a remote disconnect.
fn classify_send(e: io::Error) -> ClientError {
    if is_peer_gone(&e) {
        ClientError::Closed
    } else {
        ClientError::Io(e)
    }
}

enum CandidateError {
    /// Global budget elapsed while this candidate was pending
    Deadline,
    Os(io::Error),
}

impl From<io::Error> for CandidateError {
    fn from(e: io::Error) -> Self {
        CandidateError::Os(e)
    }
}

/// Numeric-first resolution: a literal IP skips DNS entirely; otherwise
/// the lookup runs under whatever budget the deadline has left.
async fn resolve(host: &str, port: u16, deadline: Instant) -> ClientResult<Vec<SocketAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(ClientError::connect_timeout());
    }
    let addrs = match timeout(remaining, tokio::net::lookup_host((host, port))).await {
        Ok(Ok(iter)) => iter.collect::<Vec<_>>(),
        Ok(Err(e)) => return Err(ClientError::Io(e)),
        Err(_elapsed) => return Err(ClientError::connect_timeout()),
    };
    if addrs.is_empty() {
        return Err(ClientError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {host}"),
        )));
    }
    Ok(addrs)
}

/// One non-blocking connect attempt: configure, initiate, wait for
/// writability up to the remaining global budget, then read `SO_ERROR`.
async fn connect_candidate(
    addr: SocketAddr,
    cfg: &ConnectConfig,
    deadline: Instant,
) -> Result<TcpStream, CandidateError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    socket.set_nodelay(cfg.no_delay)?;
    if cfg.keep_alive {
        socket.set_keepalive(true)?;
    }
    // Broken writes must surface as errors, not kill the process.
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    socket.set_nosigpipe(true)?;

    match socket.connect(&addr.into()) {
        Ok(()) => {}
        Err(e) if connect_in_progress(&e) => {}
        Err(e) => return Err(e.into()),
    }

    let stream = TcpStream::from_std(socket.into())?;

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(CandidateError::Deadline);
    }
    match timeout(remaining, stream.writable()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_elapsed) => return Err(CandidateError::Deadline),
    }

    // Writability after a non-blocking connect means "completed", not
    // "succeeded"; the verdict is in SO_ERROR.
    if let Some(e) = SockRef::from(&stream).take_error()? {
        return Err(e.into());
    }
    Ok(stream)
}

#[inline]
fn connect_in_progress(e: &io::Error) -> bool {
    #[cfg(unix)]
    if e.raw_os_error() == Some(libc::EINPROGRESS) {
        return true;
    }
    e.kind() == io::ErrorKind::WouldBlock
}
