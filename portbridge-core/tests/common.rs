//! Shared fixtures: tracing init and scripted peers on ephemeral ports.

use portbridge_core::{ClientEvent, ConnectConfig, TcpClient};
use std::{future::Future, net::SocketAddr, sync::Once, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::broadcast,
    time::timeout,
};
use tracing::Level;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

/// Bind an ephemeral listener and run `script` on the first accepted
/// connection. Returns the address to connect to.
pub async fn spawn_peer<F, Fut>(script: F) -> SocketAddr
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            script(stream).await;
        }
    });
    addr
}

/// A peer that echoes everything until the client goes away.
pub async fn spawn_echo_peer() -> SocketAddr {
    spawn_peer(|mut stream| async move {
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if stream.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
    .await
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);
    port
}

pub async fn connect_client(addr: SocketAddr) -> TcpClient {
    let client = TcpClient::new();
    client
        .connect(ConnectConfig::new(addr.ip().to_string(), addr.port()))
        .await
        .expect("connect");
    client
}

/// Next event within `ms`, or panic.
pub async fn recv_event(rx: &mut broadcast::Receiver<ClientEvent>, ms: u64) -> ClientEvent {
    timeout(Duration::from_millis(ms), rx.recv())
        .await
        .expect("event deadline")
        .expect("event channel open")
}

/// Collect `Data` payloads until the disconnect event arrives; returns
/// the concatenated bytes and the disconnect reason tag.
pub async fn drain_until_disconnect(
    rx: &mut broadcast::Receiver<ClientEvent>,
    ms: u64,
) -> (Vec<u8>, String) {
    let mut bytes = Vec::new();
    loop {
        match recv_event(rx, ms).await {
            ClientEvent::Data(d) => bytes.extend_from_slice(&d),
            ClientEvent::Disconnected(reason) => return (bytes, reason.tag().to_string()),
        }
    }
}

/// Assert no event is pending right now.
pub fn assert_no_event(rx: &mut broadcast::Receiver<ClientEvent>) {
    match rx.try_recv() {
        Err(broadcast::error::TryRecvError::Empty) => {}
        other => panic!("expected no event, got {other:?}"),
    }
}
