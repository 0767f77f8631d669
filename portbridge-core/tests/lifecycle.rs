mod common;

use common::{
    assert_no_event, closed_port, connect_client, init_tracing, recv_event, spawn_echo_peer,
    spawn_peer,
};
use portbridge_core::{
    ClientError, ClientEvent, ConnState, ConnectConfig, DisconnectReason, ReadConfig, RrRequest,
    TcpClient,
};
use std::time::Duration;
use tokio::{io::AsyncReadExt, time::sleep};

#[tokio::test]
async fn connect_then_disconnect_emits_one_manual_event() {
    init_tracing();
    let addr = spawn_echo_peer().await;
    let client = connect_client(addr).await;
    let mut events = client.subscribe_events();

    assert!(client.is_connected());
    client.disconnect().await.unwrap();
    assert!(!client.is_connected());

    match recv_event(&mut events, 500).await {
        ClientEvent::Disconnected(DisconnectReason::Manual) => {}
        other => panic!("expected manual disconnect, got {other:?}"),
    }
    assert_no_event(&mut events);
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    init_tracing();
    let addr = spawn_echo_peer().await;
    let client = connect_client(addr).await;
    let mut events = client.subscribe_events();

    client.disconnect().await.unwrap();
    client.disconnect().await.unwrap();

    match recv_event(&mut events, 500).await {
        ClientEvent::Disconnected(DisconnectReason::Manual) => {}
        other => panic!("expected one manual disconnect, got {other:?}"),
    }
    assert_no_event(&mut events);
}

#[tokio::test]
async fn connect_to_closed_port_fails_without_disconnect_event() {
    init_tracing();
    let client = TcpClient::new();
    let mut events = client.subscribe_events();

    let err = client
        .connect(ConnectConfig::new("127.0.0.1", closed_port()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Io(_)), "got {err:?}");
    assert!(!client.is_connected());
    assert_eq!(client.state(), ConnState::Idle);
    assert_no_event(&mut events);
}

#[tokio::test]
async fn invalid_connect_arguments_rejected_before_io() {
    init_tracing();
    let client = TcpClient::new();
    let err = client
        .connect(ConnectConfig::new("", 9100))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));

    let err = client
        .connect(ConnectConfig::new("127.0.0.1", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));
}

#[tokio::test]
async fn zero_sized_knobs_are_invalid_arguments() {
    init_tracing();
    let addr = spawn_echo_peer().await;
    let client = connect_client(addr).await;

    let err = client
        .start_read(ReadConfig {
            chunk_size: 0,
            read_timeout: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));

    let err = client
        .write_and_read(RrRequest {
            max_bytes: 0,
            ..RrRequest::new(vec![1u8])
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));

    let err = client.write(&[]).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));

    // None of those touched the session.
    assert!(client.is_connected());
}

#[tokio::test]
async fn probe_detects_peer_eof_exactly_once() {
    init_tracing();
    // Peer accepts, reads nothing, hangs up after a moment.
    let addr = spawn_peer(|stream| async move {
        sleep(Duration::from_millis(50)).await;
        drop(stream);
    })
    .await;

    let client = connect_client(addr).await;
    let mut events = client.subscribe_events();
    assert!(client.is_connected());

    sleep(Duration::from_millis(150)).await;
    assert!(!client.is_connected());
    assert!(!client.is_connected(), "second probe stays false");

    match recv_event(&mut events, 500).await {
        ClientEvent::Disconnected(DisconnectReason::Remote) => {}
        other => panic!("expected remote disconnect, got {other:?}"),
    }
    assert_no_event(&mut events);
}

#[tokio::test]
async fn reconnect_tears_down_previous_session_manually() {
    init_tracing();
    let first = spawn_echo_peer().await;
    let second = spawn_echo_peer().await;

    let client = connect_client(first).await;
    let mut events = client.subscribe_events();

    client
        .connect(ConnectConfig::new(
            second.ip().to_string(),
            second.port(),
        ))
        .await
        .unwrap();

    match recv_event(&mut events, 500).await {
        ClientEvent::Disconnected(DisconnectReason::Manual) => {}
        other => panic!("expected manual disconnect for replaced session, got {other:?}"),
    }
    assert!(client.is_connected());

    // The new session works end to end.
    assert_eq!(client.write(&[0x55]).await.unwrap(), 1);
}

#[tokio::test]
async fn state_watch_follows_the_lifecycle() {
    init_tracing();
    let addr = spawn_echo_peer().await;
    let client = TcpClient::new();
    let state = client.watch_state();
    assert_eq!(*state.borrow(), ConnState::Idle);

    client
        .connect(ConnectConfig::new(addr.ip().to_string(), addr.port()))
        .await
        .unwrap();
    assert_eq!(*state.borrow(), ConnState::Open);

    client.disconnect().await.unwrap();
    assert_eq!(*state.borrow(), ConnState::Closed);
}

#[tokio::test]
async fn operations_after_close_fail_fast() {
    init_tracing();
    let addr = spawn_echo_peer().await;
    let client = connect_client(addr).await;
    client.disconnect().await.unwrap();

    assert!(matches!(
        client.write(&[1]).await.unwrap_err(),
        ClientError::NotConnected
    ));
    assert!(matches!(
        client.start_read(ReadConfig::default()).await.unwrap_err(),
        ClientError::NotConnected
    ));
    assert!(matches!(
        client
            .write_and_read(RrRequest::new(vec![1u8]))
            .await
            .unwrap_err(),
        ClientError::NotConnected
    ));
    // Status and teardown stay infallible.
    assert!(!client.is_reading());
    assert_eq!(client.stop_read().await.unwrap(), false);
    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn stats_accumulate_across_sessions() {
    init_tracing();
    let addr = spawn_echo_peer().await;
    let client = connect_client(addr).await;
    client.write(&[1, 2, 3]).await.unwrap();
    client.disconnect().await.unwrap();

    let addr = spawn_echo_peer().await;
    client
        .connect(ConnectConfig::new(addr.ip().to_string(), addr.port()))
        .await
        .unwrap();
    client.write(&[4, 5]).await.unwrap();

    let stats = client.stats();
    assert_eq!(stats.bytes_sent, 5);
}

#[tokio::test]
async fn write_failure_after_peer_reset_closes_session() {
    init_tracing();
    // Peer accepts and drops immediately.
    let addr = spawn_peer(|mut stream| async move {
        let mut buf = [0u8; 16];
        let _ = stream.read(&mut buf).await;
        drop(stream);
    })
    .await;

    let client = connect_client(addr).await;
    let mut events = client.subscribe_events();

    // First write lands in the kernel buffer; the peer then hangs up.
    let _ = client.write(&[0u8; 16]).await;
    sleep(Duration::from_millis(100)).await;

    // Retry until the broken pipe surfaces; a couple of writes may be
    // needed before the kernel reports it.
    let mut saw_failure = false;
    for _ in 0..10 {
        match client.write(&[0u8; 1024]).await {
            Ok(_) => sleep(Duration::from_millis(20)).await,
            Err(e) => {
                assert!(
                    matches!(e, ClientError::Closed | ClientError::Io(_) | ClientError::NotConnected),
                    "got {e:?}"
                );
                saw_failure = true;
                break;
            }
        }
    }
    assert!(saw_failure, "write never failed after peer reset");

    // Exactly one disconnect for the session.
    let ev = recv_event(&mut events, 1000).await;
    assert!(
        matches!(ev, ClientEvent::Disconnected(_)),
        "expected disconnect, got {ev:?}"
    );
    assert_no_event(&mut events);
}
