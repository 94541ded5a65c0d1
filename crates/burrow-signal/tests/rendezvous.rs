//! Integration tests for the rendezvous endpoint over real sockets.
//!
//! Covers the subprotocol gate, slot allocation and pairing, opaque frame
//! forwarding, close-code propagation, and the slot deadlines.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use burrow_common::protocol::{IceServer, InitMsg, PROTOCOL};
use burrow_signal::config::ServerConfig;
use burrow_signal::{router, AppState, TurnMinter};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_server(config: ServerConfig) -> SocketAddr {
    let app = router(AppState::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, path: &str, subprotocol: Option<&str>) -> Socket {
    let mut request = format!("ws://{addr}{path}").into_client_request().unwrap();
    if let Some(proto) = subprotocol {
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", proto.parse().unwrap());
    }
    let (socket, _response) = connect_async(request).await.unwrap();
    socket
}

async fn next_message(socket: &mut Socket) -> Message {
    timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("no message within deadline")
        .expect("stream ended")
        .expect("socket error")
}

async fn read_init(socket: &mut Socket) -> InitMsg {
    match next_message(socket).await {
        Message::Text(text) => serde_json::from_str(&text).expect("init frame is JSON"),
        other => panic!("expected init frame, got {other:?}"),
    }
}

async fn expect_close(socket: &mut Socket, code: u16) {
    loop {
        match next_message(socket).await {
            Message::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), code);
                return;
            }
            Message::Close(None) => panic!("close without code, expected {code}"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected close {code}, got {other:?}"),
        }
    }
}

/// Open a fresh pair on one slot, with init frames consumed.
async fn paired(addr: SocketAddr) -> (Socket, Socket, String) {
    let mut first = connect(addr, "/", Some(PROTOCOL)).await;
    let slot = read_init(&mut first).await.slot;
    let mut second = connect(addr, &format!("/{slot}"), Some(PROTOCOL)).await;
    let init = read_init(&mut second).await;
    assert_eq!(init.slot, slot);
    (first, second, slot)
}

#[tokio::test]
async fn init_frame_carries_slot_and_ice_servers() {
    let addr = spawn_server(ServerConfig {
        stun_servers: vec![IceServer::stun("stun:stun.example.org:3478")],
        turn: Some(TurnMinter::new(
            "turn:turn.example.org:3478",
            "sekrit",
            Duration::from_secs(600),
        )),
        ..Default::default()
    })
    .await;

    let mut socket = connect(addr, "/", Some(PROTOCOL)).await;
    let init = read_init(&mut socket).await;

    assert_eq!(init.slot, "1");
    assert_eq!(init.ice_servers.len(), 2);
    assert_eq!(init.ice_servers[0].urls, vec!["stun:stun.example.org:3478"]);
    let turn = &init.ice_servers[1];
    assert!(turn.username.is_some());
    assert!(turn.credential.is_some());
}

#[tokio::test]
async fn wrong_subprotocol_is_rejected_before_init() {
    let addr = spawn_server(ServerConfig::default()).await;

    let mut socket = connect(addr, "/", Some("3")).await;
    expect_close(&mut socket, 4003).await;

    let mut socket = connect(addr, "/", None).await;
    expect_close(&mut socket, 4003).await;
}

#[tokio::test]
async fn joining_an_unknown_slot_closes_4000() {
    let addr = spawn_server(ServerConfig::default()).await;

    let mut socket = connect(addr, "/99999", Some(PROTOCOL)).await;
    expect_close(&mut socket, 4000).await;

    let mut socket = connect(addr, "/notaslot", Some(PROTOCOL)).await;
    expect_close(&mut socket, 4000).await;
}

#[tokio::test]
async fn frames_are_forwarded_opaquely_in_order() {
    let addr = spawn_server(ServerConfig::default()).await;
    let (mut first, mut second, _slot) = paired(addr).await;

    for frame in ["one", "two", "three"] {
        first.send(Message::Text(frame.into())).await.unwrap();
    }
    for expected in ["one", "two", "three"] {
        match next_message(&mut second).await {
            Message::Text(text) => assert_eq!(text, expected),
            other => panic!("expected forwarded frame, got {other:?}"),
        }
    }

    second
        .send(Message::Text("backwards".into()))
        .await
        .unwrap();
    match next_message(&mut first).await {
        Message::Text(text) => assert_eq!(text, "backwards"),
        other => panic!("expected forwarded frame, got {other:?}"),
    }
}

#[tokio::test]
async fn a_third_join_is_refused() {
    let addr = spawn_server(ServerConfig::default()).await;
    let (_first, _second, slot) = paired(addr).await;

    let mut third = connect(addr, &format!("/{slot}"), Some(PROTOCOL)).await;
    expect_close(&mut third, 4000).await;
}

#[tokio::test]
async fn protocol_close_codes_propagate_to_the_peer() {
    let addr = spawn_server(ServerConfig::default()).await;

    let (mut first, mut second, _slot) = paired(addr).await;
    first
        .close(Some(CloseFrame {
            code: WsCloseCode::from(4005),
            reason: "bad key".into(),
        }))
        .await
        .unwrap();
    expect_close(&mut second, 4005).await;

    let (mut first, mut second, _slot) = paired(addr).await;
    first
        .close(Some(CloseFrame {
            code: WsCloseCode::from(1000),
            reason: "done".into(),
        }))
        .await
        .unwrap();
    expect_close(&mut second, 4004).await;
}

#[tokio::test]
async fn an_unpaired_slot_times_out_with_4001() {
    let addr = spawn_server(ServerConfig {
        idle_timeout: Duration::from_millis(200),
        ..Default::default()
    })
    .await;

    let mut socket = connect(addr, "/", Some(PROTOCOL)).await;
    let _init = read_init(&mut socket).await;
    expect_close(&mut socket, 4001).await;
}

#[tokio::test]
async fn a_timed_out_slot_can_no_longer_be_joined() {
    let addr = spawn_server(ServerConfig {
        idle_timeout: Duration::from_millis(100),
        ..Default::default()
    })
    .await;

    let mut socket = connect(addr, "/", Some(PROTOCOL)).await;
    let slot = read_init(&mut socket).await.slot;
    expect_close(&mut socket, 4001).await;

    let mut late = connect(addr, &format!("/{slot}"), Some(PROTOCOL)).await;
    expect_close(&mut late, 4000).await;
}

#[tokio::test]
async fn slot_exhaustion_closes_4002() {
    let addr = spawn_server(ServerConfig {
        max_slots: 1,
        ..Default::default()
    })
    .await;

    let mut first = connect(addr, "/", Some(PROTOCOL)).await;
    let _init = read_init(&mut first).await;

    let mut second = connect(addr, "/", Some(PROTOCOL)).await;
    expect_close(&mut second, 4002).await;
}

#[tokio::test]
async fn the_paired_handshake_deadline_closes_both_sides() {
    let addr = spawn_server(ServerConfig {
        handshake_timeout: Duration::from_millis(200),
        ..Default::default()
    })
    .await;

    let (mut first, mut second, _slot) = paired(addr).await;
    expect_close(&mut first, 4001).await;
    expect_close(&mut second, 4001).await;
}

#[tokio::test]
async fn host_allowlist_rejects_unknown_hosts() {
    let addr = spawn_server(ServerConfig {
        allowed_hosts: vec!["rendezvous.example.org".into()],
        ..Default::default()
    })
    .await;

    // tungstenite derives the Host header from the URI, which is the bare
    // IP here and not on the allowlist, so the upgrade is refused.
    let request = format!("ws://{addr}/").into_client_request().unwrap();
    assert!(connect_async(request).await.is_err());
}
