//! The rendezvous WebSocket endpoint.
//!
//! Path `/` parks the connection on a fresh slot; path `/<slot>` joins an
//! existing one. After the subprotocol gate and the init frame, the server
//! relays text frames between the two sockets of a slot without looking at
//! them, and translates one side's close into a close code for the other.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use burrow_common::protocol::{CloseCode, InitMsg, PROTOCOL};

use crate::slots::{Joined, PeerEvent, Waiting};
use crate::AppState;

/// Close code sent to a socket that violated the framing rules.
const CLOSE_PROTOCOL_ERROR: u16 = 1002;

pub async fn ws_handler(
    State(state): State<AppState>,
    slot: Option<Path<String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let slot = slot.map(|Path(s)| s);
    ws.protocols([PROTOCOL])
        .on_upgrade(move |socket| handle_socket(socket, slot, state))
}

async fn handle_socket(mut socket: WebSocket, slot: Option<String>, state: AppState) {
    // The subprotocol gate comes before any other I/O, init frame included.
    let agreed = socket
        .protocol()
        .and_then(|p| p.to_str().ok())
        .map(str::to_owned);
    if agreed.as_deref() != Some(PROTOCOL) {
        debug!(?agreed, "rejecting socket with wrong subprotocol");
        close_with(&mut socket, CloseCode::WrongProto.as_u16(), "wrong protocol").await;
        return;
    }

    match slot {
        None => host_new_slot(socket, state).await,
        Some(slot) => join_slot(socket, &slot, state).await,
    }
}

/// First arrival: allocate a slot, send the init frame, and wait for the
/// second peer until the idle deadline.
async fn host_new_slot(mut socket: WebSocket, state: AppState) {
    let (to_first, inbox) = mpsc::unbounded_channel();
    let (join, join_rx) = oneshot::channel();
    let slot = match state.slots.allocate(Waiting { to_first, join }) {
        Some(slot) => slot,
        None => {
            warn!("out of slots");
            close_with(&mut socket, CloseCode::NoMoreSlots.as_u16(), "no more slots").await;
            return;
        }
    };
    info!(slot, "allocated slot");

    if !send_init(&mut socket, slot, &state).await {
        state.slots.release(slot);
        return;
    }

    // Frames the first peer sends before pairing are held back and
    // delivered once the counterpart exists.
    let mut pending: Vec<String> = Vec::new();
    let idle = tokio::time::sleep(state.config.idle_timeout);
    tokio::pin!(idle);
    let mut join_rx = join_rx;

    let joined = loop {
        tokio::select! {
            res = &mut join_rx => match res {
                Ok(joined) => break joined,
                Err(_) => {
                    state.slots.release(slot);
                    return;
                }
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => pending.push(text),
                Some(Ok(Message::Binary(_))) => {
                    state.slots.release(slot);
                    close_with(&mut socket, CLOSE_PROTOCOL_ERROR, "binary frame").await;
                    return;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    debug!(slot, "peer left before pairing");
                    state.slots.release(slot);
                    return;
                }
                Some(Ok(_)) => {}
            },
            _ = &mut idle => {
                info!(slot, "slot timed out awaiting peer");
                state.slots.release(slot);
                close_with(
                    &mut socket,
                    CloseCode::SlotTimedOut.as_u16(),
                    "timed out waiting for peer",
                )
                .await;
                return;
            }
        }
    };

    info!(slot, "slot paired");
    for frame in pending {
        if joined.to_second.send(PeerEvent::Frame(frame)).is_err() {
            break;
        }
    }
    relay(socket, inbox, joined.to_second, state).await;
}

/// Second arrival: claim the waiting peer and start relaying.
async fn join_slot(mut socket: WebSocket, slot: &str, state: AppState) {
    let parsed: Option<u64> = slot.parse().ok();
    let waiting = parsed.and_then(|id| state.slots.claim(id));
    let Some(waiting) = waiting else {
        debug!(slot, "join on unknown slot");
        close_with(&mut socket, CloseCode::NoSuchSlot.as_u16(), "no such slot").await;
        return;
    };

    let (to_second, inbox) = mpsc::unbounded_channel();
    if waiting.join.send(Joined { to_second }).is_err() {
        // The first peer gave up between our claim and the handover.
        close_with(&mut socket, CloseCode::NoSuchSlot.as_u16(), "no such slot").await;
        return;
    }

    if !send_init(&mut socket, parsed.unwrap_or_default(), &state).await {
        let _ = waiting.to_first.send(PeerEvent::Close(None));
        return;
    }

    relay(socket, inbox, waiting.to_first, state).await;
}

/// Shuttle frames between the paired sockets until one side closes or the
/// handshake deadline passes.
async fn relay(
    mut socket: WebSocket,
    mut inbox: mpsc::UnboundedReceiver<PeerEvent>,
    to_peer: mpsc::UnboundedSender<PeerEvent>,
    state: AppState,
) {
    let deadline = tokio::time::sleep(state.config.handshake_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if to_peer.send(PeerEvent::Frame(text)).is_err() {
                        close_with(&mut socket, CloseCode::PeerHungUp.as_u16(), "peer gone").await;
                        return;
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    let _ = to_peer.send(PeerEvent::Close(None));
                    close_with(&mut socket, CLOSE_PROTOCOL_ERROR, "binary frame").await;
                    return;
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| f.code);
                    debug!(?code, "socket closed, notifying peer");
                    let _ = to_peer.send(PeerEvent::Close(code));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!("socket error: {err}");
                    let _ = to_peer.send(PeerEvent::Close(None));
                    return;
                }
                None => {
                    let _ = to_peer.send(PeerEvent::Close(None));
                    return;
                }
            },
            ev = inbox.recv() => match ev {
                Some(PeerEvent::Frame(text)) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        let _ = to_peer.send(PeerEvent::Close(None));
                        return;
                    }
                }
                Some(PeerEvent::Close(code)) => {
                    close_with(&mut socket, propagated(code), "peer closed").await;
                    return;
                }
                None => {
                    close_with(&mut socket, CloseCode::PeerHungUp.as_u16(), "peer gone").await;
                    return;
                }
            },
            _ = &mut deadline => {
                info!("handshake deadline exceeded, closing both sides");
                let _ = to_peer.send(PeerEvent::Close(Some(CloseCode::SlotTimedOut.as_u16())));
                close_with(
                    &mut socket,
                    CloseCode::SlotTimedOut.as_u16(),
                    "handshake deadline exceeded",
                )
                .await;
                return;
            }
        }
    }
}

/// Pick the close code the counterpart should see: protocol codes are
/// forwarded as-is, anything else collapses to `PeerHungUp`.
fn propagated(code: Option<u16>) -> u16 {
    match code {
        Some(code) if CloseCode::from_u16(code).is_some() => code,
        _ => CloseCode::PeerHungUp.as_u16(),
    }
}

async fn send_init(socket: &mut WebSocket, slot: u64, state: &AppState) -> bool {
    let init = InitMsg {
        slot: slot.to_string(),
        ice_servers: state.config.ice_servers(),
    };
    let json = match serde_json::to_string(&init) {
        Ok(json) => json,
        Err(err) => {
            warn!("cannot serialize init frame: {err}");
            return false;
        }
    };
    socket.send(Message::Text(json)).await.is_ok()
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_codes_are_propagated_verbatim() {
        for code in [4000u16, 4001, 4003, 4004, 4005, 4006, 4007, 4008] {
            assert_eq!(propagated(Some(code)), code);
        }
    }

    #[test]
    fn unclassified_closes_collapse_to_peer_hung_up() {
        assert_eq!(propagated(None), 4004);
        assert_eq!(propagated(Some(1000)), 4004);
        assert_eq!(propagated(Some(1006)), 4004);
        assert_eq!(propagated(Some(4042)), 4004);
    }
}
