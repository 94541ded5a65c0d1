//! The signalling handshake, driven from either side.
//!
//! Rough sketch of a session:
//!
//! ```text
//! Peer               Rendezvous Server                Peer
//! ----open------------------> |
//! <---init{slot,ice}--------- |
//!                             | <------------------open----
//!                             | ---------init{slot,ice}--->
//! <---------------------------|--------------pake_msg_a----
//! ----pake_msg_b--------------|--------------------------->
//! ----sealed(offer)-----------|--------------------------->
//! <---------------------------|----------sealed(answer)----
//! ----sealed(candidates...)---|--------------------------->
//! <---------------------------|---sealed(candidates...)----
//! ```
//!
//! Both producers of outbound frames (the handshake driver and the local
//! candidate pump) funnel through one writer task that owns the socket
//! sink, so sends are serialized without a lock. Sealed frames can only be
//! produced once the session key exists; the key is born at the end of the
//! PAKE phase and everything downstream borrows it from there.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

use burrow_common::protocol::{
    decode_frame, encode_frame, CandidateInit, CloseCode, IceServer, InitMsg, SdpType,
    SessionDescription, SignalPayload, PROTOCOL,
};
use burrow_common::{Error, Result};
use burrow_crypto::{pake, ContextInfo, SessionKey};

use crate::link::{LinkState, PathKind, PeerLink};

/// Overall signalling deadline on each peer.
pub const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Which side of the handshake this session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Allocated the slot; waits for the joiner's PAKE message and sends
    /// the offer.
    Initiator,
    /// Joined an existing slot; speaks first in the PAKE and answers the
    /// offer.
    Joiner,
}

/// A rendezvous socket that has received its init frame and is ready to
/// run the authenticated handshake.
pub struct Session {
    ws: WsStream,
    role: Role,
    slot: String,
    ice_servers: Vec<IceServer>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("slot", &self.slot)
            .field("ice_servers", &self.ice_servers)
            .finish()
    }
}

impl Session {
    /// Connect to the signalling server and allocate a fresh slot.
    ///
    /// The assigned slot is available from [`Session::slot`] for building
    /// the invitation code.
    pub async fn new(sigserv: &str) -> Result<Self> {
        Self::connect(sigserv, None, Role::Initiator).await
    }

    /// Connect to the signalling server and join an existing slot.
    pub async fn join(sigserv: &str, slot: &str) -> Result<Self> {
        Self::connect(sigserv, Some(slot), Role::Joiner).await
    }

    /// The slot this session rendezvouses on.
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// ICE servers from the init frame, for configuring the peer link.
    pub fn ice_servers(&self) -> &[IceServer] {
        &self.ice_servers
    }

    async fn connect(sigserv: &str, slot: Option<&str>, role: Role) -> Result<Self> {
        let url = rendezvous_url(sigserv, slot)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(Error::transport)?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            PROTOCOL.parse().expect("static header value"),
        );

        let (mut ws, response) = connect_async(request).await.map_err(ws_error)?;

        let agreed = response
            .headers()
            .get("sec-websocket-protocol")
            .and_then(|v| v.to_str().ok());
        if agreed != Some(PROTOCOL) {
            let _ = ws.close(None).await;
            return Err(Error::BadVersion);
        }

        let text = next_text(&mut ws).await?;
        let init: InitMsg = serde_json::from_str(&text).map_err(Error::violation)?;
        info!(slot = %init.slot, "connected to signalling server");

        Ok(Self {
            ws,
            role,
            slot: init.slot,
            ice_servers: init.ice_servers,
        })
    }

    /// Run the handshake to completion: PAKE, sealed description exchange,
    /// candidate trickle, and teardown of the rendezvous socket once the
    /// peer link reports a terminal state.
    ///
    /// Surfaces exactly one error on failure; the socket is closed with
    /// the most informative code available either way.
    pub async fn dial(self, pass: &str, link: Arc<dyn PeerLink>) -> Result<PathKind> {
        let Session { ws, role, slot, .. } = self;
        let (sink, mut stream) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_frames(sink, rx));

        let result = match timeout(HANDSHAKE_DEADLINE, drive(role, pass, link, &mut stream, &tx))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                let _ = tx.send(Outbound::Close {
                    code: 1000,
                    reason: "timed out",
                });
                Err(Error::TimedOut)
            }
        };

        match &result {
            Ok(kind) => info!(slot = %slot, ?kind, "peer connection established"),
            Err(err) => {
                debug!(slot = %slot, %err, "handshake failed");
                let code = match err {
                    Error::ProtocolViolation(_) => 1002,
                    other => other.close_code().map(CloseCode::as_u16).unwrap_or(1000),
                };
                // A no-op if the driver already closed the socket.
                let _ = tx.send(Outbound::Close {
                    code,
                    reason: "handshake failed",
                });
            }
        }

        drop(tx);
        let _ = writer.await;
        result
    }
}

enum Outbound {
    Frame(String),
    Close { code: u16, reason: &'static str },
}

/// The single writer task. Owns the sink; exits after the first close
/// command or once every sender is gone.
async fn write_frames(mut sink: WsSink, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Outbound::Frame(text) => {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Outbound::Close { code, reason } => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: WsCloseCode::from(code),
                        reason: reason.into(),
                    })))
                    .await;
                break;
            }
        }
    }
}

async fn drive(
    role: Role,
    pass: &str,
    link: Arc<dyn PeerLink>,
    stream: &mut WsSource,
    tx: &mpsc::UnboundedSender<Outbound>,
) -> Result<PathKind> {
    // PAKE phase: exactly one frame in each direction, unauthenticated by
    // construction. Anything malformed here is a protocol error, not a
    // wrong passphrase.
    let ctx = ContextInfo::default();
    let key = match role {
        Role::Joiner => {
            let (msg_a, state) = pake::start(pass, &ctx);
            send_frame(tx, encode_frame(&msg_a))?;
            debug!("sent first PAKE message");
            let reply = next_text(stream).await?;
            let msg_b =
                decode_frame(&reply).map_err(|_| Error::violation("malformed PAKE frame"))?;
            let master = state
                .finish(&msg_b)
                .map_err(|_| Error::violation("malformed PAKE frame"))?;
            SessionKey::derive(&master)
        }
        Role::Initiator => {
            let first = next_text(stream).await?;
            let msg_a =
                decode_frame(&first).map_err(|_| Error::violation("malformed PAKE frame"))?;
            let (msg_b, master) = pake::exchange(pass, &ctx, &msg_a)
                .map_err(|_| Error::violation("malformed PAKE frame"))?;
            send_frame(tx, encode_frame(&msg_b))?;
            debug!("sent PAKE reply");
            SessionKey::derive(&master)
        }
    };
    debug!("session key established");

    // Sealed description exchange. The first failed open is the wrong-
    // passphrase signal: send the sealed farewell and surface BadKey.
    match role {
        Role::Initiator => {
            let offer = link.create_offer().await.map_err(Error::transport)?;
            link.set_local_description(offer.clone())
                .await
                .map_err(Error::transport)?;
            send_sealed(tx, &key, &SignalPayload::Description(offer))?;
            debug!("sent offer");

            let answer = match recv_payload(stream, &key, tx).await? {
                SignalPayload::Description(desc) if desc.kind == SdpType::Answer => desc,
                other => {
                    return Err(Error::violation(format!(
                        "expected answer, got {other:?}"
                    )))
                }
            };
            debug!("got answer");
            link.set_remote_description(answer)
                .await
                .map_err(Error::transport)?;
        }
        Role::Joiner => {
            let offer = match recv_payload(stream, &key, tx).await? {
                SignalPayload::Description(desc) if desc.kind == SdpType::Offer => desc,
                other => {
                    return Err(Error::violation(format!("expected offer, got {other:?}")))
                }
            };
            debug!("got offer");
            link.set_remote_description(offer)
                .await
                .map_err(Error::transport)?;
            let answer = link.create_answer().await.map_err(Error::transport)?;
            link.set_local_description(answer.clone())
                .await
                .map_err(Error::transport)?;
            send_sealed(tx, &key, &SignalPayload::Description(answer))?;
            debug!("sent answer");
        }
    }

    // Candidate trickle, both directions in any order, until the link
    // reaches a terminal state. The local stream ends with the explicit
    // empty-candidate sentinel; a received sentinel ends remote reception
    // without error.
    let mut local_done = false;
    let mut remote_done = false;
    loop {
        tokio::select! {
            state = link.wait_state() => match state {
                LinkState::Connected(kind) => {
                    let code = match kind {
                        PathKind::Direct => CloseCode::ConnectedDirect,
                        PathKind::Relay => CloseCode::ConnectedRelay,
                        PathKind::Unknown => CloseCode::Connected,
                    };
                    let _ = tx.send(Outbound::Close { code: code.as_u16(), reason: "done" });
                    return Ok(kind);
                }
                LinkState::Failed => {
                    let _ = tx.send(Outbound::Close {
                        code: CloseCode::ConnectionFailed.as_u16(),
                        reason: "peer connection failed",
                    });
                    return Err(Error::transport("peer connection failed"));
                }
            },
            candidate = link.next_local_candidate(), if !local_done => match candidate {
                Some(candidate) => {
                    debug!("sending local candidate");
                    send_sealed(tx, &key, &SignalPayload::Candidate(candidate))?;
                }
                None => {
                    debug!("local gathering complete");
                    send_sealed(tx, &key, &SignalPayload::Candidate(CandidateInit::end()))?;
                    local_done = true;
                }
            },
            frame = next_text(stream), if !remote_done => match frame {
                Ok(text) => match open_payload(&key, &text) {
                    Ok(SignalPayload::Candidate(candidate)) => {
                        if candidate.is_end() {
                            debug!("no more remote candidates");
                            remote_done = true;
                        } else if let Err(err) = link.add_remote_candidate(candidate).await {
                            debug!("cannot add remote candidate: {err}");
                        }
                    }
                    Ok(SignalPayload::Description(_)) => {
                        return Err(Error::violation(
                            "unexpected description during candidate trickle",
                        ));
                    }
                    Err(Error::BadKey) => {
                        farewell(tx, &key);
                        return Err(Error::BadKey);
                    }
                    Err(err) => return Err(err),
                },
                // The counterpart reporting a wrong key is an error even
                // this late; everything else just ends remote reception
                // and leaves the outcome to the link or the deadline.
                Err(Error::BadKey) => return Err(Error::BadKey),
                Err(err) => {
                    debug!("remote candidate stream ended: {err}");
                    remote_done = true;
                }
            },
        }
    }
}

/// Read the next sealed frame and open it, sending the farewell if the
/// key turns out to be wrong.
async fn recv_payload(
    stream: &mut WsSource,
    key: &SessionKey,
    tx: &mpsc::UnboundedSender<Outbound>,
) -> Result<SignalPayload> {
    let text = next_text(stream).await?;
    match open_payload(key, &text) {
        Ok(payload) => Ok(payload),
        Err(Error::BadKey) => {
            farewell(tx, key);
            Err(Error::BadKey)
        }
        Err(err) => Err(err),
    }
}

/// Decode and authenticate one sealed frame.
fn open_payload(key: &SessionKey, text: &str) -> Result<SignalPayload> {
    let sealed = decode_frame(text).map_err(|_| Error::violation("malformed sealed frame"))?;
    let plaintext = key.open(&sealed).map_err(|_| Error::BadKey)?;
    serde_json::from_slice(&plaintext).map_err(Error::violation)
}

fn send_frame(tx: &mpsc::UnboundedSender<Outbound>, text: String) -> Result<()> {
    tx.send(Outbound::Frame(text))
        .map_err(|_| Error::transport("signalling socket closed"))
}

fn send_sealed(
    tx: &mpsc::UnboundedSender<Outbound>,
    key: &SessionKey,
    payload: &SignalPayload,
) -> Result<()> {
    let plaintext = serde_json::to_vec(payload).map_err(Error::violation)?;
    let sealed = key
        .seal(&plaintext)
        .map_err(|_| Error::transport("cannot seal frame"))?;
    send_frame(tx, encode_frame(&sealed))
}

/// Tell the counterpart to stop guessing: a sealed goodbye it cannot open,
/// then the close code that names the problem.
fn farewell(tx: &mpsc::UnboundedSender<Outbound>, key: &SessionKey) {
    if let Ok(bye) = key.seal(b"bye") {
        let _ = tx.send(Outbound::Frame(encode_frame(&bye)));
    }
    let _ = tx.send(Outbound::Close {
        code: CloseCode::BadKey.as_u16(),
        reason: "bad key",
    });
}

/// Wait for the next text frame, translating close frames and transport
/// failures into taxonomy errors.
async fn next_text<S>(stream: &mut S) -> Result<String>
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => return Ok(text),
            Ok(Message::Binary(_)) => {
                return Err(Error::violation("binary frame on signalling socket"))
            }
            Ok(Message::Close(frame)) => return Err(close_error(frame)),
            Ok(_) => continue,
            Err(err) => return Err(ws_error(err)),
        }
    }
    Err(Error::transport("signalling socket closed"))
}

fn close_error(frame: Option<CloseFrame<'_>>) -> Error {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            Error::from_close_code(code)
                .unwrap_or_else(|| Error::transport(format!("signalling socket closed ({code})")))
        }
        None => Error::transport("signalling socket closed"),
    }
}

fn ws_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            Error::transport("signalling socket closed")
        }
        other => Error::transport(other),
    }
}

/// Build the WebSocket URL for a signalling server and optional slot.
/// `http`/`ws` stay plaintext, anything else upgrades to `wss`.
fn rendezvous_url(sigserv: &str, slot: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(sigserv).map_err(Error::transport)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        _ => "wss",
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::transport("invalid signalling server URL"))?;
    if let Some(slot) = slot {
        let path = url.path().to_owned();
        if path.ends_with('/') {
            url.set_path(&format!("{path}{slot}"));
        } else {
            url.set_path(&format!("{path}/{slot}"));
        }
    }
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_keeps_plaintext_schemes_plaintext() {
        assert_eq!(
            rendezvous_url("http://s.example.org/", None).unwrap().as_str(),
            "ws://s.example.org/"
        );
        assert_eq!(
            rendezvous_url("ws://s.example.org/", None).unwrap().as_str(),
            "ws://s.example.org/"
        );
    }

    #[test]
    fn url_upgrades_secure_schemes_to_wss() {
        assert_eq!(
            rendezvous_url("https://s.example.org/", Some("17"))
                .unwrap()
                .as_str(),
            "wss://s.example.org/17"
        );
        assert_eq!(
            rendezvous_url("wss://s.example.org", Some("17"))
                .unwrap()
                .as_str(),
            "wss://s.example.org/17"
        );
    }

    #[test]
    fn url_drops_fragments() {
        assert_eq!(
            rendezvous_url("ws://s.example.org/#frag", None).unwrap().as_str(),
            "ws://s.example.org/"
        );
    }

    #[test]
    fn close_frames_map_to_the_taxonomy() {
        let frame = |code: u16| CloseFrame {
            code: WsCloseCode::from(code),
            reason: "".into(),
        };
        assert!(matches!(close_error(Some(frame(4005))), Error::BadKey));
        assert!(matches!(close_error(Some(frame(4003))), Error::BadVersion));
        assert!(matches!(close_error(Some(frame(4001))), Error::TimedOut));
        assert!(matches!(close_error(Some(frame(1000))), Error::Transport(_)));
        assert!(matches!(close_error(None), Error::Transport(_)));
    }
}
