//! Wire protocol for the rendezvous socket.
//!
//! Every frame on the signalling WebSocket is text. The first frame is the
//! server's init message (JSON). The next two are raw PAKE messages in
//! base64url, one in each direction. Everything after that is base64url of
//! `nonce || ciphertext` whose plaintext is one of the JSON payloads below.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Identifier for the current signalling scheme. Clients and servers with
/// different tags refuse to talk so that users get an upgrade hint instead
/// of a confusing mid-handshake failure.
pub const PROTOCOL: &str = "4";

/// WebSocket close codes used by the signalling protocol (4000-4099 range).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// The join target slot is not valid.
    NoSuchSlot,
    /// The slot deadline was exceeded.
    SlotTimedOut,
    /// The server cannot allocate any new slots at the moment.
    NoMoreSlots,
    /// The server runs a different version of the signalling protocol.
    WrongProto,
    /// The counterpart closed its connection, unclassified.
    PeerHungUp,
    /// The counterpart's derived key failed to authenticate a frame.
    BadKey,
    /// The peer connection succeeded; path type unknown.
    Connected,
    /// The peer connection succeeded over a host/srflx/prflx pair.
    ConnectedDirect,
    /// The peer connection succeeded over a TURN relay.
    ConnectedRelay,
    /// The peer connection failed after signalling completed.
    ConnectionFailed,
}

impl CloseCode {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::NoSuchSlot => 4000,
            Self::SlotTimedOut => 4001,
            Self::NoMoreSlots => 4002,
            Self::WrongProto => 4003,
            Self::PeerHungUp => 4004,
            Self::BadKey => 4005,
            Self::Connected => 4006,
            Self::ConnectedDirect => 4007,
            Self::ConnectedRelay => 4008,
            Self::ConnectionFailed => 4009,
        }
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            4000 => Some(Self::NoSuchSlot),
            4001 => Some(Self::SlotTimedOut),
            4002 => Some(Self::NoMoreSlots),
            4003 => Some(Self::WrongProto),
            4004 => Some(Self::PeerHungUp),
            4005 => Some(Self::BadKey),
            4006 => Some(Self::Connected),
            4007 => Some(Self::ConnectedDirect),
            4008 => Some(Self::ConnectedRelay),
            4009 => Some(Self::ConnectionFailed),
            _ => None,
        }
    }
}

/// First frame the server sends over a freshly accepted socket: the slot
/// this connection is rendezvousing on and the ICE servers to dial with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitMsg {
    pub slot: String,
    #[serde(rename = "iceServers", default)]
    pub ice_servers: Vec<IceServer>,
}

/// A STUN or TURN endpoint, with credentials for time-limited TURN auth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// A credential-less entry, as used for STUN.
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// A peer-to-peer session description carried inside a sealed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// An ICE candidate carried inside a sealed frame.
///
/// Unknown fields survive a decode/encode round trip via `extra`, so a
/// candidate forwarded through the handshake reaches the peer connection
/// structurally intact. An empty `candidate` string is the sentinel that
/// terminates the sender's candidate trickle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateInit {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CandidateInit {
    /// The end-of-candidates sentinel.
    pub fn end() -> Self {
        Self::default()
    }

    /// Whether this candidate terminates the trickle.
    pub fn is_end(&self) -> bool {
        self.candidate.is_empty()
    }
}

/// Plaintext of a sealed frame: either a session description or a
/// candidate (including the end-of-candidates sentinel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalPayload {
    Description(SessionDescription),
    Candidate(CandidateInit),
}

/// Encode raw bytes for transmission as a text frame.
pub fn encode_frame(bytes: &[u8]) -> String {
    URL_SAFE.encode(bytes)
}

/// Decode a received text frame back into bytes.
pub fn decode_frame(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE.decode(text)
}
