//! Common error types for burrow.

use thiserror::Error;

use crate::protocol::CloseCode;

/// Result type alias using burrow's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for signalling operations.
///
/// Each variant corresponds to one user-visible failure mode. `BadKey` is
/// the "wrong passphrase" signal and must stay distinguishable from
/// `Transport` so callers can prompt for re-entry instead of suggesting
/// network troubleshooting.
#[derive(Debug, Error)]
pub enum Error {
    /// The signalling server speaks an incompatible protocol version.
    #[error("incompatible signalling protocol version")]
    BadVersion,

    /// The join target slot does not exist.
    #[error("no such slot")]
    NoSuchSlot,

    /// The signalling server cannot allocate any more slots.
    #[error("signalling server is full")]
    NoMoreSlots,

    /// A rendezvous or handshake deadline elapsed.
    #[error("timed out")]
    TimedOut,

    /// Authenticated decryption failed, or the peer reported it did.
    /// The peer on this slot used a different passphrase.
    #[error("bad key")]
    BadKey,

    /// The counterpart closed its connection mid-handshake.
    #[error("peer hung up")]
    PeerHungUp,

    /// Generic socket or peer-connection failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Unexpected message in the current state, malformed JSON, or
    /// malformed base64.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl Error {
    /// Create a transport error from any displayable type.
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }

    /// Create a protocol-violation error from any displayable type.
    pub fn violation(msg: impl std::fmt::Display) -> Self {
        Self::ProtocolViolation(msg.to_string())
    }

    /// Translate a WebSocket close code received from the server or the
    /// counterpart into the corresponding error, if it is one of the
    /// protocol's failure codes.
    pub fn from_close_code(code: u16) -> Option<Self> {
        match CloseCode::from_u16(code)? {
            CloseCode::NoSuchSlot => Some(Self::NoSuchSlot),
            CloseCode::SlotTimedOut => Some(Self::TimedOut),
            CloseCode::NoMoreSlots => Some(Self::NoMoreSlots),
            CloseCode::WrongProto => Some(Self::BadVersion),
            CloseCode::PeerHungUp => Some(Self::PeerHungUp),
            CloseCode::BadKey => Some(Self::BadKey),
            _ => None,
        }
    }

    /// The most informative close code to send for this error, if any.
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::BadVersion => Some(CloseCode::WrongProto),
            Self::NoSuchSlot => Some(CloseCode::NoSuchSlot),
            Self::NoMoreSlots => Some(CloseCode::NoMoreSlots),
            Self::TimedOut => Some(CloseCode::SlotTimedOut),
            Self::BadKey => Some(CloseCode::BadKey),
            Self::PeerHungUp => Some(CloseCode::PeerHungUp),
            Self::Transport(_) | Self::ProtocolViolation(_) => None,
        }
    }
}
