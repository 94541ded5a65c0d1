//! Client side of the burrow signalling protocol.
//!
//! Establishes an end-to-end authenticated peer-to-peer connection through
//! an untrusted rendezvous server. The server pairs two WebSocket
//! connections on a slot and shuttles opaque frames; authenticity comes
//! from a PAKE over a short passphrase shared out of band, so the server
//! can drop or reorder messages but cannot forge the key agreement or
//! read the session descriptions.
//!
//! The initiator allocates a slot with [`Session::new`], shares the slot
//! and passphrase as an invitation code, and the joiner comes in through
//! [`Session::join`]. Both sides then run [`Session::dial`] with a
//! [`PeerLink`] wrapping their peer-connection object.

#![forbid(unsafe_code)]

pub mod flow;
pub mod link;
pub mod session;

pub use flow::FlowControl;
pub use link::{LinkState, PathKind, PeerLink};
pub use session::{Session, HANDSHAKE_DEADLINE};
