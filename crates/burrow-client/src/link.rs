//! The peer-connection boundary.
//!
//! The signalling handshake consumes the peer-to-peer transport as an
//! opaque object with a small capability set: it can mint and accept
//! session descriptions, absorb remote candidates, report its own
//! candidates as they are discovered, and announce the connection outcome.
//! The DTLS/SCTP machinery behind those capabilities lives entirely on the
//! other side of this trait.

use async_trait::async_trait;

use burrow_common::protocol::{CandidateInit, SessionDescription};

/// Terminal states of the underlying peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected(PathKind),
    Failed,
}

/// What kind of candidate pair the connection settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// host, srflx, or prflx on both ends.
    Direct,
    /// At least one side goes through a TURN relay.
    Relay,
    /// The transport cannot tell.
    Unknown,
}

/// Capability set the handshake needs from a peer connection.
///
/// Implementations must tolerate candidates arriving before or after the
/// remote description in either order, buffering as needed. `wait_state`
/// and `next_local_candidate` are polled inside a `select!` loop and must
/// be cancellation-safe.
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn create_offer(&self) -> anyhow::Result<SessionDescription>;

    async fn create_answer(&self) -> anyhow::Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> anyhow::Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> anyhow::Result<()>;

    async fn add_remote_candidate(&self, candidate: CandidateInit) -> anyhow::Result<()>;

    /// The next locally gathered candidate, or `None` once gathering is
    /// complete. The handshake turns that `None` into the explicit
    /// empty-candidate sentinel on the wire.
    async fn next_local_candidate(&self) -> Option<CandidateInit>;

    /// Resolves when the connection reaches a terminal state.
    async fn wait_state(&self) -> LinkState;
}
