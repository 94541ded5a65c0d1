//! CPace password-authenticated key exchange.
//!
//! CPace over Ristretto255 with SHA-512, following the CFRG draft
//! (<https://www.ietf.org/archive/id/draft-irtf-cfrg-cpace-12.html>).
//! One round trip: the joiner calls [`start`] and sends `msg_a`, the
//! initiator answers with [`exchange`] and already holds the master key,
//! and the joiner completes with [`PakeState::finish`].
//!
//! The channel identity fields in [`ContextInfo`] are all empty in the
//! signalling protocol: the peers share nothing but an ephemeral
//! passphrase, and the rendezvous server grants each slot exactly one
//! pairing attempt.

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::traits::Identity;
use curve25519_dalek::Scalar;
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use thiserror::Error;

/// Domain-separation identifier for the group generator.
const DSI: &[u8] = b"CPaceRistretto255";

/// Domain-separation identifier for the intermediate session key.
const DSI_ISK: &[u8] = b"CPaceRistretto255_ISK";

/// SHA-512 block size, used for zero-padding the generator string so the
/// passphrase lands in the first hash block.
const S_IN_BYTES: usize = 128;

/// Length of each PAKE message: one compressed Ristretto255 point.
pub const MESSAGE_LEN: usize = 32;

/// The shared secret both sides derive on success.
pub type MasterKey = [u8; 64];

/// PAKE errors.
#[derive(Debug, Error)]
pub enum PakeError {
    /// The peer's message is not a valid non-identity group element.
    #[error("malformed peer message")]
    BadMessage,
}

/// Channel binding info: initiator id, responder id, and associated data.
///
/// All fields are empty in the signalling protocol; see the module docs.
#[derive(Debug, Clone, Default)]
pub struct ContextInfo {
    pub initiator_id: Vec<u8>,
    pub responder_id: Vec<u8>,
    pub ad: Vec<u8>,
}

impl ContextInfo {
    pub fn new(initiator_id: &[u8], responder_id: &[u8], ad: &[u8]) -> Self {
        Self {
            initiator_id: initiator_id.to_vec(),
            responder_id: responder_id.to_vec(),
            ad: ad.to_vec(),
        }
    }
}

/// Continuation held by the side that sent the first message.
pub struct PakeState {
    scalar: Scalar,
    msg_a: [u8; MESSAGE_LEN],
    ad: Vec<u8>,
}

/// Begin the exchange. Returns the first message and the continuation
/// that [`PakeState::finish`] consumes once the reply arrives.
pub fn start(pass: &str, ctx: &ContextInfo) -> ([u8; MESSAGE_LEN], PakeState) {
    let g = generator(pass, ctx);
    let scalar = Scalar::random(&mut OsRng);
    let msg_a = (g * scalar).compress().to_bytes();
    (
        msg_a,
        PakeState {
            scalar,
            msg_a,
            ad: ctx.ad.clone(),
        },
    )
}

/// Answer a received first message. Returns the reply and the master key
/// in a single call.
pub fn exchange(
    pass: &str,
    ctx: &ContextInfo,
    msg_a: &[u8],
) -> Result<([u8; MESSAGE_LEN], MasterKey), PakeError> {
    let peer = parse_point(msg_a)?;
    let g = generator(pass, ctx);
    let scalar = Scalar::random(&mut OsRng);
    let msg_b = (g * scalar).compress().to_bytes();
    let k = shared_point(peer, &scalar)?;
    let key = intermediate_key(&k, msg_a, &msg_b, &ctx.ad);
    Ok((msg_b, key))
}

impl PakeState {
    /// Complete the exchange with the peer's reply.
    pub fn finish(self, msg_b: &[u8]) -> Result<MasterKey, PakeError> {
        let peer = parse_point(msg_b)?;
        let k = shared_point(peer, &self.scalar)?;
        Ok(intermediate_key(&k, &self.msg_a, msg_b, &self.ad))
    }
}

fn parse_point(bytes: &[u8]) -> Result<RistrettoPoint, PakeError> {
    let compressed =
        CompressedRistretto::from_slice(bytes).map_err(|_| PakeError::BadMessage)?;
    let point = compressed.decompress().ok_or(PakeError::BadMessage)?;
    if point == RistrettoPoint::identity() {
        return Err(PakeError::BadMessage);
    }
    Ok(point)
}

fn shared_point(peer: RistrettoPoint, scalar: &Scalar) -> Result<[u8; 32], PakeError> {
    let k = peer * scalar;
    if k == RistrettoPoint::identity() {
        return Err(PakeError::BadMessage);
    }
    Ok(k.compress().to_bytes())
}

/// Prepend the LEB128 length of `data`.
fn prepend_len(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 2);
    let mut len = data.len();
    loop {
        if len < 0x80 {
            out.push(len as u8);
        } else {
            out.push((len & 0x7f) as u8 | 0x80);
        }
        len >>= 7;
        if len == 0 {
            break;
        }
    }
    out.extend_from_slice(data);
    out
}

fn lv_cat(fields: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for field in fields {
        out.extend_from_slice(&prepend_len(field));
    }
    out
}

/// Hash the passphrase and channel info into the session generator.
fn generator(pass: &str, ctx: &ContextInfo) -> RistrettoPoint {
    let ci = lv_cat(&[&ctx.initiator_id, &ctx.responder_id]);
    let zpad_len = S_IN_BYTES
        .saturating_sub(1 + prepend_len(pass.as_bytes()).len() + prepend_len(DSI).len());
    let gen_str = lv_cat(&[DSI, pass.as_bytes(), &vec![0u8; zpad_len], &ci, &[]]);
    let digest: [u8; 64] = Sha512::digest(&gen_str).into();
    RistrettoPoint::from_uniform_bytes(&digest)
}

/// Derive the intermediate session key from the shared point and the
/// message transcript.
fn intermediate_key(k: &[u8; 32], msg_a: &[u8], msg_b: &[u8], ad: &[u8]) -> MasterKey {
    let mut hasher = Sha512::new();
    hasher.update(lv_cat(&[DSI_ISK, &[], k]));
    hasher.update(lv_cat(&[msg_a, ad]));
    hasher.update(lv_cat(&[msg_b, ad]));
    hasher.finalize().into()
}
