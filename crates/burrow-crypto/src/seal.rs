//! Sealed-frame encryption under the PAKE-derived session key.
//!
//! A sealed frame is `nonce || ciphertext` with a fresh random 24-byte
//! nonce. Random nonces keep the two directions of the channel independent;
//! no counter state has to survive the handshake's task boundaries.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

/// Session key length in bytes.
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes, prepended to every sealed frame.
pub const NONCE_LEN: usize = 24;

/// Sealing errors.
#[derive(Debug, Error)]
pub enum SealError {
    /// The cipher refused the plaintext.
    #[error("encryption failed")]
    Encrypt,

    /// The frame was tampered with, truncated, or sealed under a
    /// different key. This is the protocol's only "wrong passphrase"
    /// signal.
    #[error("message authentication failed")]
    Authentication,
}

/// The 32-byte symmetric key shared by both peers after the PAKE.
///
/// Derived by HKDF-SHA256 over the PAKE master key with empty salt and
/// info, so both peers' derivations are byte-identical.
#[derive(Clone)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    /// Derive the session key from a PAKE master key.
    pub fn derive(master: &[u8]) -> Self {
        let hk = Hkdf::<Sha256>::new(None, master);
        let mut key = [0u8; KEY_LEN];
        hk.expand(&[], &mut key)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Seal a plaintext into `nonce || ciphertext`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.0));
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| SealError::Encrypt)?;
        let mut frame = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        frame.extend_from_slice(&nonce);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    /// Open a sealed frame, authenticating it in the process.
    pub fn open(&self, frame: &[u8]) -> Result<Vec<u8>, SealError> {
        if frame.len() < NONCE_LEN {
            return Err(SealError::Authentication);
        }
        let (nonce, ciphertext) = frame.split_at(NONCE_LEN);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.0));
        cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| SealError::Authentication)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SessionKey {
        SessionKey::from_bytes([byte; KEY_LEN])
    }

    #[test]
    fn seal_open_round_trips() {
        let k = key(7);
        for msg in [&b""[..], b"x", br#"{"type":"offer","sdp":"v=0"}"#] {
            let frame = k.seal(msg).unwrap();
            assert_eq!(k.open(&frame).unwrap(), msg);
        }
    }

    #[test]
    fn every_bit_flip_fails_authentication() {
        let k = key(7);
        let frame = k.seal(b"attack at dawn").unwrap();
        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut tampered = frame.clone();
                tampered[byte] ^= 1 << bit;
                assert!(
                    matches!(k.open(&tampered), Err(SealError::Authentication)),
                    "flip at byte {byte} bit {bit} was accepted"
                );
            }
        }
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let frame = key(1).seal(b"hello").unwrap();
        assert!(matches!(key(2).open(&frame), Err(SealError::Authentication)));
    }

    #[test]
    fn truncation_fails_authentication() {
        let k = key(7);
        let frame = k.seal(b"hello").unwrap();
        for len in 0..frame.len() {
            assert!(matches!(
                k.open(&frame[..len]),
                Err(SealError::Authentication)
            ));
        }
    }

    #[test]
    fn nonces_are_unique_across_frames() {
        let k = key(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let frame = k.seal(b"same plaintext").unwrap();
            assert!(seen.insert(frame[..NONCE_LEN].to_vec()), "nonce repeated");
        }
    }

    #[test]
    fn derivation_is_deterministic_and_keyed() {
        let a = SessionKey::derive(&[1u8; 64]);
        let b = SessionKey::derive(&[1u8; 64]);
        let c = SessionKey::derive(&[2u8; 64]);
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn derived_keys_encrypt_compatibly() {
        let master = [9u8; 64];
        let sender = SessionKey::derive(&master);
        let receiver = SessionKey::derive(&master);
        let frame = sender.seal(b"cross-check").unwrap();
        assert_eq!(receiver.open(&frame).unwrap(), b"cross-check");
    }
}
