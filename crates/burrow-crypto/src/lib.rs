//! Cryptographic primitives for burrow.
//!
//! This crate provides:
//! - A CPace password-authenticated key exchange with the asymmetric
//!   start/exchange/finish shape the signalling protocol needs
//! - HKDF-SHA256 expansion of the PAKE master key into a 32-byte session key
//! - Authenticated frame encryption with a random 24-byte nonce prepended
//!   to the ciphertext
//!
//! # Design
//!
//! The passphrase never crosses the wire: each side sends one Ristretto255
//! group element and derives the same master secret iff both used the same
//! passphrase. An authentication failure when opening a sealed frame is the
//! only evidence either side gets that the passphrases differed.

#![forbid(unsafe_code)]

pub mod pake;
pub mod seal;

pub use pake::{exchange, start, ContextInfo, MasterKey, PakeError, PakeState};
pub use seal::{SealError, SessionKey, KEY_LEN, NONCE_LEN};
