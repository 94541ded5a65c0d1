//! Time-limited TURN credentials.
//!
//! Follows the TURN REST API convention: the username is
//! `<unix-expiry>:<random-tag>` and the credential is the base64 of
//! HMAC-SHA1 over the username with a secret shared between this server
//! and the TURN server. Peers get a fresh pair in every init frame.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use burrow_common::protocol::IceServer;

type HmacSha1 = Hmac<Sha1>;

/// Mints TURN entries for init frames.
#[derive(Clone)]
pub struct TurnMinter {
    uri: String,
    secret: String,
    ttl: Duration,
}

impl TurnMinter {
    pub fn new(uri: impl Into<String>, secret: impl Into<String>, ttl: Duration) -> Self {
        Self {
            uri: uri.into(),
            secret: secret.into(),
            ttl,
        }
    }

    /// A fresh ICE server entry with credentials valid for the TTL.
    pub fn mint(&self) -> IceServer {
        let expiry = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            + self.ttl.as_secs();
        let mut tag = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut tag);
        let username = format!("{}:{:016x}", expiry, u64::from_be_bytes(tag));
        let credential = credential_for(&self.secret, &username);
        IceServer {
            urls: vec![self.uri.clone()],
            username: Some(username),
            credential: Some(credential),
        }
    }
}

fn credential_for(secret: &str, username: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(username.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}
