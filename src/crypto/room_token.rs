use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng},
};
use aes_gcm::aead::rand_core::RngCore;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::error::{AppError, Result};

/// The two-byte wire format version.
pub const VERSION: [u8; 2] = *b"01";
/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// The size of the trailing envelope checksum in bytes.
pub const CHECKSUM_SIZE: usize = 4;
/// The size of the AES-GCM authentication tag in bytes.
const TAG_SIZE: usize = 16;
/// The smallest possible envelope: header + nonce + empty ciphertext + checksum.
const MIN_ENVELOPE_SIZE: usize = 2 + 4 + NONCE_SIZE + TAG_SIZE + CHECKSUM_SIZE;

/// Capability code for joining a room.
pub const CAP_LOGIN: u8 = 1;
/// Capability code for publishing media into a room.
pub const CAP_PUBLISH: u8 = 2;

/// The privilege record carried inside a room token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTokenPayload {
    /// The room the token grants access to.
    pub room_id: String,
    /// Privileges keyed by numeric capability code.
    pub privileges: BTreeMap<u8, bool>,
    /// Optional stream-id restriction list. `None` = unrestricted.
    pub streams: Option<Vec<String>>,
}

impl RoomTokenPayload {
    /// Builds an unrestricted payload for the given room and rights.
    pub fn new(room_id: impl Into<String>, can_login: bool, can_publish: bool) -> Self {
        let mut privileges = BTreeMap::new();
        privileges.insert(CAP_LOGIN, can_login);
        privileges.insert(CAP_PUBLISH, can_publish);

        Self {
            room_id: room_id.into(),
            privileges,
            streams: None,
        }
    }

    /// Whether the payload grants the join capability.
    pub fn can_login(&self) -> bool {
        self.privileges.get(&CAP_LOGIN).copied().unwrap_or(false)
    }

    /// Whether the payload grants the publish capability.
    pub fn can_publish(&self) -> bool {
        self.privileges.get(&CAP_PUBLISH).copied().unwrap_or(false)
    }
}

/// The full plaintext record that gets encrypted into the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct WireRecord {
    subject_id: String,
    room_id: String,
    privileges: BTreeMap<u8, bool>,
    streams: Option<Vec<String>>,
}

/// A token recovered by [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRoomToken {
    /// The room-scoped identity the token was issued to.
    pub subject_id: String,
    /// The recovered privilege payload.
    pub payload: RoomTokenPayload,
    /// The embedded UNIX expiry timestamp.
    pub expires_at: u32,
}

/// Why a token failed to decode.
///
/// In production the verifier is the external media SDK; this twin exists so
/// issuance can be exercised end to end in tests.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenDecodeError {
    #[error("token is not valid base64url")]
    Transport,
    #[error("token envelope is truncated")]
    Truncated,
    #[error("unsupported token version")]
    UnsupportedVersion,
    #[error("envelope checksum mismatch")]
    ChecksumMismatch,
    #[error("token has expired")]
    Expired,
    #[error("payload decryption failed")]
    Decryption,
    #[error("payload deserialization failed")]
    Payload,
}

/// Derives the AES-256 key for one app from the shared secret.
///
/// Binding the app id into the derivation means tokens from different apps
/// never share a key even if they share a secret.
fn derive_key(app_id: &str, secret: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut hasher = Sha256::new();
    hasher.update(app_id.as_bytes());
    hasher.update(secret);

    let digest = hasher.finalize();
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&digest);
    key
}

/// Computes the trailing checksum over everything preceding it in the envelope.
fn envelope_checksum(bytes: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let hash = blake3::hash(bytes);
    let mut checksum = [0u8; CHECKSUM_SIZE];
    checksum.copy_from_slice(&hash.as_bytes()[..CHECKSUM_SIZE]);
    checksum
}

/// Issues a signed room token.
///
/// Envelope layout, base64url-encoded for transport:
/// `version(2) || expiry(4, BE) || nonce(12) || ciphertext || checksum(4)`.
///
/// The token is generate-and-forget: its only access-control lifetime is the
/// embedded expiry, so `ttl_seconds` must stay short (minutes, not hours).
pub fn issue(
    app_id: &str,
    subject_id: &str,
    secret: &[u8],
    ttl_seconds: u32,
    payload: &RoomTokenPayload,
) -> Result<String> {
    let issued_at = chrono::Utc::now().timestamp();
    let issued_at = u32::try_from(issued_at)
        .map_err(|_| AppError::Encoding("system clock outside token range".to_string()))?;
    let expires_at = issued_at
        .checked_add(ttl_seconds)
        .ok_or_else(|| AppError::Encoding("ttl overflows expiry timestamp".to_string()))?;

    issue_at(app_id, subject_id, secret, expires_at, payload)
}

/// Issues a token with an explicit expiry timestamp.
///
/// Split out from [`issue`] so tests can pin the clock.
pub fn issue_at(
    app_id: &str,
    subject_id: &str,
    secret: &[u8],
    expires_at: u32,
    payload: &RoomTokenPayload,
) -> Result<String> {
    let record = WireRecord {
        subject_id: subject_id.to_string(),
        room_id: payload.room_id.clone(),
        privileges: payload.privileges.clone(),
        streams: payload.streams.clone(),
    };

    let plaintext = bincode::serde::encode_to_vec(&record, bincode::config::standard())
        .map_err(|e| AppError::Encoding(format!("payload serialization failed: {}", e)))?;

    let key = derive_key(app_id, secret);
    let cipher = Aes256Gcm::new((&*key).into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|e| AppError::Encoding(format!("payload encryption failed: {}", e)))?;

    let mut envelope = Vec::with_capacity(MIN_ENVELOPE_SIZE + ciphertext.len());
    envelope.extend_from_slice(&VERSION);
    envelope.extend_from_slice(&expires_at.to_be_bytes());
    envelope.extend_from_slice(&nonce_bytes);
    envelope.extend_from_slice(&ciphertext);

    let checksum = envelope_checksum(&envelope);
    envelope.extend_from_slice(&checksum);

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(envelope))
}

/// Decodes and verifies a room token against the clock value `now`.
pub fn decode(
    token: &str,
    app_id: &str,
    secret: &[u8],
    now: u32,
) -> std::result::Result<DecodedRoomToken, TokenDecodeError> {
    let envelope = general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| TokenDecodeError::Transport)?;

    if envelope.len() < MIN_ENVELOPE_SIZE {
        return Err(TokenDecodeError::Truncated);
    }

    let (body, checksum) = envelope.split_at(envelope.len() - CHECKSUM_SIZE);
    let expected = envelope_checksum(body);
    if expected[..].ct_eq(checksum).unwrap_u8() != 1 {
        return Err(TokenDecodeError::ChecksumMismatch);
    }

    let (version, rest) = body.split_at(2);
    if version != VERSION {
        return Err(TokenDecodeError::UnsupportedVersion);
    }

    let (expiry_bytes, rest) = rest.split_at(4);
    let mut expiry = [0u8; 4];
    expiry.copy_from_slice(expiry_bytes);
    let expires_at = u32::from_be_bytes(expiry);

    if now >= expires_at {
        return Err(TokenDecodeError::Expired);
    }

    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(nonce_bytes);

    let key = derive_key(app_id, secret);
    let cipher = Aes256Gcm::new((&*key).into());

    let plaintext = cipher
        .decrypt(&Nonce::from(nonce), ciphertext)
        .map_err(|_| TokenDecodeError::Decryption)?;

    let (record, _): (WireRecord, usize) =
        bincode::serde::decode_from_slice(&plaintext, bincode::config::standard())
            .map_err(|_| TokenDecodeError::Payload)?;

    Ok(DecodedRoomToken {
        subject_id: record.subject_id,
        payload: RoomTokenPayload {
            room_id: record.room_id,
            privileges: record.privileges,
            streams: record.streams,
        },
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_ID: &str = "mentorlive-test";
    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";
    const NOW: u32 = 1_700_000_000;

    fn payload() -> RoomTokenPayload {
        RoomTokenPayload::new("room_abc123", true, false)
    }

    #[test]
    fn round_trip_recovers_payload_and_expiry() {
        let token = issue_at(APP_ID, "student:42", SECRET, NOW + 600, &payload()).unwrap();
        let decoded = decode(&token, APP_ID, SECRET, NOW).unwrap();

        assert_eq!(decoded.subject_id, "student:42");
        assert_eq!(decoded.payload, payload());
        assert_eq!(decoded.expires_at, NOW + 600);
        assert!(decoded.payload.can_login());
        assert!(!decoded.payload.can_publish());
    }

    #[test]
    fn publish_capability_round_trips() {
        let p = RoomTokenPayload::new("room_abc123", true, true);
        let token = issue_at(APP_ID, "trainer:1", SECRET, NOW + 600, &p).unwrap();
        let decoded = decode(&token, APP_ID, SECRET, NOW).unwrap();
        assert!(decoded.payload.can_publish());
    }

    #[test]
    fn flipping_any_byte_fails_decode() {
        let token = issue_at(APP_ID, "student:42", SECRET, NOW + 600, &payload()).unwrap();
        let envelope = general_purpose::URL_SAFE_NO_PAD.decode(&token).unwrap();

        for i in 0..envelope.len() {
            let mut tampered = envelope.clone();
            tampered[i] ^= 0x01;
            let tampered = general_purpose::URL_SAFE_NO_PAD.encode(&tampered);
            assert!(
                decode(&tampered, APP_ID, SECRET, NOW).is_err(),
                "byte {} accepted after tampering",
                i
            );
        }
    }

    #[test]
    fn wrong_secret_fails_decode() {
        let token = issue_at(APP_ID, "student:42", SECRET, NOW + 600, &payload()).unwrap();
        let result = decode(&token, APP_ID, b"not-the-right-secret-not-right!!", NOW);
        assert_eq!(result, Err(TokenDecodeError::Decryption));
    }

    #[test]
    fn wrong_app_id_fails_decode() {
        let token = issue_at(APP_ID, "student:42", SECRET, NOW + 600, &payload()).unwrap();
        let result = decode(&token, "some-other-app", SECRET, NOW);
        assert_eq!(result, Err(TokenDecodeError::Decryption));
    }

    #[test]
    fn expired_token_fails_even_with_correct_secret() {
        let token = issue_at(APP_ID, "student:42", SECRET, NOW + 600, &payload()).unwrap();
        let result = decode(&token, APP_ID, SECRET, NOW + 600);
        assert_eq!(result, Err(TokenDecodeError::Expired));
    }

    #[test]
    fn truncated_token_is_rejected() {
        let result = decode("AAAA", APP_ID, SECRET, NOW);
        assert_eq!(result, Err(TokenDecodeError::Truncated));
    }

    #[test]
    fn garbage_transport_encoding_is_rejected() {
        let result = decode("not base64url!!!", APP_ID, SECRET, NOW);
        assert_eq!(result, Err(TokenDecodeError::Transport));
    }

    #[test]
    fn envelope_header_is_bit_exact() {
        let token = issue_at(APP_ID, "student:42", SECRET, NOW + 600, &payload()).unwrap();
        let envelope = general_purpose::URL_SAFE_NO_PAD.decode(&token).unwrap();

        assert_eq!(&envelope[..2], &b"01"[..]);
        assert_eq!(&envelope[2..6], &(NOW + 600).to_be_bytes()[..]);
        assert!(envelope.len() >= MIN_ENVELOPE_SIZE);
    }

    #[test]
    fn nonce_makes_tokens_unpredictable() {
        let a = issue_at(APP_ID, "student:42", SECRET, NOW + 600, &payload()).unwrap();
        let b = issue_at(APP_ID, "student:42", SECRET, NOW + 600, &payload()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn stream_restriction_list_round_trips() {
        let mut p = payload();
        p.streams = Some(vec!["screen".to_string(), "camera".to_string()]);
        let token = issue_at(APP_ID, "trainer:1", SECRET, NOW + 600, &p).unwrap();
        let decoded = decode(&token, APP_ID, SECRET, NOW).unwrap();
        assert_eq!(decoded.payload.streams, p.streams);
    }
}
