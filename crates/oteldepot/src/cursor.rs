//! Opaque fetch cursor codec.
//!
//! A cursor carries the resumption state of a paginated fetch walk: the hour
//! bucket being scanned, the last fully consumed object key, and the offset
//! into a partially consumed object. It travels to clients as AES-256-CFB
//! ciphertext of the JSON form, prefixed with a random 16-byte IV and
//! URL-safe base64 encoded. The cursor carries no secrets; encryption keeps
//! clients from forging or spelunking navigation state.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use serde::{Deserialize, Serialize};

type Aes256CfbEnc = cfb_mode::Encryptor<aes::Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<aes::Aes256>;

const IV_LEN: usize = 16;
pub(crate) const KEY_LEN: usize = 32;

/// Resumption state for a paginated fetch walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct FetchCursor {
    /// Hour bucket the walk is positioned in, nanoseconds since the epoch.
    /// Zero means the walk starts from the request's start time.
    #[serde(rename = "ct")]
    pub current_hour_unix_nano: u64,
    /// Last fully consumed object key; the next walk lists strictly after it.
    #[serde(rename = "ck")]
    pub current_object_key: Option<String>,
    /// Number of already-delivered resource groups in the object the walk
    /// stopped inside.
    #[serde(rename = "o")]
    pub offset: usize,
}

/// Failure to decode a cursor token. The variants are collapsed into a
/// single invalid-cursor error at the repository boundary.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CursorError {
    #[error("not base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("ciphertext too short")]
    TooShort,
    #[error("plaintext is not a cursor: {0}")]
    Json(#[from] serde_json::Error),
}

impl FetchCursor {
    /// Encrypt this cursor into an opaque token.
    pub fn encode(&self, key: &[u8; KEY_LEN]) -> Result<String, serde_json::Error> {
        let mut plaintext = serde_json::to_vec(self)?;
        let iv: [u8; IV_LEN] = rand::random();
        Aes256CfbEnc::new(key.into(), &iv.into()).encrypt(&mut plaintext);

        let mut envelope = Vec::with_capacity(IV_LEN + plaintext.len());
        envelope.extend_from_slice(&iv);
        envelope.extend_from_slice(&plaintext);
        Ok(URL_SAFE.encode(envelope))
    }

    /// Decrypt an opaque token back into a cursor.
    pub fn decode(token: &str, key: &[u8; KEY_LEN]) -> Result<Self, CursorError> {
        let envelope = URL_SAFE.decode(token)?;
        if envelope.len() < IV_LEN {
            return Err(CursorError::TooShort);
        }

        let (iv, ciphertext) = envelope.split_at(IV_LEN);
        let iv: [u8; IV_LEN] = iv.try_into().expect("split at IV_LEN");
        let mut plaintext = ciphertext.to_vec();
        Aes256CfbDec::new(key.into(), &iv.into()).decrypt(&mut plaintext);

        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Fit arbitrary key material to the AES-256 key size: truncate if longer,
/// zero-right-pad if shorter.
pub(crate) fn adjust_key(material: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    let len = material.len().min(KEY_LEN);
    key[..len].copy_from_slice(&material[..len]);
    key
}
