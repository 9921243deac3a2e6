//! RSA-OAEP session-key unwrap and AES-256-GCM payload decryption for the
//! credential handshake (C7).

use crate::error::AuthError;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;

const AES_KEY_LEN: usize = 32;
const GCM_TAG_LEN: usize = 16;

/// RSA-OAEP(SHA-256) decrypt a base64 `encryptedSessionKey` into a raw
/// 256-bit AES key.
pub fn unwrap_session_key(
    private_key: &RsaPrivateKey,
    encrypted_session_key_b64: &str,
) -> Result<[u8; AES_KEY_LEN], AuthError> {
    let ciphertext = STANDARD
        .decode(encrypted_session_key_b64)
        .map_err(|e| AuthError::MalformedPayload(e.to_string()))?;
    let padding = Oaep::new::<Sha256>();
    let plaintext = private_key
        .decrypt(padding, &ciphertext)
        .map_err(|e| AuthError::SessionKeyDecryptFailed(e.to_string()))?;
    plaintext
        .try_into()
        .map_err(|_| AuthError::SessionKeyDecryptFailed("unwrapped key is not 256 bits".to_string()))
}

/// AES-256-GCM decrypt `ciphertext` using `iv` as the nonce and `auth_tag`
/// as the authentication tag, all base64-encoded. Returns the plaintext
/// bytes on success, or `PayloadDecryptFailed` on any tag mismatch.
pub fn decrypt_payload(
    aes_key: &[u8; AES_KEY_LEN],
    iv_b64: &str,
    auth_tag_b64: &str,
    ciphertext_b64: &str,
) -> Result<Vec<u8>, AuthError> {
    let iv = STANDARD
        .decode(iv_b64)
        .map_err(|e| AuthError::MalformedPayload(e.to_string()))?;
    let tag = STANDARD
        .decode(auth_tag_b64)
        .map_err(|e| AuthError::MalformedPayload(e.to_string()))?;
    let ciphertext = STANDARD
        .decode(ciphertext_b64)
        .map_err(|e| AuthError::MalformedPayload(e.to_string()))?;
    if tag.len() != GCM_TAG_LEN {
        return Err(AuthError::MalformedPayload(format!(
            "auth tag must be {GCM_TAG_LEN} bytes, got {}",
            tag.len()
        )));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(aes_key));
    let nonce = Nonce::from_slice(&iv);

    // aes-gcm expects the tag appended to the ciphertext; the wire format
    // sends them separately, so stitch them back together here.
    let mut combined = ciphertext;
    combined.extend_from_slice(&tag);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &combined,
                aad: &[],
            },
        )
        .map_err(|_| AuthError::PayloadDecryptFailed("authentication tag mismatch".to_string()))
}
