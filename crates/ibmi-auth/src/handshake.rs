//! C7: Credential Handshake — decrypts an untrusted client's encrypted
//! credentials into the plaintext form the pool manager (C4) needs to
//! attempt a connection. Opening the pool and minting the session token
//! happen one layer up (`ibmi-server`), since this crate must not depend
//! on `ibmi-gateway`.

use crate::crypto::{decrypt_payload, unwrap_session_key};
use crate::error::AuthError;
use crate::keys::ServerKeyPair;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request body for `POST /auth`.
#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeRequest {
    #[serde(rename = "keyId")]
    pub key_id: String,
    #[serde(rename = "encryptedSessionKey")]
    pub encrypted_session_key: String,
    pub iv: String,
    #[serde(rename = "authTag")]
    pub auth_tag: String,
    pub ciphertext: String,
}

/// Response body for `GET /auth/public-key`.
#[derive(Debug, Clone, Serialize)]
pub struct PublicKeyResponse {
    #[serde(rename = "keyId")]
    pub key_id: String,
    #[serde(rename = "publicKeyPEM")]
    pub public_key_pem: String,
}

/// The decrypted credential payload, before it's handed to the pool
/// manager (C4) to attempt an open.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialPayload {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
}

/// Registry of server keypairs, keyed by `keyId`. A deployment typically
/// holds exactly one entry, configured from `IBMI_AUTH_KEY_ID` /
/// `_PRIVATE_KEY_PATH` / `_PUBLIC_KEY_PATH`.
#[derive(Clone, Default)]
pub struct KeyRegistry {
    keys: HashMap<String, ServerKeyPair>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keypair: ServerKeyPair) {
        self.keys.insert(keypair.key_id().to_string(), keypair);
    }

    pub fn get(&self, key_id: &str) -> Option<&ServerKeyPair> {
        self.keys.get(key_id)
    }

    /// The `GET /auth/public-key` response for a single-key deployment —
    /// the first (and ordinarily only) registered key.
    pub fn public_key_response(&self) -> Option<Result<PublicKeyResponse, AuthError>> {
        self.keys.values().next().map(|kp| {
            Ok(PublicKeyResponse {
                key_id: kp.key_id().to_string(),
                public_key_pem: kp.public_key_pem()?,
            })
        })
    }
}

/// Decrypt `request` against `registry`. Refuses plain HTTP unless
/// `allow_http` is set. Never logs or
/// includes decrypted credential material in any returned error.
pub fn decrypt_handshake(
    registry: &KeyRegistry,
    request: &HandshakeRequest,
    is_tls: bool,
    allow_http: bool,
) -> Result<CredentialPayload, AuthError> {
    if !is_tls && !allow_http {
        return Err(AuthError::HttpNotAllowed);
    }

    let keypair = registry
        .get(&request.key_id)
        .ok_or_else(|| AuthError::UnknownKeyId(request.key_id.clone()))?;

    let aes_key = unwrap_session_key(keypair.private_key(), &request.encrypted_session_key)?;
    let plaintext = decrypt_payload(&aes_key, &request.iv, &request.auth_tag, &request.ciphertext)?;

    serde_json::from_slice(&plaintext).map_err(|e| AuthError::MalformedPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes_gcm::aead::{Aead, KeyInit};
    use aes_gcm::{Aes256Gcm, Key, Nonce};
    use base64::{engine::general_purpose::STANDARD, Engine};
    use rand::RngCore;
    use rsa::{Oaep, RsaPublicKey};
    use sha2::Sha256;

    fn encrypted_request(keypair: &ServerKeyPair, key_id: &str, payload: &str) -> HandshakeRequest {
        let mut rng = rand::rng();
        let mut aes_key = [0u8; 32];
        rng.fill_bytes(&mut aes_key);

        let public_key = RsaPublicKey::from(keypair.private_key());
        let encrypted_session_key = public_key
            .encrypt(&mut rng, Oaep::new::<Sha256>(), &aes_key)
            .unwrap();

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&aes_key));
        let mut iv = [0u8; 12];
        rng.fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);
        let mut combined = cipher.encrypt(nonce, payload.as_bytes()).unwrap();
        let tag = combined.split_off(combined.len() - 16);

        HandshakeRequest {
            key_id: key_id.to_string(),
            encrypted_session_key: STANDARD.encode(encrypted_session_key),
            iv: STANDARD.encode(iv),
            auth_tag: STANDARD.encode(tag),
            ciphertext: STANDARD.encode(combined),
        }
    }

    #[test]
    fn decrypts_a_well_formed_handshake_over_tls() {
        let keypair = ServerKeyPair::generate("key-1").unwrap();
        let mut registry = KeyRegistry::new();
        registry.insert(keypair.clone());

        let request = encrypted_request(
            &keypair,
            "key-1",
            r#"{"host":"ibmi.example","port":8471,"user":"alice","password":"s3cr3t"}"#,
        );

        let creds = decrypt_handshake(&registry, &request, true, false).unwrap();
        assert_eq!(creds.user, "alice");
        assert_eq!(creds.password, "s3cr3t");
        assert_eq!(creds.port, Some(8471));
    }

    #[test]
    fn rejects_plain_http_unless_allowed() {
        let keypair = ServerKeyPair::generate("key-1").unwrap();
        let mut registry = KeyRegistry::new();
        registry.insert(keypair.clone());
        let request = encrypted_request(&keypair, "key-1", r#"{"user":"a","password":"b"}"#);

        let err = decrypt_handshake(&registry, &request, false, false).unwrap_err();
        assert!(matches!(err, AuthError::HttpNotAllowed));

        assert!(decrypt_handshake(&registry, &request, false, true).is_ok());
    }

    #[test]
    fn rejects_unknown_key_id() {
        let keypair = ServerKeyPair::generate("key-1").unwrap();
        let registry = KeyRegistry::new();
        let request = encrypted_request(&keypair, "missing", r#"{"user":"a","password":"b"}"#);

        let err = decrypt_handshake(&registry, &request, true, false).unwrap_err();
        assert!(matches!(err, AuthError::UnknownKeyId(_)));
    }
}
