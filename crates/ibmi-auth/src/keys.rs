//! RSA keypair management for the credential handshake (C7).

use crate::error::AuthError;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::path::Path;

const KEY_BITS: usize = 2048;

/// An RSA keypair identified by a `key_id`, used to decrypt handshake
/// session keys and to answer `GET /auth/public-key`.
pub struct ServerKeyPair {
    key_id: String,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl Clone for ServerKeyPair {
    fn clone(&self) -> Self {
        Self {
            key_id: self.key_id.clone(),
            private_key: self.private_key.clone(),
            public_key: self.public_key.clone(),
        }
    }
}

impl ServerKeyPair {
    /// Generate a new random keypair under `key_id`.
    pub fn generate(key_id: impl Into<String>) -> Result<Self, AuthError> {
        let mut rng = rand::rng();
        let private_key = RsaPrivateKey::new(&mut rng, KEY_BITS)
            .map_err(|e| AuthError::KeyGenerationFailed(e.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Self {
            key_id: key_id.into(),
            private_key,
            public_key,
        })
    }

    /// Load a keypair from a PEM-encoded PKCS#8 private key.
    pub fn from_private_key_pem(key_id: impl Into<String>, pem: &str) -> Result<Self, AuthError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| AuthError::KeyGenerationFailed(e.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Self {
            key_id: key_id.into(),
            private_key,
            public_key,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// PEM-encode the private key (PKCS#8).
    pub fn private_key_pem(&self) -> Result<String, AuthError> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|z| z.to_string())
            .map_err(|e| AuthError::KeyGenerationFailed(e.to_string()))
    }

    /// PEM-encode the public key (SubjectPublicKeyInfo), as returned from
    /// `GET /auth/public-key`.
    pub fn public_key_pem(&self) -> Result<String, AuthError> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::KeyGenerationFailed(e.to_string()))
    }

    /// Save the private key to a file. The `key_id` is not persisted — it
    /// is supplied again on load, from `IBMI_AUTH_KEY_ID`.
    pub fn save_to_file(&self, private_key_path: &Path) -> Result<(), AuthError> {
        std::fs::write(private_key_path, self.private_key_pem()?)?;
        Ok(())
    }

    /// Load a keypair from a PEM private key file under `key_id`.
    pub fn load_from_file(key_id: impl Into<String>, private_key_path: &Path) -> Result<Self, AuthError> {
        let pem = std::fs::read_to_string(private_key_path)?;
        Self::from_private_key_pem(key_id, &pem)
    }
}

/// Load just a public key from PEM (for clients holding only the public
/// half, or for verification-only call sites).
pub fn load_public_key_pem(pem: &str) -> Result<RsaPublicKey, AuthError> {
    RsaPublicKey::from_public_key_pem(pem).map_err(|e| AuthError::KeyGenerationFailed(e.to_string()))
}
