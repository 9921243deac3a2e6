//! # ibmi-auth
//!
//! Credential handshake (C7) and bearer-token session store (C8) for the
//! IBM i MCP tool gateway.
//!
//! An untrusted client encrypts IBM i credentials with the server's RSA
//! public key (a one-time AES session key wrapped with RSA-OAEP, the
//! credentials themselves under AES-256-GCM) and posts the result to
//! `POST /auth`. This crate decrypts that payload; the caller (`ibmi-server`)
//! is responsible for attempting the pool open (C4) and, on success, minting
//! a session via [`session::SessionStore`].
//!
//! Tokens are opaque random bytes with no embedded identity: a lookup
//! against the store is mandatory on every authenticated request.

pub mod crypto;
pub mod error;
pub mod handshake;
pub mod keys;
pub mod session;

pub use error::AuthError;
pub use handshake::{decrypt_handshake, CredentialPayload, HandshakeRequest, KeyRegistry, PublicKeyResponse};
pub use keys::ServerKeyPair;
pub use session::{PoolCloser, SessionStore, TokenRecord};
