//! Error types for the credential handshake (C7) and session store (C8).

use thiserror::Error;

/// Errors that can occur during the credential handshake or session
/// lookup. Maps onto the `AuthenticationError` / `ResourceExhausted` kinds
/// surfaced by the dispatcher.
///
/// None of these variants ever carry decrypted credential material —
/// callers log `AuthError` directly.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown key id: {0}")]
    UnknownKeyId(String),

    #[error("handshake refused over plain HTTP; set allowHttp to permit this")]
    HttpNotAllowed,

    #[error("failed to decrypt session key: {0}")]
    SessionKeyDecryptFailed(String),

    #[error("failed to decrypt credential payload: {0}")]
    PayloadDecryptFailed(String),

    #[error("malformed handshake payload: {0}")]
    MalformedPayload(String),

    #[error("credential authentication failed")]
    CredentialRejected,

    #[error("unknown or expired token")]
    UnknownToken,

    #[error("session store is at capacity ({0} concurrent sessions)")]
    ResourceExhausted(usize),

    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
