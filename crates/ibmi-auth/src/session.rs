//! C8: Token Session Store — in-memory `token -> TokenRecord` map with a
//! background expiry sweep.

use crate::error::AuthError;
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// One issued bearer token and the pool it is bound to.
///
/// Wire shape: `{opaqueToken, identity, issuedAt, expiresAt, poolKey}`.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub opaque_token: String,
    pub identity: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub pool_key: String,
}

impl TokenRecord {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Generate a cryptographically random 256-bit opaque token, hex-encoded.
/// Carries no embedded identity — lookup against the store is mandatory.
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

struct Inner {
    records: Mutex<HashMap<String, TokenRecord>>,
    max_concurrent_sessions: usize,
}

/// A callback invoked by the sweeper for each expired record's `pool_key`,
/// requesting C4 tear down the associated pool. Kept generic so this crate
/// never depends on `ibmi-gateway`.
pub trait PoolCloser: Send + Sync + 'static {
    fn close(&self, pool_key: &str);
}

pub struct SessionStore {
    inner: Arc<Inner>,
    sweeper: Option<JoinHandle<()>>,
}

impl SessionStore {
    pub fn new(max_concurrent_sessions: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                records: Mutex::new(HashMap::new()),
                max_concurrent_sessions,
            }),
            sweeper: None,
        }
    }

    /// Mint a new token for `identity`/`pool_key`, expiring `ttl` from now.
    /// Rejects with `ResourceExhausted` if the store is at capacity.
    pub async fn put(&self, identity: &str, pool_key: &str, ttl: Duration) -> Result<TokenRecord, AuthError> {
        let mut records = self.inner.records.lock().await;
        if records.len() >= self.inner.max_concurrent_sessions {
            return Err(AuthError::ResourceExhausted(self.inner.max_concurrent_sessions));
        }

        let now = Utc::now();
        let record = TokenRecord {
            opaque_token: generate_opaque_token(),
            identity: identity.to_string(),
            issued_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
            pool_key: pool_key.to_string(),
        };
        records.insert(record.opaque_token.clone(), record.clone());
        Ok(record)
    }

    /// Look up a token, rejecting unknown or expired entries.
    pub async fn get(&self, token: &str) -> Result<TokenRecord, AuthError> {
        let records = self.inner.records.lock().await;
        let record = records.get(token).ok_or(AuthError::UnknownToken)?;
        if record.is_expired() {
            return Err(AuthError::UnknownToken);
        }
        Ok(record.clone())
    }

    pub async fn delete(&self, token: &str) -> Option<TokenRecord> {
        self.inner.records.lock().await.remove(token)
    }

    pub async fn len(&self) -> usize {
        self.inner.records.lock().await.len()
    }

    /// Remove every expired record, returning their `pool_key`s so the
    /// caller can tear down the associated pools.
    pub async fn sweep_expired(&self) -> Vec<String> {
        let mut records = self.inner.records.lock().await;
        let expired: Vec<String> = records
            .iter()
            .filter(|(_, r)| r.is_expired())
            .map(|(token, _)| token.clone())
            .collect();
        let mut pool_keys = Vec::with_capacity(expired.len());
        for token in expired {
            if let Some(record) = records.remove(&token) {
                pool_keys.push(record.pool_key);
            }
        }
        pool_keys
    }

    /// Spawn the periodic sweeper, invoking `closer` for each pool whose
    /// token expired. Dropping the `SessionStore` aborts the task.
    pub fn spawn_sweeper(&mut self, interval: Duration, closer: Arc<dyn PoolCloser>) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let expired: Vec<String> = {
                    let mut records = inner.records.lock().await;
                    let expired: Vec<String> = records
                        .iter()
                        .filter(|(_, r)| r.is_expired())
                        .map(|(token, _)| token.clone())
                        .collect();
                    let mut pool_keys = Vec::with_capacity(expired.len());
                    for token in expired {
                        if let Some(record) = records.remove(&token) {
                            pool_keys.push(record.pool_key);
                        }
                    }
                    pool_keys
                };
                for pool_key in expired {
                    tracing::info!(pool_key = %pool_key, "session expired, closing pool");
                    closer.close(&pool_key);
                }
            }
        });
        self.sweeper = Some(handle);
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Some(handle) = &self.sweeper {
            handle.abort();
        }
    }
}
