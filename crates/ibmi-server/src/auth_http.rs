//! Auth HTTP surface (C7/C8), mounted only when IBM-i auth mode is on:
//! `GET /api/v1/auth/public-key` and `POST /api/v1/auth`.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use ibmi_auth::{decrypt_handshake, HandshakeRequest, KeyRegistry, PoolCloser, SessionStore};
use ibmi_gateway::{Credentials, GatewayClient, Identity, PoolManager, PoolSizes};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub struct AuthHttpState<C: GatewayClient> {
    pub keys: KeyRegistry,
    pub sessions: Arc<SessionStore>,
    pub pool_manager: Arc<PoolManager<C>>,
    pub pool_sizes: PoolSizes,
    pub allow_http: bool,
    pub token_ttl: Duration,
}

pub fn router<C: GatewayClient + 'static>(state: Arc<AuthHttpState<C>>) -> Router {
    Router::new()
        .route("/api/v1/auth/public-key", get(public_key::<C>))
        .route("/api/v1/auth", post(handshake::<C>))
        .with_state(state)
}

async fn public_key<C: GatewayClient + 'static>(
    State(state): State<Arc<AuthHttpState<C>>>,
) -> impl IntoResponse {
    match state.keys.public_key_response() {
        Some(Ok(response)) => (StatusCode::OK, Json(serde_json::to_value(response).unwrap())).into_response(),
        Some(Err(err)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string(), "INTERNAL_ERROR"),
        None => error_response(StatusCode::INTERNAL_SERVER_ERROR, "no auth key configured", "CONFIGURATION_ERROR"),
    }
}

#[derive(Serialize)]
struct HandshakeSuccess {
    access_token: String,
    token_type: &'static str,
    expires_in: u64,
}

async fn handshake<C: GatewayClient + 'static>(
    State(state): State<Arc<AuthHttpState<C>>>,
    Json(request): Json<HandshakeRequest>,
) -> impl IntoResponse {
    // The handshake is served only over a reverse-proxied TLS terminator in
    // production; this process sees plain HTTP either way, so "is this
    // TLS" degrades to the explicit allow_http escape hatch.
    let creds = match decrypt_handshake(&state.keys, &request, !state.allow_http, state.allow_http) {
        Ok(c) => c,
        Err(err) => {
            return error_response(StatusCode::UNAUTHORIZED, &err.to_string(), "AUTHENTICATION_ERROR")
        }
    };

    let pool_key = format!("token:{}", ibmi_auth::session::generate_opaque_token());
    let identity = Identity::Token(pool_key.clone());
    let user = creds.user.clone();
    let credentials = Credentials {
        host: creds.host.unwrap_or_default(),
        port: creds.port.unwrap_or(8076),
        user: creds.user,
        password: creds.password,
        ignore_unauthorized: false,
    };

    if let Err(err) = state
        .pool_manager
        .ensure_pool(&identity, &credentials, state.pool_sizes)
        .await
    {
        return error_response(StatusCode::UNAUTHORIZED, &err.to_string(), "AUTHENTICATION_ERROR");
    }

    let record = match state.sessions.put(&user, &pool_key, state.token_ttl).await {
        Ok(record) => record,
        Err(err) => {
            let _ = state.pool_manager.close_pool(&identity).await;
            return error_response(StatusCode::TOO_MANY_REQUESTS, &err.to_string(), "RESOURCE_EXHAUSTED");
        }
    };

    (
        StatusCode::CREATED,
        Json(HandshakeSuccess {
            access_token: record.opaque_token,
            token_type: "bearer",
            expires_in: state.token_ttl.as_secs(),
        }),
    )
        .into_response()
}

fn error_response(status: StatusCode, message: &str, code: &str) -> axum::response::Response {
    (
        status,
        Json(serde_json::json!({"error": message, "errorCode": code})),
    )
        .into_response()
}

/// Bridges [`SessionStore`]'s expiry sweep to [`PoolManager::close_pool`]
/// without `ibmi-auth` depending on `ibmi-gateway`.
pub struct GatewayPoolCloser<C: GatewayClient> {
    pool_manager: Arc<PoolManager<C>>,
}

impl<C: GatewayClient> GatewayPoolCloser<C> {
    pub fn new(pool_manager: Arc<PoolManager<C>>) -> Self {
        Self { pool_manager }
    }
}

impl<C: GatewayClient + 'static> PoolCloser for GatewayPoolCloser<C> {
    fn close(&self, pool_key: &str) {
        let pool_manager = self.pool_manager.clone();
        let identity = Identity::Token(pool_key.to_string());
        tokio::spawn(async move {
            if let Err(err) = pool_manager.close_pool(&identity).await {
                tracing::warn!(error = %err, "failed to close pool for expired session");
            }
        });
    }
}
