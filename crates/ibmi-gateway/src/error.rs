/// Errors raised by the gateway client (C1) or pool manager (C4). Maps onto
/// the `DatabaseError` / `InitializationError` kinds used by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to connect to gateway {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("failed to retrieve root certificate from {endpoint}: {source}")]
    CertificateFetch {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("gateway connection closed unexpectedly")]
    ConnectionClosed,

    #[error("gateway returned malformed response: {0}")]
    MalformedResponse(String),

    #[error("gateway rejected request: {0}")]
    Rejected(String),

    #[error("query was cancelled")]
    Cancelled,

    #[error("pagination exceeded the safety cap of {0} fetch iterations")]
    FetchCapExceeded(usize),

    #[error("no pool is open for this identity")]
    NotInitialized,
}
