//! Error types for the MCP server.
//!
//! Lower layers throw/return typed errors; the dispatcher (C9) is the only
//! place that converts them into MCP responses.

use thiserror::Error;

/// The error kinds raised anywhere in the stack and converted to an MCP
/// response exclusively by the dispatcher.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Configuration(String),

    #[error("authentication failed")]
    Authentication,

    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("database error: {message}")]
    Database {
        message: String,
        sql_return_code: Option<i32>,
    },

    #[error("pool could not be initialized: {0}")]
    Initialization(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// The stable error-code string surfaced in `structuredContent.errorCode`.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Validation(_) => "VALIDATION_ERROR",
            ServerError::Configuration(_) => "CONFIGURATION_ERROR",
            ServerError::Authentication => "AUTHENTICATION_ERROR",
            ServerError::NotFound(_) => "NOT_FOUND",
            ServerError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            ServerError::Database { .. } => "DATABASE_ERROR",
            ServerError::Initialization(_) => "INITIALIZATION_ERROR",
            ServerError::Cancelled => "CANCELLED",
            ServerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ibmi_core::config::ConfigError> for ServerError {
    fn from(err: ibmi_core::config::ConfigError) -> Self {
        ServerError::Configuration(err.to_string())
    }
}

impl From<ibmi_core::sql::SqlPolicyError> for ServerError {
    fn from(err: ibmi_core::sql::SqlPolicyError) -> Self {
        ServerError::Validation(err.to_string())
    }
}

impl From<ibmi_gateway::GatewayError> for ServerError {
    fn from(err: ibmi_gateway::GatewayError) -> Self {
        match err {
            ibmi_gateway::GatewayError::Cancelled => ServerError::Cancelled,
            ibmi_gateway::GatewayError::Rejected(msg) => ServerError::Validation(msg),
            ibmi_gateway::GatewayError::NotInitialized => {
                ServerError::Initialization("no pool is open for this identity".to_string())
            }
            other => ServerError::Database {
                message: other.to_string(),
                sql_return_code: None,
            },
        }
    }
}

impl From<ibmi_auth::AuthError> for ServerError {
    fn from(err: ibmi_auth::AuthError) -> Self {
        match err {
            ibmi_auth::AuthError::ResourceExhausted(n) => {
                ServerError::ResourceExhausted(format!("{n} concurrent sessions"))
            }
            _ => ServerError::Authentication,
        }
    }
}
