//! Reads the environment-variable table from a single entry point, in the
//! style of `cori-server::config`'s `AppConfig`/`from_env`-shaped loaders,
//! rather than scattering `env::var` calls across the binary.

use std::env;
use std::time::Duration;

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn var_bool(name: &str, default: bool) -> bool {
    var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn var_u64(name: &str, default: u64) -> u64 {
    var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    None,
    Jwt,
    OAuth,
    Ibmi,
}

impl AuthMode {
    fn from_env_value(v: &str) -> Self {
        match v.to_ascii_lowercase().as_str() {
            "jwt" => AuthMode::Jwt,
            "oauth" => AuthMode::OAuth,
            "ibmi" => AuthMode::Ibmi,
            _ => AuthMode::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaticSourceEnv {
    pub host: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub ignore_unauthorized: bool,
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub mcp_transport_type: String,
    pub mcp_http_port: u16,
    pub mcp_http_host: String,
    pub mcp_allowed_origins: Vec<String>,
    pub mcp_auth_mode: AuthMode,

    pub ibmi_http_auth_enabled: bool,
    pub ibmi_auth_allow_http: bool,
    pub ibmi_auth_token_expiry: Duration,
    pub ibmi_auth_cleanup_interval: Duration,
    pub ibmi_auth_max_concurrent_sessions: usize,
    pub ibmi_auth_private_key_path: Option<String>,
    pub ibmi_auth_public_key_path: Option<String>,
    pub ibmi_auth_key_id: Option<String>,

    pub static_source: Option<StaticSourceEnv>,

    pub tools_yaml_path: Option<String>,
    pub selected_toolsets: Vec<String>,

    pub yaml_merge_arrays: bool,
    pub yaml_allow_duplicate_tools: bool,
    pub yaml_allow_duplicate_sources: bool,
    pub yaml_validate_merged: bool,
    pub yaml_auto_reload: bool,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        let static_source = var("DB2i_HOST").map(|host| StaticSourceEnv {
            host,
            user: var("DB2i_USER").unwrap_or_default(),
            password: var("DB2i_PASS").unwrap_or_default(),
            port: var("DB2i_PORT").and_then(|v| v.parse().ok()).unwrap_or(8076),
            ignore_unauthorized: var_bool("DB2i_IGNORE_UNAUTHORIZED", false),
        });

        Self {
            mcp_transport_type: var("MCP_TRANSPORT_TYPE").unwrap_or_else(|| "stdio".to_string()),
            mcp_http_port: var("MCP_HTTP_PORT").and_then(|v| v.parse().ok()).unwrap_or(3010),
            mcp_http_host: var("MCP_HTTP_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            mcp_allowed_origins: var("MCP_ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
            mcp_auth_mode: var("MCP_AUTH_MODE").map(|v| AuthMode::from_env_value(&v)).unwrap_or(AuthMode::None),

            ibmi_http_auth_enabled: var_bool("IBMI_HTTP_AUTH_ENABLED", false),
            ibmi_auth_allow_http: var_bool("IBMI_AUTH_ALLOW_HTTP", false),
            ibmi_auth_token_expiry: Duration::from_secs(var_u64("IBMI_AUTH_TOKEN_EXPIRY_SECONDS", 3600)),
            ibmi_auth_cleanup_interval: Duration::from_secs(var_u64("IBMI_AUTH_CLEANUP_INTERVAL_SECONDS", 300)),
            ibmi_auth_max_concurrent_sessions: var_u64("IBMI_AUTH_MAX_CONCURRENT_SESSIONS", 100) as usize,
            ibmi_auth_private_key_path: var("IBMI_AUTH_PRIVATE_KEY_PATH"),
            ibmi_auth_public_key_path: var("IBMI_AUTH_PUBLIC_KEY_PATH"),
            ibmi_auth_key_id: var("IBMI_AUTH_KEY_ID"),

            static_source,

            tools_yaml_path: var("TOOLS_YAML_PATH"),
            selected_toolsets: var("SELECTED_TOOLSETS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),

            yaml_merge_arrays: var_bool("YAML_MERGE_ARRAYS", true),
            yaml_allow_duplicate_tools: var_bool("YAML_ALLOW_DUPLICATE_TOOLS", false),
            yaml_allow_duplicate_sources: var_bool("YAML_ALLOW_DUPLICATE_SOURCES", false),
            yaml_validate_merged: var_bool("YAML_VALIDATE_MERGED", true),
            yaml_auto_reload: var_bool("YAML_AUTO_RELOAD", false),
        }
    }
}
