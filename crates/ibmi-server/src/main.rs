//! Composition root for the IBM i MCP tool gateway: parses CLI flags and
//! environment variables, loads and merges tool/source config (C5), builds
//! the tool registry (C6), gateway client (C1) and pool manager (C4), wires
//! the dispatcher (C9), and serves either the stdio or HTTP transport.

mod auth_http;
mod cli;
mod env_config;
mod stdio_transport;

use auth_http::{AuthHttpState, GatewayPoolCloser};
use clap::Parser;
use cli::{Cli, Transport};
use env_config::{AuthMode, EnvConfig};
use ibmi_auth::{KeyRegistry, ServerKeyPair, SessionStore};
use ibmi_core::config::{load_and_merge, ConfigSource, ConfigSourceKind, MergeOptions};
use ibmi_core::config::model::SourceSpec;
use ibmi_gateway::{PoolManager, PoolSizes, WsGatewayClient};
use ibmi_mcp::{Dispatcher, ReloadWatcher, ToolRegistry};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_FETCH_SIZE: u32 = 300;
const DEFAULT_POOL_SIZES: PoolSizes = PoolSizes { starting: 2, max: 10 };

fn resolve_config_source(path: &str) -> ConfigSource {
    let kind = if path.contains('*') {
        ConfigSourceKind::Glob
    } else if Path::new(path).is_dir() {
        ConfigSourceKind::Directory
    } else {
        ConfigSourceKind::File
    };
    ConfigSource {
        kind,
        path: path.to_string(),
        base_dir: None,
        required: true,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let env = EnvConfig::from_env();

    let tools_path = cli.tools.clone().or_else(|| env.tools_yaml_path.clone());
    let sources: Vec<ConfigSource> = tools_path.iter().map(|p| resolve_config_source(p)).collect();

    let merge_options = MergeOptions {
        merge_arrays: env.yaml_merge_arrays,
        allow_duplicate_tools: env.yaml_allow_duplicate_tools,
        allow_duplicate_sources: env.yaml_allow_duplicate_sources,
        validate_merged: env.yaml_validate_merged,
    };

    let load_result = load_and_merge(&sources, &merge_options)?;
    if !load_result.success {
        for err in &load_result.errors {
            tracing::error!(error = %err, "config validation failed");
        }
        anyhow::bail!("configuration is invalid, see logged errors");
    }
    let mut config = load_result.config;

    if let Some(static_source) = &env.static_source {
        if !config.sources.iter().any(|s| s.name == "default") {
            config.sources.push(SourceSpec {
                name: "default".to_string(),
                host: static_source.host.clone(),
                user: static_source.user.clone(),
                password: static_source.password.clone(),
                port: static_source.port,
                ignore_unauthorized: static_source.ignore_unauthorized,
            });
        }
    }

    let toolsets_allow_list = if !cli.toolsets.as_deref().unwrap_or_default().is_empty() {
        cli.toolsets
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    } else {
        env.selected_toolsets.clone()
    };

    if cli.list_toolsets {
        for toolset in &config.toolsets {
            println!("{}", toolset.name);
        }
        return Ok(());
    }

    let registry = Arc::new(ToolRegistry::build(&config, &toolsets_allow_list));
    let client = Arc::new(WsGatewayClient);
    let pool_manager = Arc::new(PoolManager::new(client));

    let sources_by_name: HashMap<String, SourceSpec> =
        config.sources.iter().map(|s| (s.name.clone(), s.clone())).collect();

    let sessions = if matches!(env.mcp_auth_mode, AuthMode::Ibmi) {
        let mut store = SessionStore::new(env.ibmi_auth_max_concurrent_sessions);
        store.spawn_sweeper(
            env.ibmi_auth_cleanup_interval,
            Arc::new(GatewayPoolCloser::new(pool_manager.clone())),
        );
        Some(Arc::new(store))
    } else {
        None
    };

    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        pool_manager.clone(),
        sources_by_name,
        sessions.clone(),
        DEFAULT_POOL_SIZES,
        DEFAULT_FETCH_SIZE,
    ));

    let _reload_watcher = if env.yaml_auto_reload && !sources.is_empty() {
        Some(ReloadWatcher::spawn(
            registry.clone(),
            sources.clone(),
            merge_options.clone(),
            toolsets_allow_list.clone(),
            Duration::from_secs(2),
            Duration::from_millis(500),
            {
                let pool_manager = pool_manager.clone();
                move |changed_sources: Vec<String>| {
                    for name in changed_sources {
                        let pool_manager = pool_manager.clone();
                        tokio::spawn(async move {
                            let _ = pool_manager.close_pool(&ibmi_gateway::Identity::Source(name)).await;
                        });
                    }
                }
            },
        ))
    } else {
        None
    };

    let transport = match cli.transport {
        Some(Transport::Stdio) => "stdio",
        Some(Transport::Http) => "http",
        None => env.mcp_transport_type.as_str(),
    };

    match transport {
        "http" => {
            let mut app = ibmi_mcp::http_transport::create_router(Arc::new(
                ibmi_mcp::http_transport::HttpTransportState::new(registry.clone(), dispatcher.clone()),
            ));

            if env.ibmi_http_auth_enabled {
                let keys = load_key_registry(&env)?;
                let auth_state = Arc::new(AuthHttpState {
                    keys,
                    sessions: sessions.clone().unwrap_or_else(|| Arc::new(SessionStore::new(env.ibmi_auth_max_concurrent_sessions))),
                    pool_manager: pool_manager.clone(),
                    pool_sizes: DEFAULT_POOL_SIZES,
                    allow_http: env.ibmi_auth_allow_http,
                    token_ttl: env.ibmi_auth_token_expiry,
                });
                app = app.merge(auth_http::router(auth_state));
            }

            let addr = format!("{}:{}", env.mcp_http_host, env.mcp_http_port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(%addr, "ibmi-server listening (http transport)");
            axum::serve(listener, app).await?;
        }
        _ => {
            stdio_transport::run(registry, dispatcher).await?;
        }
    }

    pool_manager.close_all_pools().await;
    Ok(())
}

fn load_key_registry(env: &EnvConfig) -> anyhow::Result<KeyRegistry> {
    let key_id = env
        .ibmi_auth_key_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("IBMI_AUTH_KEY_ID is required when ibmi auth mode is enabled"))?;
    let private_key_path = env
        .ibmi_auth_private_key_path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("IBMI_AUTH_PRIVATE_KEY_PATH is required when ibmi auth mode is enabled"))?;

    let keypair = ServerKeyPair::load_from_file(key_id, Path::new(&private_key_path))?;
    let mut registry = KeyRegistry::new();
    registry.insert(keypair);
    Ok(registry)
}
