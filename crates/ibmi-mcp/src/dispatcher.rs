//! C9: Request Dispatcher — handles an inbound `tools/call` end-to-end:
//! authenticate, resolve the tool, bind arguments, policy-check, execute,
//! format. The only layer allowed to convert a [`ServerError`] into an MCP
//! response.

use crate::binder::bind;
use crate::error::ServerError;
use crate::formatter::{format_result, OutputMetadata, OutputPayload};
use crate::protocol::{CallToolResponse, RequestContext, ToolContent};
use crate::registry::ToolRegistry;
use crate::sql_validator::validate;
use ibmi_auth::SessionStore;
use ibmi_core::config::model::SourceSpec;
use ibmi_gateway::{Credentials, GatewayClient, Identity, PoolManager, PoolSizes};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A resolved caller identity: either the process-level static credentials
/// for a named source, or an already-open per-token pool from the
/// credential handshake (C7).
enum ResolvedIdentity {
    Static { identity: Identity, creds: Credentials },
    Token { identity: Identity },
}

pub struct Dispatcher<C: GatewayClient> {
    registry: Arc<ToolRegistry>,
    pool_manager: Arc<PoolManager<C>>,
    sources: HashMap<String, SourceSpec>,
    sessions: Option<Arc<SessionStore>>,
    pool_sizes: PoolSizes,
    fetch_size: u32,
}

impl<C: GatewayClient> Dispatcher<C> {
    pub fn new(
        registry: Arc<ToolRegistry>,
        pool_manager: Arc<PoolManager<C>>,
        sources: HashMap<String, SourceSpec>,
        sessions: Option<Arc<SessionStore>>,
        pool_sizes: PoolSizes,
        fetch_size: u32,
    ) -> Self {
        Self {
            registry,
            pool_manager,
            sources,
            sessions,
            pool_sizes,
            fetch_size,
        }
    }

    /// Handle one `tools/call`, per the 7-step algorithm. Never propagates
    /// a `ServerError` — every failure is converted to the `isError: true`
    /// response shape here.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        bearer_token: Option<&str>,
        parent_context: Option<String>,
    ) -> CallToolResponse {
        match self.try_dispatch(tool_name, arguments, bearer_token, parent_context).await {
            Ok(response) => response,
            Err(err) => error_response(tool_name, err),
        }
    }

    async fn try_dispatch(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        bearer_token: Option<&str>,
        parent_context: Option<String>,
    ) -> Result<CallToolResponse, ServerError> {
        let _context = RequestContext::for_tool_call(tool_name, parent_context, None);

        let descriptor = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ServerError::NotFound(tool_name.to_string()))?;

        let resolved = self.resolve_identity(&descriptor.tool_spec.source, bearer_token).await?;

        let bound = bind(&descriptor.tool_spec, &arguments)?;
        validate(&bound.bound_sql, descriptor.tool_spec.security.as_ref())?;

        let policy = Some(crate::sql_validator::policy_for(descriptor.tool_spec.security.as_ref()));
        let result = match &resolved {
            ResolvedIdentity::Static { identity, creds } => {
                self.pool_manager
                    .execute_query_with_pagination(
                        identity,
                        creds,
                        self.pool_sizes,
                        &bound.bound_sql,
                        &bound.positional_values,
                        self.fetch_size,
                        policy.as_ref(),
                    )
                    .await
            }
            ResolvedIdentity::Token { identity } => {
                let single = self
                    .pool_manager
                    .execute_on_initialized(identity, &bound.bound_sql, &bound.positional_values, policy.as_ref())
                    .await?;
                Ok(ibmi_gateway::AggregatedResult {
                    data: single.data,
                    columns: single.columns,
                    success: single.success,
                    sql_return_code: single.sql_return_code,
                    sql_state: single.sql_state,
                    execution_time_ms: single.execution_time_ms,
                    update_count: single.update_count,
                    job_id: single.job_id,
                    fetches: 1,
                })
            }
        }?;

        let payload = OutputPayload {
            success: result.success,
            data: result.data,
            metadata: OutputMetadata {
                execution_time: result.execution_time_ms,
                row_count: result.fetches,
                affected_rows: result.update_count.unwrap_or(0),
                columns: Some(result.columns),
                parameter_mode: bound.parameter_metadata.mode,
                parameter_count: bound.parameter_metadata.count,
                processed_parameters: bound.parameter_metadata.processed_parameters,
                tool_name: tool_name.to_string(),
                sql_statement: bound.bound_sql,
                parameters: Value::Array(bound.positional_values.into_iter().collect()),
            },
            error: None,
            error_code: None,
        };

        Ok(format_result(
            &payload,
            descriptor.tool_spec.response_format,
            descriptor.tool_spec.table_style,
            descriptor.tool_spec.max_display_rows,
        ))
    }

    async fn resolve_identity(
        &self,
        tool_source: &str,
        bearer_token: Option<&str>,
    ) -> Result<ResolvedIdentity, ServerError> {
        if let Some(sessions) = &self.sessions {
            let token = bearer_token.ok_or(ServerError::Authentication)?;
            let record = sessions.get(token).await?;
            return Ok(ResolvedIdentity::Token {
                identity: Identity::Token(record.pool_key),
            });
        }

        // Static (no-auth) mode: the tool names its own source; merge
        // validation (C5) already guarantees `source` refers to a known
        // `SourceSpec`, but we still surface a clean error if it somehow
        // doesn't rather than silently querying an arbitrary source.
        let source = self.sources.get(tool_source).ok_or_else(|| {
            ServerError::Configuration(format!("tool source '{tool_source}' is not configured"))
        })?;
        Ok(ResolvedIdentity::Static {
            identity: Identity::Source(tool_source.to_string()),
            creds: Credentials {
                host: source.host.clone(),
                port: source.port,
                user: source.user.clone(),
                password: source.password.clone(),
                ignore_unauthorized: source.ignore_unauthorized,
            },
        })
    }
}

fn error_response(tool_name: &str, err: ServerError) -> CallToolResponse {
    let code = err.code();
    let message = err.to_string();
    tracing::warn!(tool = tool_name, error_code = code, %err, "tool call failed");
    CallToolResponse {
        content: vec![ToolContent::Text {
            text: format!("Error executing '{tool_name}': {message}"),
        }],
        structured_content: Some(serde_json::json!({
            "success": false,
            "error": message,
            "errorCode": code,
            "errorDetails": Value::Null,
        })),
        is_error: Some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibmi_core::config::model::{Config, ParameterSpec, ParameterType, ResponseFormat, TableStyle, ToolAnnotationsSpec, ToolSpec};
    use ibmi_gateway::client::{ColumnMeta, GatewayResult, PoolHandle, QueryHandle};
    use ibmi_gateway::error::GatewayError as GwErr;
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeClient {
        rows: Vec<Value>,
        opened_hosts: std::sync::Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn new(rows: Vec<Value>) -> Self {
            Self { rows, opened_hosts: std::sync::Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl GatewayClient for FakeClient {
        async fn open_pool(&self, creds: &Credentials, _sizes: PoolSizes) -> Result<PoolHandle, GwErr> {
            self.opened_hosts.lock().unwrap().push(creds.host.clone());
            Ok(PoolHandle::noop())
        }

        async fn execute(&self, _pool: &PoolHandle, _sql: &str, _params: &[Value]) -> Result<GatewayResult, GwErr> {
            Ok(GatewayResult {
                data: self.rows.clone(),
                columns: vec![ColumnMeta { name: "ID".to_string(), type_name: "INTEGER".to_string() }],
                success: true,
                is_done: true,
                sql_return_code: Some(0),
                sql_state: None,
                execution_time_ms: 5,
                update_count: None,
                job_id: None,
                query: None,
            })
        }

        async fn fetch_more(&self, _pool: &PoolHandle, _query: &QueryHandle, _fetch_size: u32) -> Result<GatewayResult, GwErr> {
            unreachable!("single-page result never fetches more")
        }

        async fn close_query(&self, _pool: &PoolHandle, _query: &QueryHandle) -> Result<(), GwErr> {
            Ok(())
        }

        async fn close_pool(&self, _pool: &PoolHandle) -> Result<(), GwErr> {
            Ok(())
        }

        async fn get_root_certificate(&self, _endpoint: &str) -> Result<Vec<u8>, GwErr> {
            Ok(vec![])
        }
    }

    fn tool() -> ToolSpec {
        tool_on_source("main")
    }

    fn tool_on_source(source: &str) -> ToolSpec {
        ToolSpec {
            name: "list_items".to_string(),
            enabled: true,
            source: source.to_string(),
            description: None,
            statement: "SELECT * FROM items WHERE id = :id".to_string(),
            parameters: vec![ParameterSpec {
                name: "id".to_string(),
                param_type: ParameterType::Integer,
                description: None,
                default: None,
                required: Some(true),
                element_type: None,
                min: None,
                max: None,
                min_length: None,
                max_length: None,
                pattern: None,
                r#enum: None,
            }],
            security: None,
            domain: None,
            category: None,
            response_format: ResponseFormat::Json,
            table_style: TableStyle::Markdown,
            max_display_rows: 100,
            annotations: ToolAnnotationsSpec::default(),
        }
    }

    fn dispatcher() -> Dispatcher<FakeClient> {
        let config = Config {
            sources: vec![SourceSpec {
                name: "main".to_string(),
                host: "h".to_string(),
                user: "u".to_string(),
                password: "p".to_string(),
                port: 8076,
                ignore_unauthorized: false,
            }],
            tools: vec![tool()],
            toolsets: vec![],
        };
        let registry = Arc::new(ToolRegistry::build(&config, &[]));
        let client = Arc::new(FakeClient::new(vec![json!({"ID": 1})]));
        let pool_manager = Arc::new(PoolManager::new(client));
        let mut sources = HashMap::new();
        sources.insert("main".to_string(), config.sources[0].clone());
        Dispatcher::new(registry, pool_manager, sources, None, PoolSizes { starting: 1, max: 5 }, 300)
    }

    /// Two configured sources, with the tool bound to the non-first one,
    /// to catch dispatch picking an arbitrary source instead of the
    /// tool's declared one.
    fn dispatcher_with_two_sources() -> (Dispatcher<FakeClient>, Arc<FakeClient>) {
        let config = Config {
            sources: vec![
                SourceSpec {
                    name: "main".to_string(),
                    host: "main-host".to_string(),
                    user: "u".to_string(),
                    password: "p".to_string(),
                    port: 8076,
                    ignore_unauthorized: false,
                },
                SourceSpec {
                    name: "reporting".to_string(),
                    host: "reporting-host".to_string(),
                    user: "u".to_string(),
                    password: "p".to_string(),
                    port: 8076,
                    ignore_unauthorized: false,
                },
            ],
            tools: vec![tool_on_source("reporting")],
            toolsets: vec![],
        };
        let registry = Arc::new(ToolRegistry::build(&config, &[]));
        let client = Arc::new(FakeClient::new(vec![json!({"ID": 1})]));
        let pool_manager = Arc::new(PoolManager::new(client.clone()));
        let sources = config.sources.iter().map(|s| (s.name.clone(), s.clone())).collect();
        (
            Dispatcher::new(registry, pool_manager, sources, None, PoolSizes { starting: 1, max: 5 }, 300),
            client,
        )
    }

    #[tokio::test]
    async fn dispatches_a_successful_call_and_formats_json() {
        let dispatcher = dispatcher();
        let mut args = Map::new();
        args.insert("id".to_string(), json!(1));
        let response = dispatcher.dispatch("list_items", args, None, None).await;
        assert_eq!(response.is_error, None);
    }

    #[tokio::test]
    async fn static_mode_queries_the_tool_declared_source_not_an_arbitrary_one() {
        let (dispatcher, client) = dispatcher_with_two_sources();
        let mut args = Map::new();
        args.insert("id".to_string(), json!(1));
        let response = dispatcher.dispatch("list_items", args, None, None).await;
        assert_eq!(response.is_error, None);
        assert_eq!(client.opened_hosts.lock().unwrap().as_slice(), ["reporting-host"]);
    }

    #[tokio::test]
    async fn unknown_tool_surfaces_as_not_found_error_response() {
        let dispatcher = dispatcher();
        let response = dispatcher.dispatch("nonexistent", Map::new(), None, None).await;
        assert_eq!(response.is_error, Some(true));
        let value = response.structured_content.unwrap();
        assert_eq!(value["errorCode"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn missing_required_argument_surfaces_as_validation_error_response() {
        let dispatcher = dispatcher();
        let response = dispatcher.dispatch("list_items", Map::new(), None, None).await;
        assert_eq!(response.is_error, Some(true));
        let value = response.structured_content.unwrap();
        assert_eq!(value["errorCode"], "VALIDATION_ERROR");
    }
}
