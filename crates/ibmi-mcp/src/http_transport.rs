//! HTTP transport for the MCP server: JSON-RPC over `POST /mcp` plus a
//! `/health` probe. No SSE/streaming surface — every `tools/call` is a
//! single request/response round trip through the [`Dispatcher`].

use crate::dispatcher::Dispatcher;
use crate::protocol::{
    CallToolParams, JsonRpcRequest, JsonRpcResponse, ListToolsResponse, ToolAnnotations,
    ToolDefinition,
};
use crate::registry::ToolRegistry;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use ibmi_gateway::GatewayClient;
use std::sync::Arc;

/// Shared state for the HTTP transport.
pub struct HttpTransportState<C: GatewayClient> {
    registry: Arc<ToolRegistry>,
    dispatcher: Arc<Dispatcher<C>>,
}

impl<C: GatewayClient> HttpTransportState<C> {
    pub fn new(registry: Arc<ToolRegistry>, dispatcher: Arc<Dispatcher<C>>) -> Self {
        Self { registry, dispatcher }
    }
}

/// Build the `axum` router: `POST /mcp` for JSON-RPC, `GET /health` for
/// liveness probes.
pub fn create_router<C: GatewayClient + 'static>(state: Arc<HttpTransportState<C>>) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp_post::<C>))
        .route("/health", get(handle_health))
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn handle_mcp_post<C: GatewayClient + 'static>(
    State(state): State<Arc<HttpTransportState<C>>>,
    headers: HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let token = bearer_token(&headers).map(|s| s.to_string());
    let response = route_request(&state, request, token.as_deref()).await;
    (StatusCode::OK, Json(response))
}

async fn route_request<C: GatewayClient + 'static>(
    state: &HttpTransportState<C>,
    request: JsonRpcRequest,
    bearer_token: Option<&str>,
) -> JsonRpcResponse {
    match request.method.as_str() {
        "tools/list" => {
            let tools = state
                .registry
                .list()
                .into_iter()
                .map(|descriptor| ToolDefinition {
                    name: descriptor.name.clone(),
                    description: descriptor.tool_spec.description.clone(),
                    input_schema: (*descriptor.input_schema).clone(),
                    annotations: Some(ToolAnnotations {
                        requires_approval: Some(!descriptor.annotations.read_only_hint),
                        dry_run_supported: Some(false),
                        read_only: Some(descriptor.annotations.read_only_hint),
                        approval_fields: None,
                    }),
                })
                .collect();
            let result = serde_json::to_value(ListToolsResponse { tools }).unwrap_or_default();
            JsonRpcResponse::success(request.id, result)
        }
        "tools/call" => {
            let params: CallToolParams = match request
                .params
                .clone()
                .and_then(|v| serde_json::from_value(v).ok())
            {
                Some(p) => p,
                None => {
                    return JsonRpcResponse::error(request.id, -32602, "invalid tools/call params")
                }
            };
            let arguments = match params.arguments {
                serde_json::Value::Object(map) => map,
                serde_json::Value::Null => serde_json::Map::new(),
                _ => return JsonRpcResponse::error(request.id, -32602, "arguments must be an object"),
            };
            let parent_context = request.id.as_ref().map(|v| v.to_string());
            let response = state
                .dispatcher
                .dispatch(&params.name, arguments, bearer_token, parent_context)
                .await;
            let result = serde_json::to_value(response).unwrap_or_default();
            JsonRpcResponse::success(request.id, result)
        }
        other => JsonRpcResponse::error(request.id, -32601, format!("unknown method: {other}")),
    }
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ibmi-mcp",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolRegistry;
    use axum::body::Body;
    use axum::http::Request;
    use ibmi_core::config::model::Config;
    use ibmi_gateway::{Credentials, GatewayResult, PoolHandle, PoolManager, PoolSizes, QueryHandle};
    use async_trait::async_trait;
    use tower::ServiceExt;

    struct EmptyClient;

    #[async_trait]
    impl GatewayClient for EmptyClient {
        async fn open_pool(&self, _c: &Credentials, _s: PoolSizes) -> Result<PoolHandle, ibmi_gateway::GatewayError> {
            unreachable!()
        }
        async fn execute(&self, _p: &PoolHandle, _s: &str, _v: &[serde_json::Value]) -> Result<GatewayResult, ibmi_gateway::GatewayError> {
            unreachable!()
        }
        async fn fetch_more(&self, _p: &PoolHandle, _q: &QueryHandle, _f: u32) -> Result<GatewayResult, ibmi_gateway::GatewayError> {
            unreachable!()
        }
        async fn close_query(&self, _p: &PoolHandle, _q: &QueryHandle) -> Result<(), ibmi_gateway::GatewayError> {
            Ok(())
        }
        async fn close_pool(&self, _p: &PoolHandle) -> Result<(), ibmi_gateway::GatewayError> {
            Ok(())
        }
        async fn get_root_certificate(&self, _e: &str) -> Result<Vec<u8>, ibmi_gateway::GatewayError> {
            Ok(vec![])
        }
    }

    fn state() -> Arc<HttpTransportState<EmptyClient>> {
        let config = Config { sources: vec![], tools: vec![], toolsets: vec![] };
        let registry = Arc::new(ToolRegistry::build(&config, &[]));
        let pool_manager = Arc::new(PoolManager::new(Arc::new(EmptyClient)));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            pool_manager,
            Default::default(),
            None,
            PoolSizes { starting: 1, max: 1 },
            100,
        ));
        Arc::new(HttpTransportState::new(registry, dispatcher))
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let app = create_router(state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_jsonrpc_method_returns_method_not_found() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(1)),
            method: "nonexistent".to_string(),
            params: None,
        };
        let response = route_request(&state(), request, None).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn tools_list_on_empty_registry_returns_empty_array() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(1)),
            method: "tools/list".to_string(),
            params: None,
        };
        let response = route_request(&state(), request, None).await;
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 0);
    }
}
