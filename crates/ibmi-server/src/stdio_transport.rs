//! STDIO transport: JSON-RPC over stdin/stdout, one request per line.
//! Logging goes to stderr so it never interleaves with the protocol
//! stream. Notifications (requests with no `id`) are processed but never
//! answered.

use ibmi_mcp::{CallToolParams, Dispatcher, JsonRpcRequest, JsonRpcResponse, ToolRegistry};
use ibmi_gateway::GatewayClient;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

pub async fn run<C: GatewayClient + 'static>(
    registry: Arc<ToolRegistry>,
    dispatcher: Arc<Dispatcher<C>>,
) -> std::io::Result<()> {
    eprintln!("ibmi-server starting (stdio transport)");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::with_capacity(8192, stdin).lines();
    let stdout = tokio::io::stdout();
    let mut stdout = BufWriter::with_capacity(8192, stdout);

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unparsable stdin line");
                continue;
            }
        };

        if request.id.is_none() {
            // Notification — acknowledge silently, no response expected.
            continue;
        }

        let response = handle(&registry, &dispatcher, request).await;
        let serialized = serde_json::to_string(&response).unwrap_or_default();
        stdout.write_all(serialized.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}

async fn handle<C: GatewayClient + 'static>(
    registry: &ToolRegistry,
    dispatcher: &Dispatcher<C>,
    request: JsonRpcRequest,
) -> JsonRpcResponse {
    match request.method.as_str() {
        "tools/list" => {
            let tools: Vec<_> = registry
                .list()
                .into_iter()
                .map(|d| {
                    serde_json::json!({
                        "name": d.name,
                        "description": d.tool_spec.description,
                        "inputSchema": *d.input_schema,
                    })
                })
                .collect();
            JsonRpcResponse::success(request.id, serde_json::json!({ "tools": tools }))
        }
        "tools/call" => {
            let params: CallToolParams = match request
                .params
                .clone()
                .and_then(|v| serde_json::from_value(v).ok())
            {
                Some(p) => p,
                None => return JsonRpcResponse::error(request.id, -32602, "invalid tools/call params"),
            };
            let arguments = match params.arguments {
                serde_json::Value::Object(map) => map,
                serde_json::Value::Null => serde_json::Map::new(),
                _ => return JsonRpcResponse::error(request.id, -32602, "arguments must be an object"),
            };
            // No bearer token over stdio: single-tenant, static-source mode only.
            let response = dispatcher.dispatch(&params.name, arguments, None, None).await;
            JsonRpcResponse::success(request.id, serde_json::to_value(response).unwrap_or_default())
        }
        other => JsonRpcResponse::error(request.id, -32601, format!("unknown method: {other}")),
    }
}
