//! # ibmi-mcp
//!
//! MCP (Model Context Protocol) server for the IBM i tool gateway.
//!
//! Exposes a declaratively configured catalog of parameterized SQL
//! operations as MCP tools. A `tools/call` flows through:
//!
//! ```text
//! agent --MCP--> Dispatcher (C9)
//!                  │ resolve token → identity (ibmi-auth, C8)
//!                  │ resolve tool descriptor (Registry, C6)
//!                  │ coerce + bind arguments (Binder, C3)
//!                  │ policy-check SQL (sql_validator, C2)
//!                  │ acquire pool + execute (ibmi-gateway, C4/C1)
//!                  └──> format (Formatter, C10) --MCP--> agent
//! ```
//!
//! Config is hot-reloadable (C11): a changed source file triggers a
//! re-merge and an atomic registry swap; in-flight requests keep the
//! descriptor they were dispatched with.

pub mod binder;
pub mod dispatcher;
pub mod error;
pub mod formatter;
pub mod http_transport;
pub mod protocol;
pub mod registry;
pub mod reload;
pub mod sql_validator;

pub use binder::{bind, BindMode, BoundStatement};
pub use dispatcher::Dispatcher;
pub use error::ServerError;
pub use formatter::format_result;
pub use protocol::{
    CallToolOptions, CallToolParams, CallToolResponse, JsonRpcRequest, JsonRpcResponse,
    RequestContext, ToolAnnotations, ToolContent, ToolDefinition,
};
pub use registry::{ToolDescriptor, ToolRegistry};
pub use reload::ReloadWatcher;
