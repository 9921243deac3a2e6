//! Static configuration types for the tool catalog.
//!
//! These mirror the declarative YAML shape an operator authors: database
//! [`SourceSpec`]s, [`ToolSpec`]s wrapping a parameterized SQL statement, and
//! [`ToolsetSpec`]s grouping tools for selective exposure. Parameter typing
//! uses a closed, tagged-variant shape (mirroring the teacher's
//! `ColumnList`/`CreatableColumns` pattern) rather than a generic JSON-Schema
//! value, so invalid combinations (e.g. a `pattern` on a boolean parameter)
//! are unrepresentable rather than merely unvalidated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Default IBM i database gateway port.
pub fn default_gateway_port() -> u16 {
    8076
}

fn default_true() -> bool {
    true
}

fn default_max_display_rows() -> u32 {
    100
}

/// A named database connection target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceSpec {
    pub name: String,
    pub host: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// When false, the gateway's TLS certificate is not verified.
    #[serde(default = "default_true", rename = "ignoreUnauthorized")]
    pub ignore_unauthorized: bool,
}

/// The declared type of a tool parameter. Tagged on `type` so each variant
/// only carries the fields meaningful for it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Float,
    Boolean,
    Array,
}

/// A single declared input parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: Option<bool>,
    /// Mandatory when `param_type` is `Array`, meaningless otherwise.
    #[serde(default, rename = "elementType")]
    pub element_type: Option<ParameterType>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default, rename = "minLength")]
    pub min_length: Option<usize>,
    #[serde(default, rename = "maxLength")]
    pub max_length: Option<usize>,
    /// Only meaningful for `String` parameters.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Only meaningful for scalar parameters (never `Boolean` or `Array`).
    #[serde(default)]
    pub r#enum: Option<Vec<Value>>,
}

impl ParameterSpec {
    /// A parameter is effectively required unless it's explicitly optional
    /// (`required: false`) *and* carries no default. A default always
    /// satisfies requiredness per the data model invariant.
    pub fn is_effectively_required(&self) -> bool {
        if self.default.is_some() {
            return false;
        }
        self.required.unwrap_or(true)
    }
}

/// Security-policy overrides for a single tool, merged on top of the
/// registry-wide defaults in [`crate::config::SecurityDefaults`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolSecurity {
    #[serde(default)]
    pub read_only: Option<bool>,
    #[serde(default, rename = "maxSqlLength")]
    pub max_sql_length: Option<usize>,
    /// Additional forbidden keywords, merged with (never replacing) the
    /// built-in destructive set.
    #[serde(default, rename = "forbiddenKeywords")]
    pub forbidden_keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Json,
    Markdown,
}

impl Default for ResponseFormat {
    fn default() -> Self {
        ResponseFormat::Json
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TableStyle {
    Markdown,
    Ascii,
    Grid,
    Compact,
}

impl Default for TableStyle {
    fn default() -> Self {
        TableStyle::Markdown
    }
}

/// User-authored annotation hints. `toolsets` is accepted for
/// forward-compatible parsing but deliberately discarded — toolset
/// membership is derived solely from [`ToolsetSpec`] entries (see
/// `DESIGN.md`, open question 2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolAnnotationsSpec {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub hints: HashMap<String, Value>,
    #[serde(default, rename = "toolsets")]
    pub user_toolsets: Vec<String>,
}

/// A single declarative SQL tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub source: String,
    #[serde(default)]
    pub description: Option<String>,
    pub statement: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub security: Option<ToolSecurity>,
    /// Free-form classification surfaced in the tool's annotations.
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, rename = "responseFormat")]
    pub response_format: ResponseFormat,
    #[serde(default, rename = "tableStyle")]
    pub table_style: TableStyle,
    #[serde(default = "default_max_display_rows", rename = "maxDisplayRows")]
    pub max_display_rows: u32,
    #[serde(default)]
    pub annotations: ToolAnnotationsSpec,
}

/// A named grouping of tools, published as an MCP resource and usable for
/// startup-time filtering via `--toolsets`/`SELECTED_TOOLSETS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsetSpec {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub tools: Vec<String>,
}

/// A fully parsed, not-yet-merged configuration document (one YAML file's
/// worth of content).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub toolsets: Vec<ToolsetSpec>,
}

impl Config {
    /// True if this document carries no content at all — a loaded file is
    /// expected to define at least one of sources/tools/toolsets.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.tools.is_empty() && self.toolsets.is_empty()
    }
}
