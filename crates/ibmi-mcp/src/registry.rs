//! C6: Tool Registry — builds a stable `name -> ToolDescriptor` map from a
//! merged [`Config`], and holds it behind an [`ArcSwap`] so hot reload
//! (C11) can publish a new map atomically while in-flight requests keep
//! the descriptor they were dispatched with.

use arc_swap::ArcSwap;
use ibmi_core::config::model::{Config, ParameterType, ToolSpec};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Annotations resolved for a tool, per the derivation rules: user-supplied
/// `toolsets` are always discarded in favor of the authoritative set
/// computed from [`ibmi_core::config::model::ToolsetSpec`] membership.
#[derive(Debug, Clone)]
pub struct ResolvedAnnotations {
    pub title: String,
    pub domain: Option<String>,
    pub category: Option<String>,
    pub read_only_hint: bool,
    pub toolsets: Vec<String>,
    pub custom_metadata: Map<String, Value>,
}

/// A built, ready-to-dispatch tool. Cheap to clone: the heavy bits
/// (schemas, the `ToolSpec`) are held behind `Arc`.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub source: String,
    pub tool_spec: Arc<ToolSpec>,
    pub input_schema: Arc<Value>,
    pub output_schema: Arc<Value>,
    pub annotations: Arc<ResolvedAnnotations>,
}

/// Read-mostly, atomically-swapped tool catalog.
pub struct ToolRegistry {
    descriptors: ArcSwap<HashMap<String, ToolDescriptor>>,
}

impl ToolRegistry {
    /// Build a registry from a validated `config`, applying the toolsets
    /// allow-list (an empty list registers everything).
    pub fn build(config: &Config, toolsets_allow_list: &[String]) -> Self {
        let descriptors = build_descriptors(config, toolsets_allow_list);
        Self {
            descriptors: ArcSwap::from_pointee(descriptors),
        }
    }

    /// Atomically replace the catalog — existing [`ToolDescriptor`] clones
    /// already handed out to in-flight requests remain valid.
    pub fn reload(&self, config: &Config, toolsets_allow_list: &[String]) {
        let descriptors = build_descriptors(config, toolsets_allow_list);
        self.descriptors.store(Arc::new(descriptors));
        tracing::info!(tool_count = self.descriptors.load().len(), "tool registry reloaded");
    }

    pub fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.descriptors.load().get(name).cloned()
    }

    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.descriptors.load().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_descriptors(config: &Config, toolsets_allow_list: &[String]) -> HashMap<String, ToolDescriptor> {
    let mut toolset_membership: HashMap<&str, Vec<String>> = HashMap::new();
    for toolset in &config.toolsets {
        for tool_name in &toolset.tools {
            toolset_membership
                .entry(tool_name.as_str())
                .or_default()
                .push(toolset.name.clone());
        }
    }

    let mut out = HashMap::new();
    for tool in &config.tools {
        if !tool.enabled {
            continue;
        }
        let toolsets = toolset_membership.get(tool.name.as_str()).cloned().unwrap_or_default();
        if !toolsets_allow_list.is_empty() && !toolsets.iter().any(|t| toolsets_allow_list.contains(t)) {
            tracing::debug!(tool = %tool.name, "skipped: not in the active toolsets allow-list");
            continue;
        }

        let annotations = resolve_annotations(tool, toolsets);
        let descriptor = ToolDescriptor {
            name: tool.name.clone(),
            source: tool.source.clone(),
            tool_spec: Arc::new(tool.clone()),
            input_schema: Arc::new(input_schema(tool)),
            output_schema: Arc::new(output_schema()),
            annotations: Arc::new(annotations),
        };
        out.insert(tool.name.clone(), descriptor);
    }
    out
}

fn resolve_annotations(tool: &ToolSpec, toolsets: Vec<String>) -> ResolvedAnnotations {
    let title = tool
        .annotations
        .title
        .clone()
        .unwrap_or_else(|| title_case(&tool.name));
    let read_only_hint = tool
        .annotations
        .hints
        .get("readOnlyHint")
        .and_then(Value::as_bool)
        .or_else(|| tool.security.as_ref().and_then(|s| s.read_only))
        .unwrap_or(true);

    let mut custom_metadata = Map::new();
    for (key, value) in &tool.annotations.hints {
        if key == "readOnlyHint" {
            continue;
        }
        custom_metadata.insert(key.clone(), value.clone());
    }

    ResolvedAnnotations {
        title,
        domain: tool.domain.clone(),
        category: tool.category.clone(),
        read_only_hint,
        toolsets,
        custom_metadata,
    }
}

/// `snake_case`/`kebab-case`/`camelCase` tool name -> `"Title Cased"` words.
fn title_case(name: &str) -> String {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in name.chars() {
        if c == '_' || c == '-' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
            current.push(c);
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .into_iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn input_schema(tool: &ToolSpec) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in &tool.parameters {
        properties.insert(param.name.clone(), parameter_schema(param));
        if param.is_effectively_required() {
            required.push(Value::String(param.name.clone()));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn parameter_schema(param: &ibmi_core::config::model::ParameterSpec) -> Value {
    let mut schema = Map::new();
    schema.insert("type".to_string(), Value::String(json_type_name(param.param_type).to_string()));

    let mut description = param.description.clone().unwrap_or_default();
    if let Some(values) = &param.r#enum {
        schema.insert("enum".to_string(), Value::Array(values.clone()));
        let rendered = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let suffix = format!("Must be one of: {rendered}");
        description = if description.is_empty() {
            suffix
        } else {
            format!("{description} ({suffix})")
        };
    }
    if !description.is_empty() {
        schema.insert("description".to_string(), Value::String(description));
    }
    if let Some(default) = &param.default {
        schema.insert("default".to_string(), default.clone());
    }
    if let Some(min) = param.min {
        schema.insert("minimum".to_string(), json!(min));
    }
    if let Some(max) = param.max {
        schema.insert("maximum".to_string(), json!(max));
    }
    if let Some(min_len) = param.min_length {
        schema.insert("minLength".to_string(), json!(min_len));
    }
    if let Some(max_len) = param.max_length {
        schema.insert("maxLength".to_string(), json!(max_len));
    }
    if let Some(pattern) = &param.pattern {
        schema.insert("pattern".to_string(), Value::String(pattern.clone()));
    }
    if param.param_type == ParameterType::Array {
        if let Some(element_type) = param.element_type {
            schema.insert(
                "items".to_string(),
                json!({ "type": json_type_name(element_type) }),
            );
        }
    }
    Value::Object(schema)
}

fn json_type_name(ty: ParameterType) -> &'static str {
    match ty {
        ParameterType::String => "string",
        ParameterType::Integer => "integer",
        ParameterType::Float => "number",
        ParameterType::Boolean => "boolean",
        ParameterType::Array => "array",
    }
}

/// Fixed shape shared by every tool's response.
fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "success": { "type": "boolean" },
            "data": {},
            "metadata": {
                "type": "object",
                "properties": {
                    "executionTime": { "type": "number" },
                    "rowCount": { "type": "integer" },
                    "affectedRows": { "type": "integer" },
                    "columns": { "type": "array" },
                    "parameterMode": { "type": "string" },
                    "parameterCount": { "type": "integer" },
                    "processedParameters": { "type": "array" },
                    "toolName": { "type": "string" },
                    "sqlStatement": { "type": "string" },
                    "parameters": { "type": "object" }
                }
            },
            "error": { "type": "string" },
            "errorCode": { "type": "string" }
        },
        "required": ["success"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibmi_core::config::model::{ParameterSpec, ResponseFormat, TableStyle, ToolAnnotationsSpec, ToolSecurity, ToolsetSpec};
    use serde_json::json;

    fn base_tool(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            enabled: true,
            source: "main".to_string(),
            description: None,
            statement: "SELECT 1".to_string(),
            parameters: vec![],
            security: None,
            domain: None,
            category: None,
            response_format: ResponseFormat::Json,
            table_style: TableStyle::Markdown,
            max_display_rows: 100,
            annotations: ToolAnnotationsSpec::default(),
        }
    }

    #[test]
    fn title_case_handles_snake_and_camel_case() {
        assert_eq!(title_case("list_users"), "List Users");
        assert_eq!(title_case("listUsers"), "List Users");
    }

    #[test]
    fn disabled_tools_are_not_registered() {
        let mut tool = base_tool("t1");
        tool.enabled = false;
        let config = Config { sources: vec![], tools: vec![tool], toolsets: vec![] };
        let registry = ToolRegistry::build(&config, &[]);
        assert!(registry.is_empty());
    }

    #[test]
    fn toolsets_allow_list_filters_unlisted_tools() {
        let config = Config {
            sources: vec![],
            tools: vec![base_tool("t1"), base_tool("t2")],
            toolsets: vec![ToolsetSpec {
                name: "reporting".to_string(),
                title: None,
                description: None,
                tools: vec!["t1".to_string()],
            }],
        };
        let registry = ToolRegistry::build(&config, &["reporting".to_string()]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("t1").is_some());
        assert!(registry.get("t2").is_none());
    }

    #[test]
    fn user_supplied_toolsets_annotation_is_discarded_in_favor_of_computed_membership() {
        let mut tool = base_tool("t1");
        tool.annotations.user_toolsets = vec!["bogus".to_string()];
        let config = Config {
            sources: vec![],
            tools: vec![tool],
            toolsets: vec![ToolsetSpec {
                name: "real".to_string(),
                title: None,
                description: None,
                tools: vec!["t1".to_string()],
            }],
        };
        let registry = ToolRegistry::build(&config, &[]);
        let descriptor = registry.get("t1").unwrap();
        assert_eq!(descriptor.annotations.toolsets, vec!["real".to_string()]);
    }

    #[test]
    fn read_only_hint_falls_back_to_security_block_then_true() {
        let mut tool = base_tool("t1");
        tool.security = Some(ToolSecurity { read_only: Some(false), max_sql_length: None, forbidden_keywords: vec![] });
        let config = Config { sources: vec![], tools: vec![tool], toolsets: vec![] };
        let registry = ToolRegistry::build(&config, &[]);
        assert!(!registry.get("t1").unwrap().annotations.read_only_hint);

        let tool2 = base_tool("t2");
        let config2 = Config { sources: vec![], tools: vec![tool2], toolsets: vec![] };
        let registry2 = ToolRegistry::build(&config2, &[]);
        assert!(registry2.get("t2").unwrap().annotations.read_only_hint);
    }

    #[test]
    fn enum_parameter_augments_description() {
        let mut tool = base_tool("t1");
        tool.parameters.push(ParameterSpec {
            name: "status".to_string(),
            param_type: ParameterType::String,
            description: Some("Current status".to_string()),
            default: None,
            required: Some(true),
            element_type: None,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            pattern: None,
            r#enum: Some(vec![json!("ACTIVE"), json!("INACTIVE")]),
        });
        let config = Config { sources: vec![], tools: vec![tool], toolsets: vec![] };
        let registry = ToolRegistry::build(&config, &[]);
        let descriptor = registry.get("t1").unwrap();
        let description = descriptor.input_schema["properties"]["status"]["description"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(description.contains("Must be one of:"));
    }

    #[test]
    fn reload_swaps_the_whole_map_atomically() {
        let config = Config { sources: vec![], tools: vec![base_tool("t1")], toolsets: vec![] };
        let registry = ToolRegistry::build(&config, &[]);
        assert_eq!(registry.len(), 1);

        let config2 = Config { sources: vec![], tools: vec![base_tool("t2")], toolsets: vec![] };
        registry.reload(&config2, &[]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("t1").is_none());
        assert!(registry.get("t2").is_some());
    }
}
