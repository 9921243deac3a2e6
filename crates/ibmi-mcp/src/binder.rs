//! C3: Parameter Binder — turns the raw argument map received over MCP
//! into a bound SQL statement and positional parameter vector accepted
//! by the gateway client (C1).

use crate::error::ServerError;
use ibmi_core::config::model::{ParameterSpec, ParameterType, ToolSpec};
use ibmi_core::sql::{chars_of, scan_spanned, SqlToken};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// How placeholders appeared in the source statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    Named,
    Positional,
    Mixed,
    /// No placeholders at all (a literal statement).
    None,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterMetadata {
    pub mode: BindMode,
    pub count: usize,
    #[serde(rename = "processedParameters")]
    pub processed_parameters: Vec<String>,
}

/// Output of binding: the statement rewritten with every placeholder
/// reduced to a bare `?`, the positional values in call order, and
/// bookkeeping for observability.
#[derive(Debug, Clone, Serialize)]
pub struct BoundStatement {
    #[serde(rename = "boundSQL")]
    pub bound_sql: String,
    #[serde(rename = "positionalValues")]
    pub positional_values: Vec<Value>,
    #[serde(rename = "parameterMetadata")]
    pub parameter_metadata: ParameterMetadata,
}

/// A validated argument, ready for placeholder substitution.
enum Resolved {
    Scalar(Value),
    Array(Vec<Value>, ParameterType),
}

/// Bind `args` (the raw MCP tool-call argument map) against `tool`'s
/// declared SQL statement and parameter list.
pub fn bind(tool: &ToolSpec, args: &serde_json::Map<String, Value>) -> Result<BoundStatement, ServerError> {
    let mut resolved: HashMap<String, Resolved> = HashMap::new();
    let mut processed_parameters = Vec::new();

    for spec in &tool.parameters {
        match args.get(&spec.name) {
            Some(value) => {
                resolved.insert(spec.name.clone(), validate_and_coerce(spec, value)?);
                processed_parameters.push(spec.name.clone());
            }
            None => {
                if let Some(default) = &spec.default {
                    resolved.insert(spec.name.clone(), validate_and_coerce(spec, default)?);
                    processed_parameters.push(spec.name.clone());
                } else if spec.is_effectively_required() {
                    return Err(ServerError::Validation(format!(
                        "missing required parameter '{}'",
                        spec.name
                    )));
                }
            }
        }
    }

    let tokens = scan_spanned(&tool.statement);
    let chars = chars_of(&tool.statement);

    let has_named = tokens.iter().any(|(t, _)| matches!(t, SqlToken::Named(_)));
    let has_positional = tokens.iter().any(|(t, _)| matches!(t, SqlToken::Positional));
    let mode = match (has_named, has_positional) {
        (true, true) => BindMode::Mixed,
        (true, false) => BindMode::Named,
        (false, true) => BindMode::Positional,
        (false, false) => BindMode::None,
    };

    // Bare `?` placeholders consume declared parameters, in order, that
    // were not already referenced by name.
    let named_refs: HashSet<&str> = tokens
        .iter()
        .filter_map(|(t, _)| match t {
            SqlToken::Named(name) => Some(name.as_str()),
            _ => None,
        })
        .collect();
    let mut positional_cursor = tool
        .parameters
        .iter()
        .filter(|p| !named_refs.contains(p.name.as_str()))
        .map(|p| p.name.clone())
        .collect::<Vec<_>>()
        .into_iter();

    let positional_count = tokens
        .iter()
        .filter(|(t, _)| matches!(t, SqlToken::Positional))
        .count();
    let remaining_declared = tool
        .parameters
        .iter()
        .filter(|p| !named_refs.contains(p.name.as_str()))
        .count();
    if positional_count != remaining_declared {
        return Err(ServerError::Validation(format!(
            "statement has {positional_count} positional placeholder(s) but {remaining_declared} declared parameter(s) remain unbound by name"
        )));
    }

    let mut bound_sql = String::with_capacity(tool.statement.len());
    let mut positional_values = Vec::new();
    let mut last_end = 0usize;

    for (token, span) in &tokens {
        bound_sql.push_str(&chars[last_end..span.start].iter().collect::<String>());
        last_end = span.end;

        match token {
            SqlToken::Named(name) => {
                let value = resolved.get(name).ok_or_else(|| {
                    ServerError::Validation(format!("statement references unknown parameter ':{name}'"))
                })?;
                append_placeholder(&mut bound_sql, &mut positional_values, value)?;
            }
            SqlToken::Positional => {
                let name = positional_cursor.next().ok_or_else(|| {
                    ServerError::Validation("statement has more positional placeholders than declared parameters".to_string())
                })?;
                let value = resolved.get(&name).ok_or_else(|| {
                    ServerError::Validation(format!(
                        "positional placeholder consumes optional parameter '{name}' with no supplied or default value"
                    ))
                })?;
                append_placeholder(&mut bound_sql, &mut positional_values, value)?;
            }
            SqlToken::Word(_) => {
                bound_sql.push_str(&chars[span.clone()].iter().collect::<String>());
            }
        }
    }
    bound_sql.push_str(&chars[last_end..].iter().collect::<String>());

    Ok(BoundStatement {
        bound_sql,
        parameter_metadata: ParameterMetadata {
            mode,
            count: positional_values.len(),
            processed_parameters,
        },
        positional_values,
    })
}

/// Append one resolved value to `values`, emitting the matching number of
/// `?` placeholders into `bound_sql` (more than one for an expanded array).
fn append_placeholder(bound_sql: &mut String, values: &mut Vec<Value>, resolved: &Resolved) -> Result<(), ServerError> {
    match resolved {
        Resolved::Scalar(v) => {
            bound_sql.push('?');
            values.push(v.clone());
        }
        Resolved::Array(items, item_type) => {
            if items.is_empty() {
                bound_sql.push('?');
                values.push(Value::Null);
                let _ = item_type;
            } else {
                let placeholders = std::iter::repeat("?").take(items.len()).collect::<Vec<_>>().join(", ");
                bound_sql.push_str(&placeholders);
                values.extend(items.iter().cloned());
            }
        }
    }
    Ok(())
}

fn validate_and_coerce(spec: &ParameterSpec, value: &Value) -> Result<Resolved, ServerError> {
    match spec.param_type {
        ParameterType::Array => {
            let Value::Array(items) = value else {
                return Err(type_error(spec, "array"));
            };
            let min_len = spec.min_length.unwrap_or(0);
            let max_len = spec.max_length.unwrap_or(usize::MAX);
            if items.is_empty() && min_len >= 1 {
                return Err(ServerError::Validation(format!(
                    "parameter '{}' requires at least {min_len} element(s), got an empty array",
                    spec.name
                )));
            }
            if items.len() < min_len || items.len() > max_len {
                return Err(ServerError::Validation(format!(
                    "parameter '{}' array length {} is outside [{min_len}, {max_len}]",
                    spec.name,
                    items.len()
                )));
            }
            let element_type = spec.element_type.ok_or_else(|| {
                ServerError::Configuration(format!("parameter '{}' is type=array with no elementType", spec.name))
            })?;
            let mut coerced = Vec::with_capacity(items.len());
            for item in items {
                coerced.push(validate_scalar(spec, element_type, item)?);
            }
            Ok(Resolved::Array(coerced, element_type))
        }
        scalar_type => Ok(Resolved::Scalar(validate_scalar(spec, scalar_type, value)?)),
    }
}

fn validate_scalar(spec: &ParameterSpec, ty: ParameterType, value: &Value) -> Result<Value, ServerError> {
    match ty {
        ParameterType::String => {
            let Value::String(s) = value else {
                return Err(type_error(spec, "string"));
            };
            let len = s.chars().count();
            if let Some(min) = spec.min_length {
                if len < min {
                    return Err(ServerError::Validation(format!(
                        "parameter '{}' length {len} is below minLength {min}",
                        spec.name
                    )));
                }
            }
            if let Some(max) = spec.max_length {
                if len > max {
                    return Err(ServerError::Validation(format!(
                        "parameter '{}' length {len} exceeds maxLength {max}",
                        spec.name
                    )));
                }
            }
            if let Some(pattern) = &spec.pattern {
                let re = regex::Regex::new(pattern).map_err(|e| {
                    ServerError::Configuration(format!("parameter '{}' has an invalid pattern: {e}", spec.name))
                })?;
                if !re.is_match(s) {
                    return Err(ServerError::Validation(format!(
                        "parameter '{}' value does not match the required pattern",
                        spec.name
                    )));
                }
            }
            check_enum(spec, value)?;
            Ok(value.clone())
        }
        ParameterType::Integer => {
            let n = value.as_f64().ok_or_else(|| type_error(spec, "integer"))?;
            if n.fract() != 0.0 {
                return Err(type_error(spec, "integer"));
            }
            check_numeric_bounds(spec, n)?;
            check_enum(spec, value)?;
            Ok(value.clone())
        }
        ParameterType::Float => {
            let n = value.as_f64().ok_or_else(|| type_error(spec, "float"))?;
            check_numeric_bounds(spec, n)?;
            check_enum(spec, value)?;
            Ok(value.clone())
        }
        ParameterType::Boolean => {
            if !value.is_boolean() {
                return Err(type_error(spec, "boolean"));
            }
            Ok(value.clone())
        }
        ParameterType::Array => unreachable!("array elements are never themselves arrays"),
    }
}

fn check_numeric_bounds(spec: &ParameterSpec, n: f64) -> Result<(), ServerError> {
    if let Some(min) = spec.min {
        if n < min {
            return Err(ServerError::Validation(format!(
                "parameter '{}' value {n} is below min {min}",
                spec.name
            )));
        }
    }
    if let Some(max) = spec.max {
        if n > max {
            return Err(ServerError::Validation(format!(
                "parameter '{}' value {n} exceeds max {max}",
                spec.name
            )));
        }
    }
    Ok(())
}

fn check_enum(spec: &ParameterSpec, value: &Value) -> Result<(), ServerError> {
    if let Some(allowed) = &spec.r#enum {
        if !allowed.contains(value) {
            return Err(ServerError::Validation(format!(
                "parameter '{}' value is not one of the allowed values",
                spec.name
            )));
        }
    }
    Ok(())
}

fn type_error(spec: &ParameterSpec, expected: &str) -> ServerError {
    ServerError::Validation(format!("parameter '{}' must be a {expected}", spec.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibmi_core::config::model::ParameterType as PT;
    use serde_json::json;

    fn param(name: &str, ty: PT) -> ParameterSpec {
        ParameterSpec {
            name: name.to_string(),
            param_type: ty,
            description: None,
            default: None,
            required: None,
            element_type: None,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            pattern: None,
            r#enum: None,
        }
    }

    fn tool(statement: &str, parameters: Vec<ParameterSpec>) -> ToolSpec {
        ToolSpec {
            name: "t".to_string(),
            enabled: true,
            source: "src".to_string(),
            description: None,
            statement: statement.to_string(),
            parameters,
            security: None,
            domain: None,
            category: None,
            response_format: Default::default(),
            table_style: Default::default(),
            max_display_rows: 100,
            annotations: Default::default(),
        }
    }

    fn args(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn binds_a_simple_named_placeholder() {
        let tool = tool("SELECT * FROM t WHERE name = :name", vec![param("name", PT::String)]);
        let bound = bind(&tool, &args(&[("name", json!("alice"))])).unwrap();
        assert_eq!(bound.bound_sql, "SELECT * FROM t WHERE name = ?");
        assert_eq!(bound.positional_values, vec![json!("alice")]);
        assert_eq!(bound.parameter_metadata.mode, BindMode::Named);
        assert_eq!(bound.parameter_metadata.count, 1);
    }

    #[test]
    fn binds_bare_positional_placeholders_in_declared_order() {
        let tool = tool(
            "SELECT * FROM t WHERE a = ? AND b = ?",
            vec![param("a", PT::Integer), param("b", PT::Integer)],
        );
        let bound = bind(&tool, &args(&[("a", json!(1)), ("b", json!(2))])).unwrap();
        assert_eq!(bound.positional_values, vec![json!(1.0), json!(2.0)]);
        assert_eq!(bound.parameter_metadata.mode, BindMode::Positional);
    }

    #[test]
    fn expands_an_array_parameter_into_in_list_placeholders() {
        let mut library_list = param("library_list", PT::Array);
        library_list.element_type = Some(PT::String);
        let tool = tool(
            "SELECT * FROM objects WHERE library IN (:library_list)",
            vec![library_list],
        );
        let bound = bind(
            &tool,
            &args(&[("library_list", json!(["A", "B", "C"]))]),
        )
        .unwrap();
        assert_eq!(bound.bound_sql, "SELECT * FROM objects WHERE library IN (?, ?, ?)");
        assert_eq!(bound.positional_values, vec![json!("A"), json!("B"), json!("C")]);
    }

    #[test]
    fn mixed_mode_binds_names_first_then_remaining_positionals() {
        let mut library_list = param("library_list", PT::Array);
        library_list.element_type = Some(PT::String);
        let mut months_unused = param("months_unused", PT::Integer);
        months_unused.default = Some(json!(1));
        let tool = tool(
            "SELECT * FROM objects WHERE library IN (:library_list) AND months_unused >= ?",
            vec![param("sql_object_type", PT::String), months_unused, library_list],
        );
        let bound = bind(
            &tool,
            &args(&[
                ("sql_object_type", json!("INDEX")),
                ("library_list", json!(["A", "B", "C"])),
            ]),
        )
        .unwrap();
        assert_eq!(bound.parameter_metadata.mode, BindMode::Mixed);
        assert_eq!(
            bound.positional_values,
            vec![json!("A"), json!("B"), json!("C"), json!(1.0)]
        );
    }

    #[test]
    fn empty_array_with_min_length_is_rejected() {
        let mut library_list = param("library_list", PT::Array);
        library_list.element_type = Some(PT::String);
        library_list.min_length = Some(1);
        let tool = tool("SELECT * FROM t WHERE library IN (:library_list)", vec![library_list]);
        let err = bind(&tool, &args(&[("library_list", json!([]))])).unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
    }

    #[test]
    fn empty_array_without_min_length_binds_a_single_null() {
        let mut library_list = param("library_list", PT::Array);
        library_list.element_type = Some(PT::String);
        let tool = tool("SELECT * FROM t WHERE library IN (:library_list)", vec![library_list]);
        let bound = bind(&tool, &args(&[("library_list", json!([]))])).unwrap();
        assert_eq!(bound.bound_sql, "SELECT * FROM t WHERE library IN (?)");
        assert_eq!(bound.positional_values, vec![Value::Null]);
    }

    #[test]
    fn missing_required_parameter_is_rejected() {
        let tool = tool("SELECT * FROM t WHERE name = :name", vec![param("name", PT::String)]);
        let err = bind(&tool, &args(&[])).unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
    }

    #[test]
    fn missing_optional_parameter_falls_back_to_default() {
        let mut p = param("limit", PT::Integer);
        p.required = Some(false);
        p.default = Some(json!(10));
        let tool = tool("SELECT * FROM t FETCH FIRST :limit ROWS ONLY", vec![p]);
        let bound = bind(&tool, &args(&[])).unwrap();
        assert_eq!(bound.positional_values, vec![json!(10.0)]);
    }

    #[test]
    fn pattern_mismatch_is_rejected() {
        let mut p = param("code", PT::String);
        p.pattern = Some("^[A-Z]{3}$".to_string());
        let tool = tool("SELECT * FROM t WHERE code = :code", vec![p]);
        let err = bind(&tool, &args(&[("code", json!("abc"))])).unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
    }

    #[test]
    fn enum_violation_is_rejected() {
        let mut p = param("status", PT::String);
        p.r#enum = Some(vec![json!("ACTIVE"), json!("INACTIVE")]);
        let tool = tool("SELECT * FROM t WHERE status = :status", vec![p]);
        let err = bind(&tool, &args(&[("status", json!("DELETED"))])).unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)));
    }

    #[test]
    fn named_placeholder_repeated_rebinds_value_each_occurrence() {
        let tool = tool(
            "SELECT * FROM t WHERE a = :x OR b = :x",
            vec![param("x", PT::Integer)],
        );
        let bound = bind(&tool, &args(&[("x", json!(5))])).unwrap();
        assert_eq!(bound.bound_sql, "SELECT * FROM t WHERE a = ? OR b = ?");
        assert_eq!(bound.positional_values, vec![json!(5.0), json!(5.0)]);
    }
}
