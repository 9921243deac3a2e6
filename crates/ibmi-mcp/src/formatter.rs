//! C10: Response Formatter — converts a tool's structured result into MCP
//! content blocks, either pretty JSON or a typed markdown table.

use crate::binder::BindMode;
use crate::protocol::{CallToolResponse, ToolContent};
use ibmi_core::config::model::TableStyle;
use ibmi_gateway::ColumnMeta;
use serde::Serialize;
use serde_json::{json, Map, Value};

const SQL_ECHO_LIMIT: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct OutputMetadata {
    #[serde(rename = "executionTime")]
    pub execution_time: u64,
    #[serde(rename = "rowCount")]
    pub row_count: usize,
    #[serde(rename = "affectedRows")]
    pub affected_rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnMeta>>,
    #[serde(rename = "parameterMode")]
    pub parameter_mode: BindMode,
    #[serde(rename = "parameterCount")]
    pub parameter_count: usize,
    #[serde(rename = "processedParameters")]
    pub processed_parameters: Vec<String>,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    #[serde(rename = "sqlStatement")]
    pub sql_statement: String,
    pub parameters: Value,
}

/// The fixed output shape every tool's handler produces, before formatting.
#[derive(Debug, Clone, Serialize)]
pub struct OutputPayload {
    pub success: bool,
    pub data: Vec<Value>,
    pub metadata: OutputMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Format `payload` per `response_format`. Errors (`payload.success ==
/// false`) always render as a dedicated error block regardless of format.
pub fn format_result(
    payload: &OutputPayload,
    response_format: ibmi_core::config::model::ResponseFormat,
    table_style: TableStyle,
    max_display_rows: u32,
) -> CallToolResponse {
    let structured_content = serde_json::to_value(payload).unwrap_or(Value::Null);

    if !payload.success {
        let text = render_error_markdown(payload);
        return CallToolResponse {
            content: vec![ToolContent::Text { text }],
            structured_content: Some(structured_content),
            is_error: Some(true),
        };
    }

    let text = match response_format {
        ibmi_core::config::model::ResponseFormat::Json => {
            serde_json::to_string_pretty(payload).unwrap_or_default()
        }
        ibmi_core::config::model::ResponseFormat::Markdown => {
            render_markdown(payload, table_style, max_display_rows)
        }
    };

    CallToolResponse {
        content: vec![ToolContent::Text { text }],
        structured_content: Some(structured_content),
        is_error: None,
    }
}

fn render_error_markdown(payload: &OutputPayload) -> String {
    let mut out = String::new();
    out.push_str(&format!("## {} — Error\n\n", payload.metadata.tool_name));
    out.push_str(&format!(
        "**Error code:** `{}`\n\n",
        payload.error_code.as_deref().unwrap_or("UNKNOWN")
    ));
    out.push_str(&format!(
        "**Message:** {}\n\n",
        payload.error.as_deref().unwrap_or("unknown error")
    ));
    out.push_str("**SQL:**\n```sql\n");
    out.push_str(&truncate(&payload.metadata.sql_statement, SQL_ECHO_LIMIT));
    out.push_str("\n```\n");
    out
}

fn render_markdown(payload: &OutputPayload, style: TableStyle, max_display_rows: u32) -> String {
    let mut out = String::new();
    out.push_str(&format!("## {}\n\n", payload.metadata.tool_name));
    out.push_str("**Success**\n\n");

    out.push_str("**SQL:**\n```sql\n");
    out.push_str(&truncate(&payload.metadata.sql_statement, SQL_ECHO_LIMIT));
    out.push_str("\n```\n\n");

    if !payload.metadata.processed_parameters.is_empty() {
        out.push_str("**Parameters:**\n");
        for name in &payload.metadata.processed_parameters {
            out.push_str(&format!("- `{name}`\n"));
        }
        out.push('\n');
    }

    if payload.data.is_empty() {
        out.push_str("_No rows returned._\n");
        return out;
    }

    let columns = payload.metadata.columns.clone().unwrap_or_else(|| infer_columns(&payload.data));
    let max_rows = max_display_rows.max(1) as usize;
    let total = payload.data.len();
    let shown = &payload.data[..total.min(max_rows)];

    out.push_str(&format!("{} row{} returned.\n\n", total, if total == 1 { "" } else { "s" }));

    let headers: Vec<String> = columns
        .iter()
        .map(|c| format!("{} ({})", c.name, c.type_name))
        .collect();
    let alignments: Vec<Alignment> = columns.iter().map(|c| alignment_for(&c.type_name)).collect();

    let mut null_counts = vec![0usize; columns.len()];
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(shown.len());
    for row in shown {
        let mut cells = Vec::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            let value = row.get(column.name.as_str());
            match value {
                None | Some(Value::Null) => {
                    null_counts[i] += 1;
                    cells.push("-".to_string());
                }
                Some(other) => cells.push(render_cell(other)),
            }
        }
        rows.push(cells);
    }

    out.push_str(&render_table(style, &headers, &alignments, &rows));
    out.push('\n');

    if total > shown.len() {
        out.push_str(&format!(
            "\n_Showing {} of {} rows. {} omitted._\n",
            shown.len(),
            total,
            total - shown.len()
        ));
    }

    let null_summary: Vec<String> = columns
        .iter()
        .zip(&null_counts)
        .filter(|(_, count)| **count > 0)
        .map(|(c, count)| format!("{}: {count}", c.name))
        .collect();
    if !null_summary.is_empty() {
        out.push_str(&format!("\n_Null values — {}_\n", null_summary.join(", ")));
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Alignment {
    Left,
    Right,
}

fn alignment_for(sql_type: &str) -> Alignment {
    let base = sql_type.split('(').next().unwrap_or(sql_type).trim().to_uppercase();
    const NUMERIC_FAMILIES: &[&str] = &[
        "INTEGER", "INT", "SMALLINT", "BIGINT", "DECIMAL", "NUMERIC", "FLOAT", "DOUBLE", "REAL",
    ];
    if NUMERIC_FAMILIES.contains(&base.as_str()) {
        Alignment::Right
    } else {
        Alignment::Left
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn infer_columns(rows: &[Value]) -> Vec<ColumnMeta> {
    rows.first()
        .and_then(Value::as_object)
        .map(|obj| {
            obj.keys()
                .map(|name| ColumnMeta {
                    name: name.clone(),
                    type_name: "UNKNOWN".to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn render_table(style: TableStyle, headers: &[String], alignments: &[Alignment], rows: &[Vec<String>]) -> String {
    match style {
        TableStyle::Markdown => render_markdown_table(headers, alignments, rows),
        TableStyle::Ascii => render_bordered_table(headers, rows, '+', '-', '|'),
        TableStyle::Grid => render_bordered_table(headers, rows, '┼', '─', '│'),
        TableStyle::Compact => render_compact_table(headers, rows),
    }
}

fn render_markdown_table(headers: &[String], alignments: &[Alignment], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    out.push_str("| ");
    out.push_str(&headers.join(" | "));
    out.push_str(" |\n|");
    for alignment in alignments {
        out.push_str(match alignment {
            Alignment::Left => " :--- |",
            Alignment::Right => " ---: |",
        });
    }
    out.push('\n');
    for row in rows {
        out.push_str("| ");
        out.push_str(&row.join(" | "));
        out.push_str(" |\n");
    }
    out
}

fn column_widths(headers: &[String], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }
    widths
}

fn render_bordered_table(headers: &[String], rows: &[Vec<String>], corner: char, horizontal: char, vertical: char) -> String {
    let widths = column_widths(headers, rows);
    let border = |widths: &[usize]| {
        let mut line = String::from(corner);
        for w in widths {
            line.push_str(&horizontal.to_string().repeat(w + 2));
            line.push(corner);
        }
        line
    };
    let row_line = |cells: &[String]| {
        let mut line = String::from(vertical);
        for (cell, width) in cells.iter().zip(&widths) {
            line.push_str(&format!(" {cell:<width$} ", width = width));
            line.push(vertical);
        }
        line
    };

    let mut out = String::new();
    out.push_str(&border(&widths));
    out.push('\n');
    out.push_str(&row_line(headers));
    out.push('\n');
    out.push_str(&border(&widths));
    out.push('\n');
    for row in rows {
        out.push_str(&row_line(row));
        out.push('\n');
    }
    out.push_str(&border(&widths));
    out.push('\n');
    out
}

fn render_compact_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let widths = column_widths(headers, rows);
    let mut out = String::new();
    for (h, w) in headers.iter().zip(&widths) {
        out.push_str(&format!("{h:<w$}  ", w = w));
    }
    out.push('\n');
    for row in rows {
        for (cell, w) in row.iter().zip(&widths) {
            out.push_str(&format!("{cell:<w$}  ", w = w));
        }
        out.push('\n');
    }
    out
}

fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        let mut truncated: String = s.chars().take(limit).collect();
        truncated.push_str("...");
        truncated
    }
}
