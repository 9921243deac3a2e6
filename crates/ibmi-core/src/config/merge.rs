//! C5: Config Merger — combines parsed documents in declared order into a
//! single validated [`Config`].

use super::error::ConfigError;
use super::loader::{load_sources, ConfigSource, LoadedDocument};
use super::model::{Config, SourceSpec, ToolSpec, ToolsetSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOptions {
    #[serde(default = "default_true", rename = "mergeArrays")]
    pub merge_arrays: bool,
    #[serde(default, rename = "allowDuplicateTools")]
    pub allow_duplicate_tools: bool,
    #[serde(default, rename = "allowDuplicateSources")]
    pub allow_duplicate_sources: bool,
    #[serde(default = "default_true", rename = "validateMerged")]
    pub validate_merged: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            merge_arrays: true,
            allow_duplicate_tools: false,
            allow_duplicate_sources: false,
            validate_merged: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeStats {
    pub sources_loaded: usize,
    pub sources_merged: usize,
    pub tools_total: usize,
    pub toolsets_total: usize,
    pub sources_total: usize,
}

/// Outcome of a full load-then-merge pass.
pub struct LoadResult {
    pub success: bool,
    pub config: Config,
    pub stats: MergeStats,
    pub resolved_file_paths: Vec<PathBuf>,
    pub errors: Vec<ConfigError>,
}

/// Load every configured source and merge the resulting documents into one
/// [`Config`], applying `options` and then (if `validate_merged`) checking
/// referential integrity.
pub fn load_and_merge(
    sources: &[ConfigSource],
    options: &MergeOptions,
) -> Result<LoadResult, ConfigError> {
    let (documents, mut errors) = load_sources(sources)?;
    let resolved_file_paths: Vec<PathBuf> = documents.iter().map(|d| d.path.clone()).collect();
    let sources_loaded = documents.len();

    let merged = merge_documents(&documents, options, &mut errors)?;

    if options.validate_merged {
        if let Err(e) = validate(&merged) {
            return Ok(LoadResult {
                success: false,
                config: merged,
                stats: MergeStats {
                    sources_loaded,
                    sources_merged: sources_loaded,
                    tools_total: 0,
                    toolsets_total: 0,
                    sources_total: 0,
                },
                resolved_file_paths,
                errors: {
                    errors.push(e);
                    errors
                },
            });
        }
    }

    let stats = MergeStats {
        sources_loaded,
        sources_merged: sources_loaded,
        tools_total: merged.tools.len(),
        toolsets_total: merged.toolsets.len(),
        sources_total: merged.sources.len(),
    };

    Ok(LoadResult {
        success: true,
        config: merged,
        stats,
        resolved_file_paths,
        errors,
    })
}

fn merge_documents(
    documents: &[LoadedDocument],
    options: &MergeOptions,
    errors: &mut Vec<ConfigError>,
) -> Result<Config, ConfigError> {
    let mut sources: Vec<SourceSpec> = Vec::new();
    let mut source_index: HashMap<String, usize> = HashMap::new();

    let mut tools: Vec<ToolSpec> = Vec::new();
    let mut tool_index: HashMap<String, usize> = HashMap::new();

    let mut toolsets: Vec<ToolsetSpec> = Vec::new();
    let mut toolset_index: HashMap<String, usize> = HashMap::new();

    for doc in documents {
        for source in doc.config.sources.clone() {
            if let Some(&i) = source_index.get(&source.name) {
                if options.allow_duplicate_sources {
                    tracing::warn!(name = %source.name, "duplicate source, last one wins");
                    sources[i] = source;
                } else {
                    return Err(ConfigError::DuplicateSource(source.name));
                }
            } else {
                source_index.insert(source.name.clone(), sources.len());
                sources.push(source);
            }
        }

        for tool in doc.config.tools.clone() {
            if let Some(&i) = tool_index.get(&tool.name) {
                if options.allow_duplicate_tools {
                    tracing::warn!(name = %tool.name, "duplicate tool, last one wins");
                    tools[i] = tool;
                } else {
                    return Err(ConfigError::DuplicateTool(tool.name));
                }
            } else {
                tool_index.insert(tool.name.clone(), tools.len());
                tools.push(tool);
            }
        }

        for toolset in doc.config.toolsets.clone() {
            match toolset_index.get(&toolset.name) {
                Some(&i) if options.merge_arrays => {
                    tracing::debug!(name = %toolset.name, "concatenating toolset tool lists");
                    for t in toolset.tools {
                        if !toolsets[i].tools.contains(&t) {
                            toolsets[i].tools.push(t);
                        }
                    }
                    if toolset.title.is_some() {
                        toolsets[i].title = toolset.title;
                    }
                    if toolset.description.is_some() {
                        toolsets[i].description = toolset.description;
                    }
                }
                Some(&i) => {
                    tracing::debug!(name = %toolset.name, "replacing toolset wholesale");
                    toolsets[i] = toolset;
                }
                None => {
                    toolset_index.insert(toolset.name.clone(), toolsets.len());
                    toolsets.push(toolset);
                }
            }
        }
    }

    let _ = errors;
    Ok(Config {
        sources,
        tools,
        toolsets,
    })
}

/// Post-merge referential-integrity checks: every tool's `source` must
/// resolve, every toolset's tool list must resolve, every tool's SQL
/// placeholders must be declared parameters, and `maxDisplayRows` must be
/// in range.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let source_names: std::collections::HashSet<&str> =
        config.sources.iter().map(|s| s.name.as_str()).collect();

    for tool in &config.tools {
        if !source_names.contains(tool.source.as_str()) {
            return Err(ConfigError::UnknownSource {
                tool: tool.name.clone(),
                source: tool.source.clone(),
            });
        }
        if !(1..=1000).contains(&tool.max_display_rows) {
            return Err(ConfigError::InvalidMaxDisplayRows {
                tool: tool.name.clone(),
                value: tool.max_display_rows,
            });
        }
        let declared: std::collections::HashSet<&str> =
            tool.parameters.iter().map(|p| p.name.as_str()).collect();
        for placeholder in crate::sql::named_placeholders(&tool.statement) {
            if !declared.contains(placeholder.as_str()) {
                return Err(ConfigError::UnknownPlaceholder {
                    tool: tool.name.clone(),
                    param: placeholder,
                });
            }
        }
    }

    let tool_names: std::collections::HashSet<&str> =
        config.tools.iter().map(|t| t.name.as_str()).collect();
    for toolset in &config.toolsets {
        for tool in &toolset.tools {
            if !tool_names.contains(tool.as_str()) {
                return Err(ConfigError::UnknownTool {
                    toolset: toolset.name.clone(),
                    tool: tool.clone(),
                });
            }
        }
    }

    if config.is_empty() {
        return Err(ConfigError::Empty);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{ParameterSpec, ParameterType};

    fn src(name: &str) -> SourceSpec {
        SourceSpec {
            name: name.into(),
            host: "h".into(),
            user: "u".into(),
            password: "p".into(),
            port: 8076,
            ignore_unauthorized: false,
        }
    }

    fn tool(name: &str, source: &str, statement: &str) -> ToolSpec {
        ToolSpec {
            name: name.into(),
            enabled: true,
            source: source.into(),
            description: None,
            statement: statement.into(),
            parameters: vec![],
            security: None,
            domain: None,
            category: None,
            response_format: Default::default(),
            table_style: Default::default(),
            max_display_rows: 100,
            annotations: Default::default(),
        }
    }

    #[test]
    fn duplicate_tool_without_allow_errors() {
        let a = LoadedDocument {
            path: "a.yaml".into(),
            config: Config {
                sources: vec![src("main")],
                tools: vec![tool("t1", "main", "SELECT 1")],
                toolsets: vec![],
            },
        };
        let b = LoadedDocument {
            path: "b.yaml".into(),
            config: Config {
                sources: vec![],
                tools: vec![tool("t1", "main", "SELECT 2")],
                toolsets: vec![],
            },
        };
        let mut errors = Vec::new();
        let err = merge_documents(&[a, b], &MergeOptions::default(), &mut errors).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTool(_)));
    }

    #[test]
    fn duplicate_tool_with_allow_last_wins() {
        let a = LoadedDocument {
            path: "a.yaml".into(),
            config: Config {
                sources: vec![src("main")],
                tools: vec![tool("t1", "main", "SELECT 1")],
                toolsets: vec![],
            },
        };
        let b = LoadedDocument {
            path: "b.yaml".into(),
            config: Config {
                sources: vec![],
                tools: vec![tool("t1", "main", "SELECT 2")],
                toolsets: vec![],
            },
        };
        let opts = MergeOptions {
            allow_duplicate_tools: true,
            ..Default::default()
        };
        let mut errors = Vec::new();
        let merged = merge_documents(&[a, b], &opts, &mut errors).unwrap();
        assert_eq!(merged.tools.len(), 1);
        assert_eq!(merged.tools[0].statement, "SELECT 2");
    }

    #[test]
    fn toolset_arrays_concat_by_default() {
        let a = LoadedDocument {
            path: "a.yaml".into(),
            config: Config {
                sources: vec![],
                tools: vec![],
                toolsets: vec![ToolsetSpec {
                    name: "reporting".into(),
                    title: None,
                    description: None,
                    tools: vec!["t1".into()],
                }],
            },
        };
        let b = LoadedDocument {
            path: "b.yaml".into(),
            config: Config {
                sources: vec![],
                tools: vec![],
                toolsets: vec![ToolsetSpec {
                    name: "reporting".into(),
                    title: None,
                    description: None,
                    tools: vec!["t2".into()],
                }],
            },
        };
        let mut errors = Vec::new();
        let merged = merge_documents(&[a, b], &MergeOptions::default(), &mut errors).unwrap();
        assert_eq!(merged.toolsets.len(), 1);
        assert_eq!(merged.toolsets[0].tools, vec!["t1", "t2"]);
    }

    #[test]
    fn validate_rejects_unknown_source() {
        let config = Config {
            sources: vec![],
            tools: vec![tool("t1", "missing", "SELECT 1")],
            toolsets: vec![],
        };
        assert!(matches!(
            validate(&config),
            Err(ConfigError::UnknownSource { .. })
        ));
    }

    #[test]
    fn validate_rejects_placeholder_not_declared() {
        let mut t = tool("t1", "main", "SELECT * FROM x WHERE id = :id");
        t.parameters = vec![ParameterSpec {
            name: "other".into(),
            param_type: ParameterType::String,
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
        }];
        let config = Config {
            sources: vec![src("main")],
            tools: vec![t],
            toolsets: vec![],
        };
        assert!(matches!(
            validate(&config),
            Err(ConfigError::UnknownPlaceholder { .. })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_max_display_rows() {
        let mut t = tool("t1", "main", "SELECT 1");
        t.max_display_rows = 0;
        let config = Config {
            sources: vec![src("main")],
            tools: vec![t],
            toolsets: vec![],
        };
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidMaxDisplayRows { .. })
        ));
    }
}
