use std::path::PathBuf;

/// Errors raised while loading or merging tool-catalog configuration (C5).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required config path not found: {0}")]
    MissingRequiredPath(PathBuf),

    #[error("glob pattern '{pattern}' under {base_dir} matched no files")]
    EmptyRequiredGlob { pattern: String, base_dir: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid glob pattern '{0}': {1}")]
    InvalidGlob(String, String),

    #[error("duplicate tool name '{0}' across merged sources")]
    DuplicateTool(String),

    #[error("duplicate source name '{0}' across merged sources")]
    DuplicateSource(String),

    #[error("tool '{tool}' references unknown source '{source}'")]
    UnknownSource { tool: String, source: String },

    #[error("toolset '{toolset}' references unknown tool '{tool}'")]
    UnknownTool { toolset: String, tool: String },

    #[error("tool '{tool}': placeholder ':{param}' is not a declared parameter")]
    UnknownPlaceholder { tool: String, param: String },

    #[error("tool '{tool}': maxDisplayRows must be in 1..=1000, got {value}")]
    InvalidMaxDisplayRows { tool: String, value: u32 },

    #[error("tool '{tool}': parameter '{param}' {reason}")]
    InvalidParameter {
        tool: String,
        param: String,
        reason: String,
    },

    #[error("no configuration sections present: expected at least one of sources/tools/toolsets")]
    Empty,
}
