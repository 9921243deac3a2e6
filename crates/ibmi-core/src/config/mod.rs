//! Declarative tool-catalog configuration: the static data model plus the
//! loader/merger that turns a list of configured sources into one
//! validated [`Config`] (C5).

pub mod error;
pub mod loader;
pub mod merge;
pub mod model;

pub use error::ConfigError;
pub use loader::{load_sources, ConfigSource, ConfigSourceKind, LoadedDocument};
pub use merge::{load_and_merge, validate, LoadResult, MergeOptions, MergeStats};
pub use model::{
    default_gateway_port, Config, ParameterSpec, ParameterType, ResponseFormat, SourceSpec,
    TableStyle, ToolAnnotationsSpec, ToolSecurity, ToolSpec, ToolsetSpec,
};
