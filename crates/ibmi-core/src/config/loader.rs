//! C5: Config Loader — resolves a list of configured sources (file,
//! directory, or glob) into parsed [`Config`] documents.

use super::error::ConfigError;
use super::model::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSourceKind {
    File,
    Directory,
    Glob,
}

/// One entry in the operator-specified list of places to load tool/source
/// config from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    #[serde(rename = "type")]
    pub kind: ConfigSourceKind,
    pub path: String,
    #[serde(default, rename = "baseDir")]
    pub base_dir: Option<PathBuf>,
    #[serde(default = "default_required")]
    pub required: bool,
}

/// One successfully parsed file plus where it came from, kept so merge
/// errors can name a filename.
pub struct LoadedDocument {
    pub path: PathBuf,
    pub config: Config,
}

/// Resolve every [`ConfigSource`] to a list of parsed documents, in the
/// order the sources were declared. A missing-but-not-required path is
/// skipped with a warning; a missing required path or a required glob that
/// matches nothing is a hard [`ConfigError`]. A file that fails to parse is
/// recorded in `errors` (named by path) and excluded from the returned
/// document list rather than aborting the whole load.
pub fn load_sources(
    sources: &[ConfigSource],
) -> Result<(Vec<LoadedDocument>, Vec<ConfigError>), ConfigError> {
    let mut documents = Vec::new();
    let mut errors = Vec::new();

    for source in sources {
        let paths = resolve_source_paths(source)?;
        for path in paths {
            match read_and_parse(&path) {
                Ok(config) => documents.push(LoadedDocument { path, config }),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unparsable config file");
                    errors.push(err);
                }
            }
        }
    }

    Ok((documents, errors))
}

fn resolve_source_paths(source: &ConfigSource) -> Result<Vec<PathBuf>, ConfigError> {
    match source.kind {
        ConfigSourceKind::File => {
            let path = PathBuf::from(&source.path);
            if !path.is_file() {
                if source.required {
                    return Err(ConfigError::MissingRequiredPath(path));
                }
                tracing::warn!(path = %path.display(), "optional config file not found, skipping");
                return Ok(Vec::new());
            }
            Ok(vec![path])
        }
        ConfigSourceKind::Directory => {
            let dir = PathBuf::from(&source.path);
            if !dir.is_dir() {
                if source.required {
                    return Err(ConfigError::MissingRequiredPath(dir));
                }
                tracing::warn!(dir = %dir.display(), "optional config directory not found, skipping");
                return Ok(Vec::new());
            }
            // The `glob` crate has no brace-expansion syntax, so the two
            // extensions are matched with separate patterns and merged.
            let mut matches = glob_yaml_files(
                &dir.join("**/*.yaml").to_string_lossy(),
                false,
                &dir,
            )?;
            matches.extend(glob_yaml_files(
                &dir.join("**/*.yml").to_string_lossy(),
                false,
                &dir,
            )?);
            matches.sort();
            if matches.is_empty() && source.required {
                return Err(ConfigError::EmptyRequiredGlob {
                    pattern: "**/*.{yaml,yml}".to_string(),
                    base_dir: dir,
                });
            }
            Ok(matches)
        }
        ConfigSourceKind::Glob => {
            let base_dir = source
                .base_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("."));
            let pattern = if Path::new(&source.path).is_absolute() {
                source.path.clone()
            } else {
                base_dir.join(&source.path).to_string_lossy().into_owned()
            };
            glob_yaml_files(&pattern, source.required, &base_dir)
        }
    }
}

fn glob_yaml_files(
    pattern: &str,
    required: bool,
    base_dir: &Path,
) -> Result<Vec<PathBuf>, ConfigError> {
    let mut matches = Vec::new();
    for entry in glob::glob(pattern)
        .map_err(|e| ConfigError::InvalidGlob(pattern.to_string(), e.to_string()))?
    {
        match entry {
            Ok(path) if path.is_file() => matches.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!(pattern, error = %e, "glob entry error, skipping"),
        }
    }
    matches.sort();
    if matches.is_empty() && required {
        return Err(ConfigError::EmptyRequiredGlob {
            pattern: pattern.to_string(),
            base_dir: base_dir.to_path_buf(),
        });
    }
    Ok(matches)
}

fn read_and_parse(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_yaml::from_str(&content).map_err(|e| ConfigError::Yaml {
        path: path.to_path_buf(),
        source: e,
    })
}
