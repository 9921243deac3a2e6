//! C11: Hot-Reload Watcher — polls the resolved config files for changes,
//! debounces a burst of edits into one re-merge, and atomically swaps the
//! registry on success. A failed re-merge is logged and the previous
//! registry is kept serving traffic.

use crate::registry::ToolRegistry;
use ibmi_core::config::{load_and_merge, ConfigSource, MergeOptions};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

/// A source's connection parameters, snapshotted so a reload can tell
/// whether an existing pool needs to be torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceFingerprint {
    host: String,
    port: u16,
    user: String,
}

/// Handle to the background polling task. Dropping it does not stop the
/// task; call [`ReloadWatcher::stop`] for a clean shutdown.
pub struct ReloadWatcher {
    handle: JoinHandle<()>,
}

impl ReloadWatcher {
    /// Spawn the poller. `on_sources_changed` is invoked with the names of
    /// any source whose host/port/user changed across a reload, so the
    /// caller can drain the corresponding pools; a reload that only changes
    /// tool/toolset definitions never touches open pools.
    pub fn spawn<F>(
        registry: Arc<ToolRegistry>,
        sources: Vec<ConfigSource>,
        options: MergeOptions,
        toolsets_allow_list: Vec<String>,
        poll_interval: Duration,
        debounce: Duration,
        on_sources_changed: F,
    ) -> Self
    where
        F: Fn(Vec<String>) + Send + Sync + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut mtimes = snapshot_mtimes(&sources);
            let mut fingerprints = HashMap::new();
            let mut ticker = tokio::time::interval(poll_interval);

            loop {
                ticker.tick().await;

                let current = snapshot_mtimes(&sources);
                if current == mtimes {
                    continue;
                }

                // Debounce: wait for the burst of writes to settle before
                // acting, then re-check in case more changes landed.
                tokio::time::sleep(debounce).await;
                let settled = snapshot_mtimes(&sources);
                mtimes = settled;

                match load_and_merge(&sources, &options) {
                    Ok(result) if result.success => {
                        let changed = changed_sources(&fingerprints, &result.config.sources);
                        fingerprints = fingerprint_sources(&result.config.sources);
                        registry.reload(&result.config, &toolsets_allow_list);
                        tracing::info!(
                            tools = result.stats.tools_total,
                            toolsets = result.stats.toolsets_total,
                            "config reloaded"
                        );
                        if !changed.is_empty() {
                            on_sources_changed(changed);
                        }
                    }
                    Ok(result) => {
                        tracing::warn!(
                            errors = ?result.errors,
                            "reloaded config failed validation, keeping previous registry"
                        );
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to reload config, keeping previous registry");
                    }
                }
            }
        });

        Self { handle }
    }

    /// Abort the background poller.
    pub fn stop(self) {
        self.handle.abort();
    }
}

fn snapshot_mtimes(sources: &[ConfigSource]) -> HashMap<PathBuf, Option<SystemTime>> {
    let mut map = HashMap::new();
    for source in sources {
        let base = source
            .base_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let candidate = base.join(&source.path);
        let mtime = std::fs::metadata(&candidate).ok().and_then(|m| m.modified().ok());
        map.insert(candidate, mtime);
    }
    map
}

fn fingerprint_sources(
    sources: &[ibmi_core::config::model::SourceSpec],
) -> HashMap<String, SourceFingerprint> {
    sources
        .iter()
        .map(|s| {
            (
                s.name.clone(),
                SourceFingerprint {
                    host: s.host.clone(),
                    port: s.port,
                    user: s.user.clone(),
                },
            )
        })
        .collect()
}

/// Names of sources present in both snapshots whose connection parameters
/// differ, plus any source removed entirely.
fn changed_sources(
    previous: &HashMap<String, SourceFingerprint>,
    current: &[ibmi_core::config::model::SourceSpec],
) -> Vec<String> {
    if previous.is_empty() {
        return Vec::new();
    }
    let current_map = fingerprint_sources(current);
    let mut changed: Vec<String> = previous
        .iter()
        .filter_map(|(name, old)| match current_map.get(name) {
            Some(new) if new != old => Some(name.clone()),
            None => Some(name.clone()),
            _ => None,
        })
        .collect();
    changed.sort();
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibmi_core::config::model::SourceSpec;

    fn source(name: &str, host: &str, port: u16) -> SourceSpec {
        SourceSpec {
            name: name.to_string(),
            host: host.to_string(),
            user: "u".to_string(),
            password: "p".to_string(),
            port,
            ignore_unauthorized: false,
        }
    }

    #[test]
    fn unchanged_source_parameters_report_no_change() {
        let previous = fingerprint_sources(&[source("main", "h1", 8076)]);
        let changed = changed_sources(&previous, &[source("main", "h1", 8076)]);
        assert!(changed.is_empty());
    }

    #[test]
    fn changed_host_is_reported() {
        let previous = fingerprint_sources(&[source("main", "h1", 8076)]);
        let changed = changed_sources(&previous, &[source("main", "h2", 8076)]);
        assert_eq!(changed, vec!["main".to_string()]);
    }

    #[test]
    fn removed_source_is_reported_as_changed() {
        let previous = fingerprint_sources(&[source("main", "h1", 8076)]);
        let changed = changed_sources(&previous, &[]);
        assert_eq!(changed, vec!["main".to_string()]);
    }

    #[test]
    fn tool_only_changes_leave_source_fingerprints_untouched() {
        let previous = fingerprint_sources(&[source("main", "h1", 8076)]);
        let changed = changed_sources(&previous, &[source("main", "h1", 8076)]);
        assert!(changed.is_empty());
    }

    #[test]
    fn first_reload_with_no_prior_fingerprints_reports_no_change() {
        let previous = HashMap::new();
        let changed = changed_sources(&previous, &[source("main", "h1", 8076)]);
        assert!(changed.is_empty());
    }
}
