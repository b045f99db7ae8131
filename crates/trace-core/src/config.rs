use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::{environment::ExportOptions, registry::PluginRegistry, store::TraceStore};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Root configuration structure deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub plugins: Plugins,
    pub trace: Trace,
    pub export: Export,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Plugins {
    /// Registers the plugins shipped with the application.
    pub builtin: bool,
    /// Directories scanned for JSON manifests.
    pub search_paths: Vec<String>,
}

impl Default for Plugins {
    fn default() -> Self {
        Self {
            builtin: true,
            search_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Trace {
    pub history_limit: usize,
    pub default_plugin: Option<String>,
}

impl Default for Trace {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            default_plugin: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Export {
    pub include_secrets: bool,
}

impl Config {
    /// Validates structural invariants and provides actionable error messages.
    pub fn validate(&self) -> Result<()> {
        if self.trace.history_limit == 0 {
            bail!("trace.history_limit must be at least 1");
        }
        if let Some(plugin) = &self.trace.default_plugin {
            if plugin.trim().is_empty() {
                bail!("trace.default_plugin must not be empty when set");
            }
        }
        for path in &self.plugins.search_paths {
            if path.trim().is_empty() {
                bail!("plugins.search_paths must not contain empty entries");
            }
        }
        Ok(())
    }

    pub fn search_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.plugins.search_paths.iter().map(PathBuf::from)
    }

    /// Builds a registry from built-ins and every manifest directory.
    pub fn build_registry(&self) -> Result<PluginRegistry> {
        let mut registry = if self.plugins.builtin {
            PluginRegistry::with_builtins()
        } else {
            PluginRegistry::new()
        };
        for dir in self.search_paths() {
            let report = registry.load_manifests(&dir)?;
            tracing::info!(
                dir = %dir.display(),
                loaded = report.manifests.len(),
                rejected = report.rejected.len(),
                "plugin manifests loaded"
            );
        }
        Ok(registry)
    }

    pub fn trace_store(&self) -> TraceStore {
        TraceStore::new(self.trace.history_limit)
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            include_secrets: self.export.include_secrets,
        }
    }
}
