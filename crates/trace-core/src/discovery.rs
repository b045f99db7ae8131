use std::{
    fs, io,
    path::{Path, PathBuf},
};

use bruno_trace_plugin_sdk::{ManifestError, PluginManifest};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to read plugin directory {}: {source}", path.display())]
    ReadDir { path: PathBuf, source: io::Error },
    #[error("failed to read manifest {}: {source}", path.display())]
    ReadManifest { path: PathBuf, source: io::Error },
}

/// Manifest file that could not be turned into a valid manifest.
#[derive(Debug)]
pub struct RejectedManifest {
    pub path: PathBuf,
    pub error: ManifestError,
}

#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub manifests: Vec<PluginManifest>,
    pub rejected: Vec<RejectedManifest>,
}

/// Reads every `*.json` manifest directly under `dir`, sorted by file name.
/// A missing directory yields an empty report.
pub fn discover_manifests(dir: &Path) -> Result<DiscoveryReport, DiscoveryError> {
    let mut report = DiscoveryReport::default();
    if !dir.exists() {
        return Ok(report);
    }
    let read_dir_err = |source| DiscoveryError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_err)? {
        let path = entry.map_err(read_dir_err)?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    for path in paths {
        let data = fs::read_to_string(&path).map_err(|source| DiscoveryError::ReadManifest {
            path: path.clone(),
            source,
        })?;
        match PluginManifest::from_json(&data) {
            Ok(manifest) => report.manifests.push(manifest),
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "skipping invalid manifest");
                report.rejected.push(RejectedManifest { path, error });
            }
        }
    }
    Ok(report)
}
