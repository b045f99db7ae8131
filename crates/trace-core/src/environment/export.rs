use std::{io::Write, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{Environment, EnvironmentError, EnvironmentVariable};

pub const EXPORT_FORMAT_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Keep secret values instead of blanking them.
    pub include_secrets: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedVariable {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub enabled: bool,
    pub secret: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedEnvironment {
    pub name: String,
    pub variables: Vec<ExportedVariable>,
}

/// Portable environment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExportDocument {
    Environment {
        version: String,
        name: String,
        variables: Vec<ExportedVariable>,
        #[serde(rename = "exportedAt")]
        exported_at: DateTime<Utc>,
    },
    Environments {
        version: String,
        environments: Vec<ExportedEnvironment>,
        #[serde(rename = "exportedAt")]
        exported_at: DateTime<Utc>,
    },
}

impl ExportDocument {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn export_variable(variable: &EnvironmentVariable, options: ExportOptions) -> ExportedVariable {
    let value = if variable.secret && !options.include_secrets {
        String::new()
    } else {
        variable.value.clone()
    };
    ExportedVariable {
        name: variable.name.clone(),
        value,
        kind: variable.kind.clone(),
        enabled: variable.enabled,
        secret: variable.secret,
    }
}

fn export_variables(environment: &Environment, options: ExportOptions) -> Vec<ExportedVariable> {
    environment
        .variables
        .iter()
        .map(|v| export_variable(v, options))
        .collect()
}

pub fn export_environment(environment: &Environment, options: ExportOptions) -> ExportDocument {
    ExportDocument::Environment {
        version: EXPORT_FORMAT_VERSION.to_string(),
        name: environment.name.clone(),
        variables: export_variables(environment, options),
        exported_at: Utc::now(),
    }
}

pub fn export_environments(environments: &[Environment], options: ExportOptions) -> ExportDocument {
    ExportDocument::Environments {
        version: EXPORT_FORMAT_VERSION.to_string(),
        environments: environments
            .iter()
            .map(|env| ExportedEnvironment {
                name: env.name.clone(),
                variables: export_variables(env, options),
            })
            .collect(),
        exported_at: Utc::now(),
    }
}

/// Writes `document` to `path` through a temporary sibling file, so a failed
/// write leaves any existing file at `path` untouched.
pub fn write_export(path: &Path, document: &ExportDocument) -> Result<(), EnvironmentError> {
    let write_err = |source| EnvironmentError::Write {
        path: path.to_path_buf(),
        source,
    };
    let json = document.to_json_pretty()?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(json.as_bytes()).map_err(write_err)?;
    tmp.write_all(b"\n").map_err(write_err)?;
    tmp.persist(path).map_err(|err| write_err(err.error))?;
    tracing::debug!(path = %path.display(), "environment export written");
    Ok(())
}
