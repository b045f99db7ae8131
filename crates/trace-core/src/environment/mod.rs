//! Environment files: export to the portable JSON format and import it back.
//!
//! Exported documents never contain `uid` fields; importing assigns fresh ones.

mod export;
mod import;

use std::{io, path::PathBuf};

use serde::{Deserialize, Serialize};

pub use export::{
    export_environment, export_environments, write_export, ExportDocument, ExportOptions,
    ExportedEnvironment, ExportedVariable, EXPORT_FORMAT_VERSION,
};
pub use import::{import_environments, read_import, ImportReport, RejectedEnvironment};

pub const DEFAULT_VARIABLE_TYPE: &str = "text";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default = "fresh_uid")]
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub variables: Vec<EnvironmentVariable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    #[serde(default = "fresh_uid")]
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "type", default = "default_type")]
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub secret: bool,
}

fn default_type() -> String {
    DEFAULT_VARIABLE_TYPE.to_string()
}

fn default_enabled() -> bool {
    true
}

pub(crate) fn fresh_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uid: fresh_uid(),
            name: name.into(),
            variables: Vec::new(),
        }
    }

    pub fn with_variable(mut self, variable: EnvironmentVariable) -> Self {
        self.variables.push(variable);
        self
    }
}

impl EnvironmentVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            uid: fresh_uid(),
            name: name.into(),
            value: value.into(),
            kind: default_type(),
            enabled: true,
            secret: false,
        }
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognized environment file: {0}")]
    UnrecognizedFormat(String),
    #[error("invalid environment: {0}")]
    InvalidEnvironment(String),
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}
