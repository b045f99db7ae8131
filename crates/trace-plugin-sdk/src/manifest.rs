use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declarative description of one trace capability.
///
/// Manifests are either built in code (built-in plugins) or read from JSON
/// files next to the application. The response transformer is code and is
/// attached through [`crate::PluginDefinition`], never through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub trace_config: Option<TraceConfig>,
}

/// Headers and query parameters injected into outgoing requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct TraceConfig {
    pub headers: Vec<TraceParam>,
    pub query_params: Vec<TraceParam>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceParam {
    pub name: String,
    pub value: String,
    /// Entries are applied only when explicitly enabled.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TraceParam {
    pub fn enabled(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            enabled: true,
            description: None,
        }
    }

    pub fn disabled(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            enabled: false,
            ..Self::enabled(name, value)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl TraceConfig {
    pub fn enabled_headers(&self) -> impl Iterator<Item = &TraceParam> {
        self.headers.iter().filter(|h| h.enabled)
    }

    pub fn enabled_query_params(&self) -> impl Iterator<Item = &TraceParam> {
        self.query_params.iter().filter(|p| p.enabled)
    }
}

impl PluginManifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, trace_config: TraceConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            trace_config: Some(trace_config),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Returns the trace configuration, or an empty one for unvalidated manifests.
    pub fn trace_config(&self) -> TraceConfig {
        self.trace_config.clone().unwrap_or_default()
    }

    /// Parses `version` as semver when present.
    pub fn parsed_version(&self) -> Option<semver::Version> {
        self.version
            .as_deref()
            .and_then(|v| semver::Version::parse(v.trim()).ok())
    }

    /// Checks the invariants required at registration time.
    pub fn validate(&self) -> Result<(), ManifestError> {
        require_text(ManifestField::Id, &self.id)?;
        require_text(ManifestField::Name, &self.name)?;
        if self.trace_config.is_none() {
            return Err(ManifestError::new(
                ManifestField::TraceConfig,
                ManifestErrorReason::Missing,
            ));
        }
        Ok(())
    }

    /// Validates the raw document shape, deserializes it and checks invariants.
    pub fn from_value(value: Value) -> Result<Self, ManifestError> {
        let Value::Object(root) = &value else {
            return Err(ManifestError::new(
                ManifestField::Root,
                ManifestErrorReason::NotAnObject,
            ));
        };
        for (field, key) in [(ManifestField::Id, "id"), (ManifestField::Name, "name")] {
            match root.get(key) {
                None | Some(Value::Null) => {
                    return Err(ManifestError::new(field, ManifestErrorReason::Missing))
                }
                Some(Value::String(_)) => {}
                Some(other) => {
                    return Err(ManifestError::new(
                        field,
                        ManifestErrorReason::Malformed(format!("expected a string, found {}", kind(other))),
                    ))
                }
            }
        }
        match root.get("traceConfig") {
            None | Some(Value::Null) => {
                return Err(ManifestError::new(
                    ManifestField::TraceConfig,
                    ManifestErrorReason::Missing,
                ))
            }
            Some(Value::Object(config)) => {
                for (field, key) in [
                    (ManifestField::Headers, "headers"),
                    (ManifestField::QueryParams, "queryParams"),
                ] {
                    match config.get(key) {
                        None | Some(Value::Array(_)) => {}
                        Some(_) => {
                            return Err(ManifestError::new(field, ManifestErrorReason::NotASequence))
                        }
                    }
                }
            }
            Some(_) => {
                return Err(ManifestError::new(
                    ManifestField::TraceConfig,
                    ManifestErrorReason::NotAnObject,
                ))
            }
        }

        let manifest: PluginManifest = serde_json::from_value(value).map_err(|err| {
            ManifestError::new(ManifestField::Root, ManifestErrorReason::Malformed(err.to_string()))
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_json(raw: &str) -> Result<Self, ManifestError> {
        let value: Value = serde_json::from_str(raw).map_err(|err| {
            ManifestError::new(ManifestField::Root, ManifestErrorReason::Malformed(err.to_string()))
        })?;
        Self::from_value(value)
    }
}

fn require_text(field: ManifestField, value: &str) -> Result<(), ManifestError> {
    if value.trim().is_empty() {
        return Err(ManifestError::new(field, ManifestErrorReason::Empty));
    }
    Ok(())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Manifest location a validation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestField {
    Root,
    Id,
    Name,
    TraceConfig,
    Headers,
    QueryParams,
}

impl fmt::Display for ManifestField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = match self {
            ManifestField::Root => "<root>",
            ManifestField::Id => "id",
            ManifestField::Name => "name",
            ManifestField::TraceConfig => "traceConfig",
            ManifestField::Headers => "traceConfig.headers",
            ManifestField::QueryParams => "traceConfig.queryParams",
        };
        f.write_str(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestErrorReason {
    Missing,
    Empty,
    NotAnObject,
    NotASequence,
    Malformed(String),
}

impl fmt::Display for ManifestErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestErrorReason::Missing => f.write_str("is required"),
            ManifestErrorReason::Empty => f.write_str("must not be empty"),
            ManifestErrorReason::NotAnObject => f.write_str("must be an object"),
            ManifestErrorReason::NotASequence => f.write_str("must be a sequence"),
            ManifestErrorReason::Malformed(detail) => write!(f, "is malformed: {detail}"),
        }
    }
}

/// Structured manifest validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("manifest field `{field}` {reason}")]
pub struct ManifestError {
    pub field: ManifestField,
    pub reason: ManifestErrorReason,
}

impl ManifestError {
    pub fn new(field: ManifestField, reason: ManifestErrorReason) -> Self {
        Self { field, reason }
    }
}
