use std::{fs, path::Path};

use serde_json::{Map, Value};

use super::{
    default_type, fresh_uid, Environment, EnvironmentError, EnvironmentVariable,
};

/// Environment entry from a multi-environment file that was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEnvironment {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub environments: Vec<Environment>,
    pub rejected: Vec<RejectedEnvironment>,
}

/// Parses an exported environment file, or a bare `{name, variables}`
/// object, into environments with fresh uids and filled-in defaults.
pub fn import_environments(raw: &str) -> Result<ImportReport, EnvironmentError> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(root) = value else {
        return Err(EnvironmentError::UnrecognizedFormat(
            "expected a JSON object".into(),
        ));
    };

    let mut report = ImportReport::default();
    match root.get("type").and_then(Value::as_str) {
        Some("environment") => {
            let env = normalize(&root).map_err(EnvironmentError::InvalidEnvironment)?;
            report.environments.push(env);
        }
        Some("environments") => {
            let Some(entries) = root.get("environments").and_then(Value::as_array) else {
                return Err(EnvironmentError::UnrecognizedFormat(
                    "`environments` must be a sequence".into(),
                ));
            };
            for (index, entry) in entries.iter().enumerate() {
                let result = entry
                    .as_object()
                    .ok_or_else(|| "entry is not an object".to_string())
                    .and_then(normalize);
                match result {
                    Ok(env) => report.environments.push(env),
                    Err(reason) => {
                        tracing::warn!(index, reason = %reason, "skipping invalid environment");
                        report.rejected.push(RejectedEnvironment { index, reason });
                    }
                }
            }
        }
        Some(other) => {
            return Err(EnvironmentError::UnrecognizedFormat(format!(
                "unsupported type `{other}`"
            )))
        }
        None if root.get("name").is_some_and(Value::is_string)
            && root.get("variables").is_some_and(Value::is_array) =>
        {
            let env = normalize(&root).map_err(EnvironmentError::InvalidEnvironment)?;
            report.environments.push(env);
        }
        None => {
            return Err(EnvironmentError::UnrecognizedFormat(
                "expected an environment export or an object with `name` and `variables`".into(),
            ))
        }
    }

    tracing::debug!(
        imported = report.environments.len(),
        rejected = report.rejected.len(),
        "environments imported"
    );
    Ok(report)
}

pub fn read_import(path: &Path) -> Result<ImportReport, EnvironmentError> {
    let raw = fs::read_to_string(path).map_err(|source| EnvironmentError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    import_environments(&raw)
}

fn normalize(entry: &Map<String, Value>) -> Result<Environment, String> {
    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| "environment has no name".to_string())?;

    let variables = match entry.get("variables") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                normalize_variable(item)
                    .ok_or_else(|| format!("variable {i} of `{name}` has no name"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(format!("variables of `{name}` must be a sequence")),
    };

    Ok(Environment {
        uid: fresh_uid(),
        name: name.to_string(),
        variables,
    })
}

fn normalize_variable(item: &Value) -> Option<EnvironmentVariable> {
    let object = item.as_object()?;
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())?;
    Some(EnvironmentVariable {
        uid: fresh_uid(),
        name: name.to_string(),
        value: coerce_value(object.get("value")),
        kind: object
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(default_type),
        enabled: object.get("enabled").and_then(Value::as_bool).unwrap_or(true),
        secret: object.get("secret").and_then(Value::as_bool).unwrap_or(false),
    })
}

fn coerce_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
