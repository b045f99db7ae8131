use std::panic::{self, AssertUnwindSafe};

use bruno_trace_plugin_sdk::{ResponseDescriptor, ResponseTransformer};

/// Result of running a plugin's response transformer.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// No plugin or no transformer applied; the response is returned as-is.
    Unchanged(ResponseDescriptor),
    Transformed(ResponseDescriptor),
    /// The transformer failed; `original` is the untouched input.
    Failed {
        original: ResponseDescriptor,
        message: String,
    },
}

impl TransformOutcome {
    /// Flattens the outcome into the response a caller should display.
    pub fn into_response(self) -> ResponseDescriptor {
        match self {
            TransformOutcome::Unchanged(response) | TransformOutcome::Transformed(response) => {
                response
            }
            TransformOutcome::Failed {
                mut original,
                message,
            } => {
                original.transform_error = Some(message);
                original
            }
        }
    }

    pub fn is_transformed(&self) -> bool {
        matches!(self, TransformOutcome::Transformed(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TransformOutcome::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            TransformOutcome::Unchanged(_) => "unchanged",
            TransformOutcome::Transformed(_) => "transformed",
            TransformOutcome::Failed { .. } => "failed",
        }
    }
}

/// Runs `transformer` with errors and panics contained.
pub fn run_transformer(
    plugin_id: &str,
    transformer: &dyn ResponseTransformer,
    response: &ResponseDescriptor,
) -> TransformOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| transformer.transform(response)));
    let message = match result {
        Ok(Ok(mut transformed)) => {
            transformed.is_transformed = true;
            transformed.transformed_by = Some(plugin_id.to_string());
            transformed.transform_error = None;
            return TransformOutcome::Transformed(transformed);
        }
        Ok(Err(err)) => format!("{err:#}"),
        Err(payload) => panic_message(payload.as_ref()),
    };
    tracing::error!(plugin = plugin_id, error = %message, "response transformer failed");
    TransformOutcome::Failed {
        original: response.clone(),
        message,
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "transformer panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use serde_json::json;

    fn response() -> ResponseDescriptor {
        ResponseDescriptor::new(200, json!({ "value": 1 })).with_header("content-type", "application/json")
    }

    #[test]
    fn success_is_tagged_with_plugin_id() {
        let transformer = |r: &ResponseDescriptor| -> anyhow::Result<ResponseDescriptor> {
            let mut out = r.clone();
            out.data = json!("reshaped");
            Ok(out)
        };
        let outcome = run_transformer("demo", &transformer, &response());
        assert!(outcome.is_transformed());
        let out = outcome.into_response();
        assert_eq!(out.data, json!("reshaped"));
        assert!(out.is_transformed);
        assert_eq!(out.transformed_by.as_deref(), Some("demo"));
    }

    #[test]
    fn stale_transform_error_is_cleared_on_success() {
        let transformer = |r: &ResponseDescriptor| -> anyhow::Result<ResponseDescriptor> {
            let mut out = r.clone();
            out.transform_error = Some("earlier failure".into());
            Ok(out)
        };
        let mut input = response();
        input.transform_error = Some("earlier failure".into());
        let out = run_transformer("demo", &transformer, &input).into_response();
        assert!(out.is_transformed);
        assert_eq!(out.transform_error, None);
    }

    #[test]
    fn errors_are_contained_and_annotated() {
        let transformer = |_: &ResponseDescriptor| -> anyhow::Result<ResponseDescriptor> {
            bail!("bad body")
        };
        let input = response();
        let outcome = run_transformer("demo", &transformer, &input);
        assert_eq!(outcome.error(), Some("bad body"));
        let out = outcome.into_response();
        let mut expected = input.clone();
        expected.transform_error = Some("bad body".into());
        assert_eq!(out, expected);
    }

    #[test]
    fn panics_are_contained_and_annotated() {
        let transformer = |_: &ResponseDescriptor| -> anyhow::Result<ResponseDescriptor> {
            panic!("boom")
        };
        let outcome = run_transformer("demo", &transformer, &response());
        let out = outcome.into_response();
        assert_eq!(out.transform_error.as_deref(), Some("boom"));
        assert!(!out.is_transformed);
        assert_eq!(out.data, json!({ "value": 1 }));
    }
}
