use anyhow::{Context, Result};
use bruno_trace_plugin_sdk::{
    PluginDefinition, PluginManifest, ResponseDescriptor, TraceConfig, TraceParam,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub const BFF_DEBUG_ID: &str = "BFF_debug";

const TRACE_KEYS: &[&str] = &["trace", "debug", "_debug", "_trace", "debugInfo", "traceInfo"];
const UPSTREAM_KEYS: &[&str] = &["upstreamCalls", "upstream_calls", "upstream", "calls"];
const TIMING_KEYS: &[&str] = &["timing", "_timing", "performance", "timings"];
const REQUEST_ID_HEADERS: &[&str] = &["x-request-id", "x-correlation-id", "x-trace-id"];
const REQUEST_ID_KEYS: &[&str] = &["requestId", "request_id", "traceId"];
const DEBUG_HEADER_PREFIXES: &[&str] = &["x-debug", "x-trace", "x-bff", "x-upstream"];
const DEBUG_HEADER_NAMES: &[&str] = &["x-request-id", "x-correlation-id", "server-timing"];

/// BFF debug trace: disables BFF caching and asks for upstream debug output.
pub fn bff_debug() -> PluginDefinition {
    let manifest = PluginManifest::new(
        BFF_DEBUG_ID,
        "BFF Debug Trace",
        TraceConfig {
            headers: vec![TraceParam::enabled("X-Bff-No-Cache", "true")
                .with_description("Bypass the BFF response cache")],
            query_params: vec![TraceParam::enabled("upstreamDebug", "true")
                .with_description("Ask the BFF to include upstream debug data")],
        },
    )
    .with_version("1.0.0")
    .with_description("Collects debug, timing and upstream call data from BFF responses");

    PluginDefinition::new(manifest).with_transformer(transform_bff_response)
}

/// Wraps the response body in a normalized trace envelope.
pub fn transform_bff_response(response: &ResponseDescriptor) -> Result<ResponseDescriptor> {
    let data = match &response.data {
        Value::String(raw) => {
            serde_json::from_str::<Value>(raw).context("response body is not valid JSON")?
        }
        other => other.clone(),
    };

    let mut envelope = Map::new();
    envelope.insert(
        "timestamp".into(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    envelope.insert(
        "traceData".into(),
        first_of(&data, TRACE_KEYS).cloned().unwrap_or(Value::Null),
    );
    envelope.insert("debugHeaders".into(), Value::Object(debug_headers(response)));
    envelope.insert("requestId".into(), request_id(response, &data));
    if let Some(calls) = first_of(&data, UPSTREAM_KEYS) {
        envelope.insert("upstreamCalls".into(), calls.clone());
    }
    if let Some(timing) = first_of(&data, TIMING_KEYS) {
        envelope.insert("timing".into(), timing.clone());
    }
    envelope.insert("originalData".into(), data);

    let mut out = response.clone();
    out.data = Value::Object(envelope);
    Ok(out)
}

fn first_of<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let object = data.as_object()?;
    keys.iter()
        .find_map(|key| object.get(*key).filter(|value| !value.is_null()))
}

fn debug_headers(response: &ResponseDescriptor) -> Map<String, Value> {
    response
        .headers
        .iter()
        .filter(|(name, _)| {
            let lower = name.to_ascii_lowercase();
            DEBUG_HEADER_PREFIXES.iter().any(|p| lower.starts_with(p))
                || DEBUG_HEADER_NAMES.contains(&lower.as_str())
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn request_id(response: &ResponseDescriptor, data: &Value) -> Value {
    REQUEST_ID_HEADERS
        .iter()
        .find_map(|name| response.header(name))
        .map(|id| Value::String(id.to_string()))
        .or_else(|| first_of(data, REQUEST_ID_KEYS).cloned())
        .unwrap_or(Value::Null)
}
