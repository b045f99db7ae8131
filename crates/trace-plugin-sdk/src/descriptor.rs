use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outgoing request as seen by trace plugins.
///
/// Only `url` and `headers` are interpreted; every other field is carried
/// through untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RequestDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Vec<RequestHeader>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub name: String,
    pub value: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl RequestHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            enabled: true,
        }
    }
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(RequestHeader::new(name, value));
        self
    }
}

/// Captured response as handed to response transformers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDescriptor {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_transformed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResponseDescriptor {
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status: Some(status),
            data,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Case-insensitive header lookup returning string values only.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_request_fields_survive_round_trip() {
        let raw = json!({
            "url": "https://api.test/x",
            "method": "GET",
            "headers": [{ "name": "Accept", "value": "*/*" }]
        });
        let request: RequestDescriptor = serde_json::from_value(raw.clone()).unwrap();
        assert!(request.headers[0].enabled);
        assert_eq!(request.extra["method"], "GET");
        let back = serde_json::to_value(&request).unwrap();
        assert_eq!(back["method"], "GET");
        assert_eq!(back["headers"][0]["enabled"], true);
    }

    #[test]
    fn response_tags_are_omitted_until_set() {
        let response = ResponseDescriptor::new(200, json!({ "ok": true }));
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("isTransformed").is_none());
        assert!(value.get("transformError").is_none());
        assert_eq!(value["status"], 200);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let response = ResponseDescriptor::default().with_header("X-Request-Id", "abc");
        assert_eq!(response.header("x-request-id"), Some("abc"));
        assert_eq!(response.header("x-missing"), None);
    }
}
