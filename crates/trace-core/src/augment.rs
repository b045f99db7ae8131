use bruno_trace_plugin_sdk::{RequestDescriptor, RequestHeader, TraceConfig, TraceParam};

/// Returns a copy of `request` carrying the enabled headers and query
/// parameters of `config`, in manifest order.
pub fn augment_request(config: &TraceConfig, request: &RequestDescriptor) -> RequestDescriptor {
    let mut augmented = request.clone();
    augmented.headers.extend(
        config
            .enabled_headers()
            .map(|header| RequestHeader::new(header.name.clone(), header.value.clone())),
    );
    if let Some(url) = &request.url {
        augmented.url = Some(append_query_params(url, config.enabled_query_params()));
    }
    augmented
}

/// Appends percent-encoded `name=value` pairs, starting with `?` unless the
/// URL already carries a query string.
pub fn append_query_params<'a>(url: &str, params: impl IntoIterator<Item = &'a TraceParam>) -> String {
    let mut out = url.to_string();
    let mut has_query = url.contains('?');
    for param in params {
        if !has_query {
            out.push('?');
            has_query = true;
        } else if !(out.ends_with('?') || out.ends_with('&')) {
            out.push('&');
        }
        out.push_str(&urlencoding::encode(&param.name));
        out.push('=');
        out.push_str(&urlencoding::encode(&param.value));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(headers: Vec<TraceParam>, query_params: Vec<TraceParam>) -> TraceConfig {
        TraceConfig {
            headers,
            query_params,
        }
    }

    #[test]
    fn appends_enabled_headers_in_order() {
        let request = RequestDescriptor::new("https://x.com/a").with_header("A", "1");
        let cfg = config(
            vec![
                TraceParam::enabled("B", "2"),
                TraceParam::disabled("D", "4"),
                TraceParam::enabled("C", "3"),
            ],
            vec![],
        );
        let out = augment_request(&cfg, &request);
        let names: Vec<_> = out.headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert!(out.headers.iter().all(|h| h.enabled));
        assert_eq!(request.headers.len(), 1);
        assert_eq!(out.url.as_deref(), Some("https://x.com/a"));
    }

    #[test]
    fn query_separator_depends_on_existing_query() {
        let params = [TraceParam::enabled("k", "v")];
        assert_eq!(append_query_params("https://x.com/a", &params), "https://x.com/a?k=v");
        assert_eq!(
            append_query_params("https://x.com/a?z=1", &params),
            "https://x.com/a?z=1&k=v"
        );
    }

    #[test]
    fn multiple_params_use_ampersand_after_first() {
        let params = [
            TraceParam::enabled("a", "1"),
            TraceParam::disabled("skip", "x"),
            TraceParam::enabled("b", "2"),
        ];
        let cfg = config(vec![], params.to_vec());
        let out = augment_request(&cfg, &RequestDescriptor::new("https://x.com/p"));
        assert_eq!(out.url.as_deref(), Some("https://x.com/p?a=1&b=2"));
    }

    #[test]
    fn names_and_values_are_percent_encoded() {
        let params = [TraceParam::enabled("trace id", "a&b=c/d")];
        assert_eq!(
            append_query_params("https://x.com", &params),
            "https://x.com?trace%20id=a%26b%3Dc%2Fd"
        );
    }

    #[test]
    fn trailing_separator_is_not_doubled() {
        let params = [TraceParam::enabled("k", "v")];
        assert_eq!(append_query_params("https://x.com/a?", &params), "https://x.com/a?k=v");
        assert_eq!(append_query_params("https://x.com/a?z=1&", &params), "https://x.com/a?z=1&k=v");
    }

    #[test]
    fn request_without_url_only_gets_headers() {
        let mut request = RequestDescriptor::default();
        request.extra.insert("method".into(), "POST".into());
        let cfg = config(
            vec![TraceParam::enabled("X", "1")],
            vec![TraceParam::enabled("k", "v")],
        );
        let out = augment_request(&cfg, &request);
        assert!(out.url.is_none());
        assert_eq!(out.headers.len(), 1);
        assert_eq!(out.extra["method"], "POST");
    }
}
