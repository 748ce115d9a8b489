use std::collections::HashMap;

/// Look up the external server URL for `topic`.
///
/// When `secured`, the first `http` in the URL becomes `https` unless the URL
/// already starts with `https`. The URL is otherwise taken as configured.
pub fn resolve(topic: &str, endpoints: &HashMap<String, String>, secured: bool) -> Option<String> {
    let url = endpoints.get(topic)?;
    if secured && !url.starts_with("https") {
        Some(url.replacen("http", "https", 1))
    } else {
        Some(url.clone())
    }
}

/// `host:port` to probe before posting to `endpoint`.
///
/// Parsed URLs get the scheme's default port when none is given. Anything
/// `url` rejects falls back to dropping the scheme and any path.
pub fn dial_address(endpoint: &str) -> Option<String> {
    if let Ok(url) = url::Url::parse(endpoint) {
        if let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) {
            return Some(format!("{host}:{port}"));
        }
    }

    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .unwrap_or(endpoint);
    let addr = rest.split('/').next().unwrap_or(rest);
    (!addr.is_empty()).then(|| addr.to_string())
}

/// Target of the metadata POST.
pub fn post_url(endpoint: &str) -> String {
    format!("{}/metadata", endpoint.trim_end_matches('/'))
}
