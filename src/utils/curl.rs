use crate::models::{AuthHeader, RouteRef};
use crate::services::dispatcher::{placeholder_names, substitute_path};
use serde_json::Value;
use std::collections::BTreeMap;

const CONTINUATION: &str = " \\\n  ";

#[derive(Debug, Clone, Default)]
pub struct CurlInput {
    pub params: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub auth_header: Option<AuthHeader>,
}

/// Renders a shell-ready cURL command. Params not consumed by the path become the query string.
pub fn build_curl(route: &RouteRef, input: &CurlInput, base_url: &str) -> String {
    let method = route.method;
    let path = substitute_path(&route.path, &input.params);
    let mut url = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );

    let consumed = placeholder_names(&route.path);
    let query: Vec<String> = input
        .params
        .iter()
        .filter(|(key, _)| !consumed.contains(*key))
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect();
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query.join("&"));
    }

    let mut curl = format!("curl -X {} \"{}\"", method.as_upper(), url);
    if let Some(auth) = input.auth_header.as_ref() {
        curl.push_str(CONTINUATION);
        curl.push_str(&format!("-H \"{}: {}\"", auth.key, auth.value));
    }
    if method.carries_body() {
        let body = input
            .body
            .clone()
            .filter(|body| !body.is_null())
            .unwrap_or_else(|| Value::Object(Default::default()));
        let pretty = serde_json::to_string_pretty(&body).unwrap_or_else(|_| "{}".to_string());
        curl.push_str(CONTINUATION);
        curl.push_str("-H \"Content-Type: application/json\"");
        curl.push_str(CONTINUATION);
        curl.push_str(&format!("--data '{}'", pretty));
    }
    curl
}
