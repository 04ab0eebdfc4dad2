//! Effective API origin for an OpenAPI document.

use crate::errors::CommandError;
use serde_json::Value;
use url::Url;

fn declared_version(doc: &Value, field: &str) -> Option<String> {
    doc.get(field).and_then(|v| match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn is_openapi_3(doc: &Value) -> bool {
    declared_version(doc, "openapi").is_some_and(|v| v.starts_with('3'))
}

fn is_swagger_2(doc: &Value) -> bool {
    declared_version(doc, "swagger").is_some_and(|v| v.starts_with('2'))
        || declared_version(doc, "openapi").is_some_and(|v| v.starts_with('2'))
}

fn first_server_url(doc: &Value) -> Option<&str> {
    doc.get("servers")?
        .as_array()?
        .first()?
        .get("url")?
        .as_str()
}

fn origin_of(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

fn try_resolve(doc: &Value, spec_url: &str) -> Option<String> {
    if is_openapi_3(doc) {
        if let Some(server) = first_server_url(doc) {
            let base = Url::parse(spec_url).ok()?;
            let joined = base.join(server).ok()?;
            return Some(joined.as_str().trim_end_matches('/').to_string());
        }
    }

    if is_swagger_2(doc) {
        if let Some(host) = doc.get("host").and_then(|v| v.as_str()).filter(|h| !h.is_empty()) {
            let https = doc
                .get("schemes")
                .and_then(|v| v.as_array())
                .is_some_and(|schemes| schemes.iter().any(|s| s.as_str() == Some("https")));
            let scheme = if https { "https" } else { "http" };
            let base_path = doc.get("basePath").and_then(|v| v.as_str()).unwrap_or("");
            let built = format!("{}://{}{}", scheme, host, base_path);
            return Some(built.trim_end_matches('/').to_string());
        }
    }

    origin_of(&Url::parse(spec_url).ok()?)
}

/// Never fails: anything unparsable yields `spec_url` unchanged.
pub fn resolve(doc: &Value, spec_url: &str) -> String {
    try_resolve(doc, spec_url).unwrap_or_else(|| spec_url.to_string())
}

/// Variant for callers that would otherwise build a URL against the wrong host.
pub fn resolve_strict(doc: Option<&Value>, spec_url: Option<&str>) -> Result<String, CommandError> {
    let doc = doc.ok_or_else(|| {
        CommandError::resolution("No OpenAPI document is loaded")
            .with_hint("Load a spec with loadJson or pass baseUrl explicitly")
    })?;
    let spec_url = spec_url
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            CommandError::resolution("The loaded OpenAPI document has no source URL")
                .with_hint("Pass baseUrl explicitly")
        })?;
    Ok(resolve(doc, spec_url))
}
