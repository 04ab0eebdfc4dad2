use crate::constants::localhost::NAMES as LOCAL_HOSTS;
use crate::constants::network::TIMEOUT_API_REQUEST_MS;
use crate::errors::CommandError;
use crate::models::{HttpMethod, RequestSnapshot, ResponseRecord, RouteRef};
use crate::services::credentials::CredentialService;
use crate::services::history::HistoryService;
use crate::services::logger::Logger;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}]+)\}").expect("path placeholder regex"));

/// Everything needed to issue one call against a route.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub route: RouteRef,
    pub params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub credential_id: Option<String>,
    pub base_url: String,
}

/// A route resolved into a concrete URL, before any I/O happens.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub url: String,
}

pub(crate) fn placeholder_names(path: &str) -> HashSet<String> {
    PLACEHOLDER
        .captures_iter(path)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// `{name}` placeholders take their value percent-encoded; unknown ones stay literal.
pub fn substitute_path(path: &str, params: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(path, |caps: &regex::Captures| {
            let name = &caps[1];
            match params.get(name) {
                Some(value) => urlencoding::encode(value).into_owned(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn array_elements(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<Value>>(trimmed) {
            return items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect();
        }
    }
    trimmed
        .split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Declared query parameters only; array-typed ones expand to repeated keys.
pub fn query_pairs(route: &RouteRef, params: &BTreeMap<String, String>) -> Vec<(String, String)> {
    let consumed = placeholder_names(&route.path);
    let mut pairs = Vec::new();
    for param in route.query_parameters() {
        if consumed.contains(&param.name) {
            continue;
        }
        let Some(raw) = params.get(&param.name) else {
            continue;
        };
        if param.is_array() {
            for element in array_elements(raw) {
                pairs.push((param.name.clone(), element));
            }
        } else {
            pairs.push((param.name.clone(), raw.clone()));
        }
    }
    pairs
}

pub fn resolve_target(
    base_url: &str,
    route: &RouteRef,
    params: &BTreeMap<String, String>,
) -> Result<ResolvedTarget, CommandError> {
    let path = substitute_path(&route.path, params);
    let query = query_pairs(route, params);
    let mut url = format!("{}{}", base_url.trim_end_matches('/'), path);
    if !query.is_empty() {
        let encoded = serde_urlencoded::to_string(&query).map_err(|err| {
            CommandError::invalid_params(format!("Failed to encode query string: {}", err))
        })?;
        url.push('?');
        url.push_str(&encoded);
    }
    Ok(ResolvedTarget { path, query, url })
}

pub(crate) fn is_local_destination(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|h| h.to_string()))
        .is_some_and(|host| LOCAL_HOSTS.contains(&host.as_str()))
}

fn request_timeout_from_env() -> Duration {
    let ms = std::env::var("CALLSIGN_REQUEST_TIMEOUT_MS")
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .unwrap_or(TIMEOUT_API_REQUEST_MS);
    Duration::from_millis(ms)
}

fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for (key, value) in headers {
        if let Ok(text) = value.to_str() {
            map.insert(key.as_str().to_string(), text.to_string());
        }
    }
    map
}

fn insert_header(headers: &mut HeaderMap, key: &str, value: &str) -> Result<(), CommandError> {
    let name = HeaderName::from_bytes(key.trim().as_bytes())
        .map_err(|_| CommandError::invalid_params(format!("Invalid header name: {}", key)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| CommandError::invalid_params(format!("Invalid value for header {}", key)))?;
    headers.insert(name, value);
    Ok(())
}

pub(crate) fn normalize_body(status: u16, status_text: &str, content_type: &str, text: &str) -> Value {
    if text.trim().is_empty() {
        if (200..300).contains(&status) {
            return Value::Null;
        }
        let message = if status_text.is_empty() { "Request failed" } else { status_text };
        return serde_json::json!({
            "error": format!("HTTP {}", status),
            "message": message,
            "status": status,
        });
    }
    if content_type.contains("application/json") {
        if let Ok(parsed) = serde_json::from_str::<Value>(text) {
            return parsed;
        }
    }
    Value::String(text.to_string())
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> CommandError {
    if err.is_timeout() {
        return CommandError::timeout("HTTP request timed out");
    }
    CommandError::network(err.to_string()).with_hint("Check that the API host is reachable")
}

#[derive(Clone)]
pub struct RequestDispatcher {
    logger: Logger,
    credentials: Arc<CredentialService>,
    history: HistoryService,
    timeout: Duration,
    clients: Arc<Mutex<HashMap<bool, Client>>>,
}

impl RequestDispatcher {
    pub fn new(logger: Logger, credentials: Arc<CredentialService>, history: HistoryService) -> Self {
        Self {
            logger: logger.child("dispatch"),
            credentials,
            history,
            timeout: request_timeout_from_env(),
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn get_client(&self, insecure_ok: bool) -> Result<Client, CommandError> {
        let mut guard = self
            .clients
            .lock()
            .map_err(|_| CommandError::internal("Failed to access HTTP client cache"))?;
        if let Some(existing) = guard.get(&insecure_ok) {
            return Ok(existing.clone());
        }
        let mut builder = Client::builder();
        if insecure_ok {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|err| CommandError::internal(format!("Failed to build HTTP client: {}", err)))?;
        guard.insert(insecure_ok, client.clone());
        Ok(client)
    }

    async fn compose_headers(&self, request: &DispatchRequest) -> Result<HeaderMap, CommandError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (key, value) in &request.headers {
            insert_header(&mut headers, key, value)?;
        }
        if let Some(id) = request.credential_id.as_deref().filter(|id| !id.is_empty()) {
            match self.credentials.get(id).await? {
                Some(stored) => {
                    for (key, value) in CredentialService::format_as_header(&stored) {
                        insert_header(&mut headers, &key, &value)?;
                    }
                }
                None => self.logger.warn(
                    "credential not found, sending without auth",
                    Some(&serde_json::json!({"credential_id": id})),
                ),
            }
        }
        Ok(headers)
    }

    pub async fn dispatch(&self, request: DispatchRequest) -> Result<ResponseRecord, CommandError> {
        let target = resolve_target(&request.base_url, &request.route, &request.params)?;
        let method = request.route.method;
        let headers = self.compose_headers(&request).await?;
        let sent_body = request
            .body
            .clone()
            .filter(|body| !body.is_null() && method != HttpMethod::Get);

        let client = self.get_client(is_local_destination(&target.url))?;
        let mut req = client
            .request(method.to_reqwest(), target.url.clone())
            .headers(headers)
            .timeout(self.timeout);
        if let Some(body) = sent_body.as_ref() {
            let bytes = serde_json::to_vec(body).map_err(|err| {
                CommandError::invalid_params(format!("Request body is not serializable: {}", err))
            })?;
            req = req.body(bytes);
        }

        self.logger.debug(
            "dispatching request",
            Some(&serde_json::json!({"method": method.as_upper(), "url": target.url})),
        );
        let response = req.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("").to_string();
        let response_headers = headers_to_map(response.headers());
        let content_type = response_headers
            .get("content-type")
            .cloned()
            .unwrap_or_default();

        let body = match response.text().await {
            Ok(text) => normalize_body(status.as_u16(), &status_text, &content_type, &text),
            Err(err) => serde_json::json!({
                "error": "Failed to read response",
                "message": err.to_string(),
                "status": status.as_u16(),
            }),
        };

        let timestamp = chrono::Utc::now().to_rfc3339();
        let snapshot = RequestSnapshot {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: timestamp.clone(),
            method: method.as_upper().to_string(),
            path: target.path.clone(),
            status: status.as_u16(),
            request_body: sent_body,
            response_body: Some(body.clone()),
            query_params: (!request.params.is_empty()).then(|| request.params.clone()),
            full_url: target.url.clone(),
            route: request.route.clone(),
        };
        self.record(snapshot);

        Ok(ResponseRecord {
            status: status.as_u16(),
            status_text,
            headers: response_headers,
            body,
            timestamp,
        })
    }

    fn record(&self, snapshot: RequestSnapshot) {
        let history = self.history.clone();
        let logger = self.logger.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = history.append(snapshot) {
                logger.warn(
                    "failed to record request history",
                    Some(&serde_json::json!({"error": err.message})),
                );
            }
        });
    }
}
