use crate::constants::keys::{CACHED_SPEC, LAST_SELECTED_SPEC_URL};
use crate::constants::network::TIMEOUT_SPEC_FETCH_MS;
use crate::constants::protocols::ALLOWED_HTTP;
use crate::errors::CommandError;
use crate::models::{HttpMethod, Parameter, RouteDetails, RouteRef};
use crate::services::dispatcher::map_reqwest_error;
use crate::services::logger::Logger;
use crate::services::state::StateService;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const UNTAGGED: &str = "_untagged";

#[derive(Debug, Clone, PartialEq)]
pub enum SpecSource {
    Url(String),
    File { content: String, path: Option<String> },
    Default,
}

#[derive(Clone)]
pub struct SpecLoader {
    logger: Logger,
    workspace: Arc<StateService>,
    client: reqwest::Client,
}

impl SpecLoader {
    pub fn new(logger: Logger, workspace: Arc<StateService>) -> Self {
        Self {
            logger: logger.child("spec"),
            workspace,
            client: reqwest::Client::new(),
        }
    }

    /// Loaded documents carry their retrieval location in a top-level `path` field.
    pub async fn load(&self, source: SpecSource) -> Result<Value, CommandError> {
        match source {
            SpecSource::Url(url) => self.load_url(&url).await,
            SpecSource::File { content, path } => self.load_content(&content, path.as_deref()),
            SpecSource::Default => self.cached()?.ok_or_else(|| {
                CommandError::not_found("No cached OpenAPI document")
                    .with_hint("Load a spec from a URL or file first")
            }),
        }
    }

    pub fn cached(&self) -> Result<Option<Value>, CommandError> {
        self.workspace.get::<Value>(CACHED_SPEC)
    }

    async fn load_url(&self, raw: &str) -> Result<Value, CommandError> {
        let url = Url::parse(raw.trim())
            .map_err(|err| CommandError::invalid_params(format!("Invalid spec URL: {}", err)))?;
        let protocol = format!("{}:", url.scheme());
        if !ALLOWED_HTTP.contains(&protocol.as_str()) {
            return Err(CommandError::invalid_params(format!(
                "Unsupported spec URL protocol: {}",
                protocol
            )));
        }

        self.logger.info("fetching spec", Some(&serde_json::json!({"url": url.as_str()})));
        let response = self
            .client
            .get(url.clone())
            .timeout(Duration::from_millis(TIMEOUT_SPEC_FETCH_MS))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CommandError::network(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }
        let mut doc: Value = response.json().await.map_err(|err| {
            CommandError::invalid_params(format!("Spec is not valid JSON: {}", err))
        })?;
        set_source_path(&mut doc, url.as_str())?;
        self.remember(&doc, Some(url.as_str()))?;
        Ok(doc)
    }

    fn load_content(&self, content: &str, path: Option<&str>) -> Result<Value, CommandError> {
        let mut doc: Value = serde_json::from_str(content).map_err(|err| {
            CommandError::invalid_params(format!("Spec is not valid JSON: {}", err))
        })?;
        if let Some(path) = path {
            set_source_path(&mut doc, path)?;
        }
        self.remember(&doc, None)?;
        Ok(doc)
    }

    fn remember(&self, doc: &Value, url: Option<&str>) -> Result<(), CommandError> {
        self.workspace.set(CACHED_SPEC, doc)?;
        if let Some(url) = url {
            self.workspace.set(LAST_SELECTED_SPEC_URL, &url)?;
        }
        Ok(())
    }
}

fn set_source_path(doc: &mut Value, path: &str) -> Result<(), CommandError> {
    let map = doc
        .as_object_mut()
        .ok_or_else(|| CommandError::invalid_params("Spec document must be a JSON object"))?;
    map.insert("path".to_string(), Value::String(path.to_string()));
    Ok(())
}

fn parameters_of(value: Option<&Value>) -> Vec<Parameter> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<Parameter>(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn operations(doc: &Value) -> Vec<(RouteRef, Vec<String>)> {
    let mut out = Vec::new();
    let Some(paths) = doc.get("paths").and_then(|v| v.as_object()) else {
        return out;
    };
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        let shared = parameters_of(item.get("parameters"));
        for (key, op) in item {
            let Ok(method) = key.parse::<HttpMethod>() else {
                continue;
            };
            let mut parameters = parameters_of(op.get("parameters"));
            for param in &shared {
                let overridden = parameters
                    .iter()
                    .any(|p| p.name == param.name && p.location == param.location);
                if !overridden {
                    parameters.push(param.clone());
                }
            }
            let details = RouteDetails {
                summary: op
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                description: op.get("description").and_then(|v| v.as_str()).map(String::from),
                parameters,
                request_body: op.get("requestBody").cloned(),
                responses: op.get("responses").cloned().unwrap_or(Value::Null),
            };
            let tags: Vec<String> = op
                .get("tags")
                .and_then(|v| v.as_array())
                .map(|tags| tags.iter().filter_map(|t| t.as_str().map(String::from)).collect())
                .unwrap_or_default();
            out.push((
                RouteRef {
                    method,
                    path: path.clone(),
                    details,
                },
                tags,
            ));
        }
    }
    out
}

pub fn flatten_routes(doc: &Value) -> Vec<RouteRef> {
    operations(doc).into_iter().map(|(route, _)| route).collect()
}

pub fn group_routes_by_tag(doc: &Value) -> BTreeMap<String, Vec<RouteRef>> {
    let mut grouped: BTreeMap<String, Vec<RouteRef>> = BTreeMap::new();
    for (route, tags) in operations(doc) {
        if tags.is_empty() {
            grouped.entry(UNTAGGED.to_string()).or_default().push(route);
            continue;
        }
        for tag in tags {
            grouped.entry(tag).or_default().push(route.clone());
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParameterLocation;
    use serde_json::json;

    fn petstore() -> Value {
        json!({
            "openapi": "3.0.0",
            "paths": {
                "/pets/{id}": {
                    "parameters": [{"name": "id", "in": "path", "required": true}],
                    "get": {"summary": "Get pet", "tags": ["pets"], "responses": {"200": {}}},
                    "delete": {"summary": "Remove pet", "tags": ["pets", "admin"]}
                },
                "/health": {
                    "get": {"summary": "Health", "parameters": [{"$ref": "#/components/parameters/x"}]}
                }
            }
        })
    }

    #[test]
    fn flattens_every_operation_and_skips_non_methods() {
        let routes = flatten_routes(&petstore());
        assert_eq!(routes.len(), 3);
        let get = routes
            .iter()
            .find(|r| r.method == HttpMethod::Get && r.path == "/pets/{id}")
            .unwrap();
        assert_eq!(get.details.summary, "Get pet");
        assert_eq!(get.details.parameters[0].location, Some(ParameterLocation::Path));
        let health = routes.iter().find(|r| r.path == "/health").unwrap();
        assert!(health.details.parameters.is_empty());
    }

    #[test]
    fn groups_by_tag_with_untagged_bucket() {
        let grouped = group_routes_by_tag(&petstore());
        assert_eq!(grouped["pets"].len(), 2);
        assert_eq!(grouped["admin"].len(), 1);
        assert_eq!(grouped[UNTAGGED][0].path, "/health");
    }

    #[tokio::test]
    async fn file_source_caches_and_default_returns_it() {
        let loader = SpecLoader::new(Logger::new("test"), Arc::new(StateService::in_memory()));
        assert!(loader.load(SpecSource::Default).await.is_err());
        let doc = loader
            .load(SpecSource::File {
                content: petstore().to_string(),
                path: Some("/tmp/petstore.json".into()),
            })
            .await
            .unwrap();
        assert_eq!(doc["path"], "/tmp/petstore.json");
        assert_eq!(loader.load(SpecSource::Default).await.unwrap(), doc);
    }

    #[tokio::test]
    async fn rejects_non_http_urls_and_bad_json() {
        let loader = SpecLoader::new(Logger::new("test"), Arc::new(StateService::in_memory()));
        let err = loader
            .load(SpecSource::Url("ftp://example.com/spec.json".into()))
            .await
            .unwrap_err();
        assert!(err.message.contains("protocol"));
        assert!(loader
            .load(SpecSource::File { content: "{nope".into(), path: None })
            .await
            .is_err());
    }
}
