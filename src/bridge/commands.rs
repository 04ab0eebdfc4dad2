//! Typed view of every command the host accepts.

use crate::errors::CommandError;
use crate::models::{AuthHeader, HttpMethod, RouteRef};
use crate::services::codegen::CodeGenConfig;
use crate::utils::suggest::suggest;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const COMMANDS: &[&str] = &[
    "storeAuth",
    "getAllCredentials",
    "getCredentialById",
    "getAuthHeader",
    "deleteCredential",
    "clearAllCreds",
    "sendRequest",
    "loadRequestHistory",
    "clearRequestHistory",
    "setHistoryLimit",
    "buildCurl",
    "getApiBaseUrlFromSpec",
    "loadJson",
    "getRoutes",
    "getAllSpecUrls",
    "saveSpecUrl",
    "deleteSpecUrl",
    "getLastSelectedSpecUrl",
    "saveLastSelectedSpecUrl",
    "getPinnedRoutes",
    "togglePin",
    "generateCode",
];

/// Commands that may legitimately run far longer than a round-trip.
pub const LONG_RUNNING: &[&str] = &["generateCode"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoreAuth {
    pub name: String,
    #[serde(alias = "headerKey")]
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ById {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthHeaderQuery {
    pub credential_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub route: RouteRef,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default, alias = "authId")]
    pub credential_id: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryLimit {
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurlInputData {
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub auth_header: Option<AuthHeader>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildCurl {
    pub route: RouteRef,
    #[serde(default)]
    pub input_data: CurlInputData,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BaseUrlQuery {
    pub spec: Value,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadKind {
    Url,
    File,
    Default,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoadJson {
    #[serde(rename = "type")]
    pub kind: LoadKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesQuery {
    #[serde(default)]
    pub by_tag: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SaveSpecUrl {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSelected {
    pub url_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TogglePin {
    pub method: HttpMethod,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StoreAuth(StoreAuth),
    GetAllCredentials,
    GetCredentialById(ById),
    GetAuthHeader(AuthHeaderQuery),
    DeleteCredential(ById),
    ClearAllCreds,
    SendRequest(Box<SendRequest>),
    LoadRequestHistory,
    ClearRequestHistory,
    SetHistoryLimit(HistoryLimit),
    BuildCurl(Box<BuildCurl>),
    GetApiBaseUrlFromSpec(BaseUrlQuery),
    LoadJson(LoadJson),
    GetRoutes(RoutesQuery),
    GetAllSpecUrls,
    SaveSpecUrl(SaveSpecUrl),
    DeleteSpecUrl(ById),
    GetLastSelectedSpecUrl,
    SaveLastSelectedSpecUrl(LastSelected),
    GetPinnedRoutes,
    TogglePin(TogglePin),
    GenerateCode(Box<CodeGenConfig>),
}

fn payload<T: DeserializeOwned>(command: &str, raw: Value) -> Result<T, CommandError> {
    let raw = if raw.is_null() {
        Value::Object(Default::default())
    } else {
        raw
    };
    serde_json::from_value(raw).map_err(|err| {
        CommandError::invalid_params(format!("Invalid payload for {}: {}", command, err))
            .with_details(serde_json::json!({"command": command}))
    })
}

pub fn is_known(name: &str) -> bool {
    COMMANDS.contains(&name)
}

pub fn unknown_command_error(name: &str) -> CommandError {
    let suggestions = suggest(name, COMMANDS, 3);
    let mut err = CommandError::invalid_params(format!("Unknown command: {}", name));
    if !suggestions.is_empty() {
        err = err.with_hint(format!("Did you mean: {}?", suggestions.join(", ")));
    }
    err.with_details(serde_json::json!({"did_you_mean": suggestions}))
}

impl Command {
    pub fn parse(name: &str, raw: Value) -> Result<Self, CommandError> {
        let command = match name {
            "storeAuth" => Command::StoreAuth(payload(name, raw)?),
            "getAllCredentials" => Command::GetAllCredentials,
            "getCredentialById" => Command::GetCredentialById(payload(name, raw)?),
            "getAuthHeader" => Command::GetAuthHeader(payload(name, raw)?),
            "deleteCredential" => Command::DeleteCredential(payload(name, raw)?),
            "clearAllCreds" => Command::ClearAllCreds,
            "sendRequest" => Command::SendRequest(Box::new(payload(name, raw)?)),
            "loadRequestHistory" => Command::LoadRequestHistory,
            "clearRequestHistory" => Command::ClearRequestHistory,
            "setHistoryLimit" => Command::SetHistoryLimit(payload(name, raw)?),
            "buildCurl" => Command::BuildCurl(Box::new(payload(name, raw)?)),
            "getApiBaseUrlFromSpec" => Command::GetApiBaseUrlFromSpec(payload(name, raw)?),
            "loadJson" => Command::LoadJson(payload(name, raw)?),
            "getRoutes" => Command::GetRoutes(payload(name, raw)?),
            "getAllSpecUrls" => Command::GetAllSpecUrls,
            "saveSpecUrl" => Command::SaveSpecUrl(payload(name, raw)?),
            "deleteSpecUrl" => Command::DeleteSpecUrl(payload(name, raw)?),
            "getLastSelectedSpecUrl" => Command::GetLastSelectedSpecUrl,
            "saveLastSelectedSpecUrl" => Command::SaveLastSelectedSpecUrl(payload(name, raw)?),
            "getPinnedRoutes" => Command::GetPinnedRoutes,
            "togglePin" => Command::TogglePin(payload(name, raw)?),
            "generateCode" => Command::GenerateCode(Box::new(payload(name, raw)?)),
            _ => return Err(unknown_command_error(name)),
        };
        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::StoreAuth(_) => "storeAuth",
            Command::GetAllCredentials => "getAllCredentials",
            Command::GetCredentialById(_) => "getCredentialById",
            Command::GetAuthHeader(_) => "getAuthHeader",
            Command::DeleteCredential(_) => "deleteCredential",
            Command::ClearAllCreds => "clearAllCreds",
            Command::SendRequest(_) => "sendRequest",
            Command::LoadRequestHistory => "loadRequestHistory",
            Command::ClearRequestHistory => "clearRequestHistory",
            Command::SetHistoryLimit(_) => "setHistoryLimit",
            Command::BuildCurl(_) => "buildCurl",
            Command::GetApiBaseUrlFromSpec(_) => "getApiBaseUrlFromSpec",
            Command::LoadJson(_) => "loadJson",
            Command::GetRoutes(_) => "getRoutes",
            Command::GetAllSpecUrls => "getAllSpecUrls",
            Command::SaveSpecUrl(_) => "saveSpecUrl",
            Command::DeleteSpecUrl(_) => "deleteSpecUrl",
            Command::GetLastSelectedSpecUrl => "getLastSelectedSpecUrl",
            Command::SaveLastSelectedSpecUrl(_) => "saveLastSelectedSpecUrl",
            Command::GetPinnedRoutes => "getPinnedRoutes",
            Command::TogglePin(_) => "togglePin",
            Command::GenerateCode(_) => "generateCode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_listed_command_parses_with_a_minimal_payload() {
        let route = json!({"method": "get", "path": "/p", "details": {"summary": "", "responses": {}}});
        let samples: BTreeMap<&str, Value> = [
            ("storeAuth", json!({"name": "n", "key": "Authorization", "value": "v"})),
            ("getCredentialById", json!({"id": "x"})),
            ("getAuthHeader", json!({"credentialId": "x"})),
            ("deleteCredential", json!({"id": "x"})),
            ("sendRequest", json!({"route": route})),
            ("setHistoryLimit", json!({"limit": 5})),
            ("buildCurl", json!({"route": route})),
            ("getApiBaseUrlFromSpec", json!({"spec": {}, "url": "http://h"})),
            ("loadJson", json!({"type": "default"})),
            ("saveSpecUrl", json!({"name": "n", "url": "http://h"})),
            ("deleteSpecUrl", json!({"id": "x"})),
            ("saveLastSelectedSpecUrl", json!({"urlId": "spec_1"})),
            ("togglePin", json!({"method": "GET", "path": "/p"})),
            (
                "generateCode",
                json!({"generator": "openapi-typescript-codegen", "language": "ts", "input": "a", "output": "b", "client": "fetch"}),
            ),
        ]
        .into_iter()
        .collect();
        for name in COMMANDS {
            let raw = samples.get(name).cloned().unwrap_or(Value::Null);
            let parsed = Command::parse(name, raw).unwrap_or_else(|err| panic!("{}: {}", name, err));
            assert_eq!(parsed.name(), *name);
        }
    }

    #[test]
    fn missing_field_names_command_and_field() {
        let err = Command::parse("getCredentialById", Value::Null).unwrap_err();
        assert!(err.message.contains("getCredentialById"));
        assert!(err.message.contains("id"));
    }

    #[test]
    fn unknown_command_suggests_neighbours() {
        let err = Command::parse("sendRequets", Value::Null).unwrap_err();
        assert!(err.message.contains("Unknown command"));
        assert_eq!(err.hint.as_deref(), Some("Did you mean: sendRequest?"));
    }
}
