use crate::bridge::commands::LONG_RUNNING;
use crate::bridge::protocol::{Envelope, Reply};
use crate::constants::network::{TIMEOUT_BRIDGE_CALL_MS, TIMEOUT_BRIDGE_LONG_CALL_MS};
use crate::errors::BridgeError;
use crate::models::{AuthHeader, Credential, PinnedRoute, RequestSnapshot, ResponseRecord, RouteRef, SpecUrl, StoredCredential};
use crate::services::codegen::{CodeGenConfig, CodeGenResult};
use crate::services::credentials::ClearReport;
use crate::services::logger::Logger;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type Settlement = Result<Value, BridgeError>;

struct Pending {
    settle: oneshot::Sender<Settlement>,
    created_at: Instant,
}

/// Renderer side of the bridge: correlates replies to calls by request id.
#[derive(Clone)]
pub struct BridgeClient {
    logger: Logger,
    outbound: mpsc::UnboundedSender<String>,
    pending: Arc<DashMap<String, Pending>>,
}

impl BridgeClient {
    /// `outbound` receives one serialized message per call.
    pub fn new(logger: Logger, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            logger: logger.child("client"),
            outbound,
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Wires a client to a byte transport. The returned task pumps replies
    /// until the reader closes, then fails every call still pending.
    pub fn connect<R, W>(logger: Logger, reader: R, writer: W) -> (Self, JoinHandle<()>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let client = Self::new(logger, tx);

        let writer_logger = client.logger.clone();
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(line) = rx.recv().await {
                let written = async {
                    writer.write_all(line.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await
                }
                .await;
                if let Err(err) = written {
                    writer_logger.error(
                        "bridge write failed",
                        Some(&json!({"error": err.to_string()})),
                    );
                    break;
                }
            }
        });

        let reader_client = client.clone();
        let pump = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => reader_client.handle_incoming(&line),
                    Ok(None) => break,
                    Err(err) => {
                        reader_client.logger.error(
                            "bridge read failed",
                            Some(&json!({"error": err.to_string()})),
                        );
                        break;
                    }
                }
            }
            reader_client.fail_all();
            writer_task.abort();
        });
        (client, pump)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Settles the matching pending call. Replies for unknown or already
    /// settled ids are dropped.
    pub fn handle_incoming(&self, line: &str) {
        let reply: Reply = match serde_json::from_str(line.trim()) {
            Ok(reply) => reply,
            Err(err) => {
                self.logger.warn(
                    "ignoring malformed reply",
                    Some(&json!({"error": err.to_string()})),
                );
                return;
            }
        };
        if !reply.is_response() {
            self.logger.debug(
                "ignoring unsolicited message",
                Some(&json!({"command": reply.command, "error": reply.error})),
            );
            return;
        }
        let Some(request_id) = reply.request_id else {
            return;
        };
        let Some((_, entry)) = self.pending.remove(&request_id) else {
            self.logger.debug(
                "late reply discarded",
                Some(&json!({"request_id": request_id})),
            );
            return;
        };
        let settlement = match reply.error {
            Some(message) => Err(BridgeError::Remote(message)),
            None => Ok(reply.data.unwrap_or(Value::Null)),
        };
        self.logger.debug(
            "call settled",
            Some(&json!({
                "request_id": request_id,
                "elapsed_ms": entry.created_at.elapsed().as_millis() as u64,
            })),
        );
        let _ = entry.settle.send(settlement);
    }

    /// Fails every pending call with `ChannelClosed`.
    pub fn fail_all(&self) {
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, entry)) = self.pending.remove(&id) {
                let _ = entry.settle.send(Err(BridgeError::ChannelClosed));
            }
        }
    }

    fn timeout_for(command: &str) -> Duration {
        if LONG_RUNNING.contains(&command) {
            Duration::from_millis(TIMEOUT_BRIDGE_LONG_CALL_MS)
        } else {
            Duration::from_millis(TIMEOUT_BRIDGE_CALL_MS)
        }
    }

    pub async fn call(&self, command: &str, payload: Value) -> Result<Value, BridgeError> {
        self.call_with_timeout(command, payload, Self::timeout_for(command))
            .await
    }

    pub async fn call_with_timeout(
        &self,
        command: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let message = serde_json::to_string(&Envelope {
            command: command.to_string(),
            request_id: Some(request_id.clone()),
            payload,
        })
        .map_err(BridgeError::Encode)?;

        let (settle, mut settled) = oneshot::channel();
        self.pending.insert(
            request_id.clone(),
            Pending {
                settle,
                created_at: Instant::now(),
            },
        );
        if self.outbound.send(message).is_err() {
            self.pending.remove(&request_id);
            return Err(BridgeError::ChannelClosed);
        }

        match tokio::time::timeout(timeout, &mut settled).await {
            Ok(Ok(settlement)) => settlement,
            Ok(Err(_)) => Err(BridgeError::ChannelClosed),
            Err(_) => {
                if self.pending.remove(&request_id).is_some() {
                    return Err(BridgeError::Timeout {
                        command: command.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                // The reply removed the entry first; its outcome stands.
                settled.await.unwrap_or(Err(BridgeError::ChannelClosed))
            }
        }
    }

    async fn call_as<T: DeserializeOwned>(&self, command: &str, payload: Value) -> Result<T, BridgeError> {
        let data = self.call(command, payload).await?;
        serde_json::from_value(data).map_err(|source| BridgeError::Decode {
            command: command.to_string(),
            source,
        })
    }

    pub async fn store_auth(
        &self,
        name: &str,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> Result<String, BridgeError> {
        let data = self
            .call(
                "storeAuth",
                json!({"name": name, "key": key, "value": value, "description": description}),
            )
            .await?;
        data.get("authId")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| BridgeError::Remote("storeAuth reply has no authId".to_string()))
    }

    pub async fn get_all_credentials(&self) -> Result<Vec<Credential>, BridgeError> {
        self.call_as("getAllCredentials", Value::Null).await
    }

    pub async fn get_credential_by_id(&self, id: &str) -> Result<Option<StoredCredential>, BridgeError> {
        self.call_as("getCredentialById", json!({"id": id})).await
    }

    pub async fn get_auth_header(&self, credential_id: &str) -> Result<Option<AuthHeader>, BridgeError> {
        self.call_as("getAuthHeader", json!({"credentialId": credential_id}))
            .await
    }

    pub async fn delete_credential(&self, id: &str) -> Result<bool, BridgeError> {
        self.call_as("deleteCredential", json!({"id": id})).await
    }

    pub async fn clear_all_creds(&self) -> Result<ClearReport, BridgeError> {
        self.call_as("clearAllCreds", Value::Null).await
    }

    pub async fn send_request(
        &self,
        route: &RouteRef,
        params: &BTreeMap<String, String>,
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
        credential_id: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<ResponseRecord, BridgeError> {
        self.call_as(
            "sendRequest",
            json!({
                "route": route,
                "params": params,
                "headers": headers,
                "body": body,
                "credentialId": credential_id,
                "baseUrl": base_url,
            }),
        )
        .await
    }

    pub async fn load_request_history(&self) -> Result<Vec<RequestSnapshot>, BridgeError> {
        self.call_as("loadRequestHistory", Value::Null).await
    }

    pub async fn clear_request_history(&self) -> Result<(), BridgeError> {
        self.call("clearRequestHistory", Value::Null).await.map(|_| ())
    }

    pub async fn set_history_limit(&self, limit: usize) -> Result<(), BridgeError> {
        self.call("setHistoryLimit", json!({"limit": limit}))
            .await
            .map(|_| ())
    }

    pub async fn build_curl(&self, route: &RouteRef, input_data: Value, base_url: Option<&str>) -> Result<String, BridgeError> {
        let data = self
            .call(
                "buildCurl",
                json!({"route": route, "inputData": input_data, "baseUrl": base_url}),
            )
            .await?;
        data.get("curl")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| BridgeError::Remote("buildCurl reply has no curl".to_string()))
    }

    pub async fn get_api_base_url_from_spec(&self, spec: &Value, url: &str) -> Result<String, BridgeError> {
        let data = self
            .call("getApiBaseUrlFromSpec", json!({"spec": spec, "url": url}))
            .await?;
        Ok(data
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or(url)
            .to_string())
    }

    pub async fn load_json(&self, request: Value) -> Result<Value, BridgeError> {
        self.call("loadJson", request).await
    }

    pub async fn get_routes(&self) -> Result<Vec<RouteRef>, BridgeError> {
        self.call_as("getRoutes", Value::Null).await
    }

    pub async fn get_routes_by_tag(&self) -> Result<BTreeMap<String, Vec<RouteRef>>, BridgeError> {
        self.call_as("getRoutes", json!({"byTag": true})).await
    }

    pub async fn get_all_spec_urls(&self) -> Result<Vec<SpecUrl>, BridgeError> {
        self.call_as("getAllSpecUrls", Value::Null).await
    }

    pub async fn save_spec_url(&self, name: &str, url: &str) -> Result<SpecUrl, BridgeError> {
        self.call_as("saveSpecUrl", json!({"name": name, "url": url}))
            .await
    }

    pub async fn delete_spec_url(&self, id: &str) -> Result<bool, BridgeError> {
        self.call_as("deleteSpecUrl", json!({"id": id})).await
    }

    pub async fn get_last_selected_spec_url(&self) -> Result<Option<String>, BridgeError> {
        self.call_as("getLastSelectedSpecUrl", Value::Null).await
    }

    pub async fn save_last_selected_spec_url(&self, url_id: &str) -> Result<(), BridgeError> {
        self.call("saveLastSelectedSpecUrl", json!({"urlId": url_id}))
            .await
            .map(|_| ())
    }

    pub async fn get_pinned_routes(&self) -> Result<Vec<PinnedRoute>, BridgeError> {
        self.call_as("getPinnedRoutes", Value::Null).await
    }

    /// Returns whether the route is pinned afterwards.
    pub async fn toggle_pin(&self, route: &PinnedRoute) -> Result<bool, BridgeError> {
        let data = self.call("togglePin", json!(route)).await?;
        Ok(data.get("pinned").and_then(|v| v.as_bool()).unwrap_or(false))
    }

    pub async fn generate_code(&self, config: &CodeGenConfig) -> Result<CodeGenResult, BridgeError> {
        let payload = serde_json::to_value(config).map_err(BridgeError::Encode)?;
        self.call_as("generateCode", payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> (BridgeClient, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (BridgeClient::new(Logger::new("test"), tx), rx)
    }

    fn request_id_of(line: &str) -> String {
        let envelope: Envelope = serde_json::from_str(line).unwrap();
        envelope.request_id.unwrap()
    }

    #[tokio::test]
    async fn out_of_order_replies_settle_the_right_calls() {
        let (client, mut rx) = client();
        let first = tokio::spawn({
            let client = client.clone();
            async move { client.call("getAllSpecUrls", Value::Null).await }
        });
        let first_id = request_id_of(&rx.recv().await.unwrap());
        let second = tokio::spawn({
            let client = client.clone();
            async move { client.call("getPinnedRoutes", Value::Null).await }
        });
        let second_id = request_id_of(&rx.recv().await.unwrap());

        client.handle_incoming(&format!(
            r#"{{"command":"response","requestId":"{}","data":"two","error":null}}"#,
            second_id
        ));
        client.handle_incoming(&format!(
            r#"{{"command":"response","requestId":"{}","data":null,"error":"boom"}}"#,
            first_id
        ));

        assert_eq!(second.await.unwrap().unwrap(), json!("two"));
        match first.await.unwrap() {
            Err(BridgeError::Remote(message)) => assert_eq!(message, "boom"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn timeout_then_late_reply_is_a_no_op() {
        let (client, mut rx) = client();
        let err = client
            .call_with_timeout("loadRequestHistory", Value::Null, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(client.pending_count(), 0);

        let id = request_id_of(&rx.recv().await.unwrap());
        client.handle_incoming(&format!(
            r#"{{"command":"response","requestId":"{}","data":[],"error":null}}"#,
            id
        ));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn closed_channel_fails_fast() {
        let (client, rx) = client();
        drop(rx);
        let err = client.call("getAllSpecUrls", Value::Null).await.unwrap_err();
        assert!(matches!(err, BridgeError::ChannelClosed));
    }

    #[test]
    fn long_running_commands_get_the_long_window() {
        assert_eq!(
            BridgeClient::timeout_for("generateCode"),
            Duration::from_millis(TIMEOUT_BRIDGE_LONG_CALL_MS)
        );
        assert_eq!(
            BridgeClient::timeout_for("sendRequest"),
            Duration::from_millis(TIMEOUT_BRIDGE_CALL_MS)
        );
    }
}
