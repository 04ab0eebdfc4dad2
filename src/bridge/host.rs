use crate::app::App;
use crate::bridge::commands::{self, Command};
use crate::bridge::protocol::{Envelope, Reply};
use crate::errors::CommandError;
use crate::models::NewCredential;
use crate::services::base_url;
use crate::services::credentials::CredentialService;
use crate::services::dispatcher::DispatchRequest;
use crate::services::logger::Logger;
use crate::services::spec_loader::{self, SpecSource};
use crate::utils::curl::{build_curl, CurlInput};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;

fn to_data<T: Serialize>(value: T) -> Result<Value, CommandError> {
    serde_json::to_value(value)
        .map_err(|err| CommandError::internal(format!("Failed to encode reply: {}", err)))
}

/// Privileged side of the bridge: one reply per inbound message.
#[derive(Clone)]
pub struct Host {
    app: Arc<App>,
    logger: Logger,
}

impl Host {
    pub fn new(app: Arc<App>) -> Self {
        let logger = app.logger.child("bridge");
        Self { app, logger }
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    pub async fn handle_line(&self, line: &str) -> Reply {
        let parsed: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(_) => return Reply::error("Parse error"),
        };
        let request_id = parsed
            .get("requestId")
            .and_then(Value::as_str)
            .map(String::from);
        match serde_json::from_value::<Envelope>(parsed) {
            Ok(envelope) => self.handle_envelope(envelope).await,
            Err(err) => {
                let message = format!("Invalid message: {}", err);
                match request_id {
                    Some(id) => Reply::response(id, Err(message)),
                    None => Reply::error(message),
                }
            }
        }
    }

    pub async fn handle_envelope(&self, envelope: Envelope) -> Reply {
        let Envelope {
            command,
            request_id,
            payload,
        } = envelope;

        if !commands::is_known(&command) {
            let err = commands::unknown_command_error(&command);
            self.logger.warn(
                "unknown command",
                Some(&serde_json::json!({"command": command, "request_id": request_id})),
            );
            return match request_id {
                Some(id) => Reply::response(id, Err(err.to_reply_text())),
                None => Reply::error(err.to_reply_text()),
            };
        }

        // A panicking handler still yields a reply.
        let host = self.clone();
        let name = command.clone();
        let outcome = match tokio::spawn(async move { host.execute_raw(&name, payload).await }).await {
            Ok(result) => result,
            Err(join_err) => Err(CommandError::internal(format!(
                "{} handler failed: {}",
                command, join_err
            ))),
        };

        let outcome = outcome.map_err(|err| {
            self.logger.warn(
                "command failed",
                Some(&serde_json::json!({"command": command, "code": err.code, "error": err.message})),
            );
            err.to_reply_text()
        });
        match request_id {
            Some(id) => Reply::response(id, outcome),
            None => Reply::legacy(&command, outcome),
        }
    }

    async fn execute_raw(&self, name: &str, payload: Value) -> Result<Value, CommandError> {
        let command = Command::parse(name, payload)?;
        self.logger
            .debug("executing", Some(&serde_json::json!({"command": command.name()})));
        self.execute(command).await
    }

    fn default_base_url(&self) -> Result<String, CommandError> {
        let cached = self.app.spec_loader.cached()?;
        let spec_url = cached
            .as_ref()
            .and_then(|doc| doc.get("path"))
            .and_then(|v| v.as_str())
            .map(String::from);
        base_url::resolve_strict(cached.as_ref(), spec_url.as_deref())
    }

    pub async fn execute(&self, command: Command) -> Result<Value, CommandError> {
        let app = &self.app;
        match command {
            Command::StoreAuth(p) => {
                let id = app
                    .credentials
                    .store(
                        NewCredential {
                            name: p.name,
                            header_key: p.key,
                            description: p.description,
                        },
                        &p.value,
                    )
                    .await?;
                Ok(serde_json::json!({"success": true, "authId": id}))
            }
            Command::GetAllCredentials => to_data(app.credentials.list()?),
            Command::GetCredentialById(p) => to_data(app.credentials.get(&p.id).await?),
            Command::GetAuthHeader(p) => to_data(app.credentials.auth_header(&p.credential_id).await?),
            Command::DeleteCredential(p) => to_data(app.credentials.delete(&p.id).await?),
            Command::ClearAllCreds => to_data(app.credentials.clear_all().await?),
            Command::SendRequest(p) => {
                let base_url = match p.base_url.filter(|b| !b.trim().is_empty()) {
                    Some(base) => base,
                    None => self.default_base_url()?,
                };
                let record = app
                    .dispatcher
                    .dispatch(DispatchRequest {
                        route: p.route,
                        params: p.params,
                        headers: p.headers,
                        body: p.body,
                        credential_id: p.credential_id,
                        base_url,
                    })
                    .await?;
                to_data(record)
            }
            Command::LoadRequestHistory => to_data(app.history.list()?),
            Command::ClearRequestHistory => {
                app.history.clear()?;
                Ok(serde_json::json!({"success": true}))
            }
            Command::SetHistoryLimit(p) => {
                app.history.set_limit(p.limit)?;
                Ok(serde_json::json!({"success": true, "limit": p.limit}))
            }
            Command::BuildCurl(p) => {
                let base_url = match p.base_url.filter(|b| !b.trim().is_empty()) {
                    Some(base) => base,
                    None => self.default_base_url()?,
                };
                let input = CurlInput {
                    params: p.input_data.params,
                    body: p.input_data.body,
                    auth_header: p.input_data.auth_header,
                };
                Ok(serde_json::json!({"curl": build_curl(&p.route, &input, &base_url)}))
            }
            Command::GetApiBaseUrlFromSpec(p) => {
                Ok(serde_json::json!({"url": base_url::resolve(&p.spec, &p.url)}))
            }
            Command::LoadJson(p) => {
                use crate::bridge::commands::LoadKind;
                let source = match p.kind {
                    LoadKind::Url => SpecSource::Url(p.url.ok_or_else(|| {
                        CommandError::invalid_params("loadJson with type url requires url")
                    })?),
                    LoadKind::File => SpecSource::File {
                        content: p.content.ok_or_else(|| {
                            CommandError::invalid_params("loadJson with type file requires content")
                        })?,
                        path: p.path,
                    },
                    LoadKind::Default => SpecSource::Default,
                };
                app.spec_loader.load(source).await
            }
            Command::GetRoutes(p) => {
                let doc = app.spec_loader.load(SpecSource::Default).await?;
                if p.by_tag {
                    to_data(spec_loader::group_routes_by_tag(&doc))
                } else {
                    to_data(spec_loader::flatten_routes(&doc))
                }
            }
            Command::GetAllSpecUrls => to_data(app.spec_urls.list()?),
            Command::SaveSpecUrl(p) => to_data(app.spec_urls.save(&p.name, &p.url)?),
            Command::DeleteSpecUrl(p) => to_data(app.spec_urls.delete(&p.id)?),
            Command::GetLastSelectedSpecUrl => to_data(app.spec_urls.last_selected()?),
            Command::SaveLastSelectedSpecUrl(p) => {
                app.spec_urls.set_last_selected(&p.url_id)?;
                Ok(serde_json::json!({"success": true}))
            }
            Command::GetPinnedRoutes => to_data(app.pins.list()?),
            Command::TogglePin(p) => {
                let pinned = app.pins.toggle(p.method, &p.path)?;
                Ok(serde_json::json!({"pinned": pinned, "pins": app.pins.list()?}))
            }
            Command::GenerateCode(config) => to_data(app.codegen.generate(&config).await?),
        }
    }

    /// Serves newline-delimited JSON until the reader is exhausted. Each
    /// message runs on its own task; a single writer task emits replies.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> Result<(), CommandError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let outcome = self.app.panel.open_or_reveal(None)?;
        self.logger.info(
            "bridge session started",
            Some(&serde_json::json!({"panel": outcome})),
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<Reply>();
        let writer_logger = self.logger.clone();
        let writer_task = tokio::spawn(async move {
            let mut writer = BufWriter::new(writer);
            while let Some(reply) = rx.recv().await {
                let payload = match serde_json::to_string(&reply) {
                    Ok(text) => text,
                    Err(err) => {
                        writer_logger.error(
                            "failed to encode reply",
                            Some(&serde_json::json!({"error": err.to_string()})),
                        );
                        continue;
                    }
                };
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        // Raw bytes: a line that is not UTF-8 is answered with a parse error.
        let mut reader = BufReader::new(reader);
        let read_outcome = loop {
            let mut raw = Vec::new();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break Ok(()),
                Ok(_) => {}
                Err(err) => break Err(err),
            }
            let line = match String::from_utf8(raw) {
                Ok(text) => text,
                Err(err) => {
                    self.logger.warn(
                        "line is not valid UTF-8",
                        Some(&serde_json::json!({"error": err.utf8_error().to_string()})),
                    );
                    let _ = tx.send(Reply::error("Parse error"));
                    continue;
                }
            };
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                continue;
            }
            let host = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let reply = host.handle_line(&trimmed).await;
                let _ = tx.send(reply);
            });
        };
        drop(tx);

        let written = writer_task
            .await
            .map_err(|err| CommandError::internal(format!("Reply writer failed: {}", err)))?;
        self.app.panel.dispose()?;
        self.logger.info("bridge session closed", None);
        read_outcome?;
        written.map_err(CommandError::from)
    }

    pub async fn run_stdio(&self) -> Result<(), CommandError> {
        self.run(tokio::io::stdin(), tokio::io::stdout()).await
    }
}
