use crate::constants::keys::CREDENTIALS;
use crate::errors::CommandError;
use crate::models::{AuthHeader, Credential, NewCredential, StoredCredential};
use crate::services::logger::Logger;
use crate::services::secret_store::SecretStore;
use crate::services::state::StateService;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

fn secret_key(id: &str) -> String {
    format!("auth.{}", id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDeletion {
    pub id: String,
    pub error: String,
}

/// Outcome of clearing every credential: one entry per attempted deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    pub success: bool,
    pub removed: Vec<String>,
    pub failed: Vec<FailedDeletion>,
}

#[derive(Clone)]
pub struct CredentialService {
    logger: Logger,
    state: Arc<StateService>,
    secrets: Arc<dyn SecretStore>,
}

impl CredentialService {
    pub fn new(logger: Logger, state: Arc<StateService>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            logger: logger.child("credentials"),
            state,
            secrets,
        }
    }

    fn metadata(&self) -> Result<Vec<Credential>, CommandError> {
        self.state.get_or_default(CREDENTIALS)
    }

    pub async fn store(&self, credential: NewCredential, secret_value: &str) -> Result<String, CommandError> {
        let name = credential.name.trim();
        let header_key = credential.header_key.trim();
        if name.is_empty() {
            return Err(CommandError::invalid_params("Credential name must be a non-empty string"));
        }
        if header_key.is_empty() {
            return Err(CommandError::invalid_params("Credential header key must be a non-empty string")
                .with_hint("Use the HTTP header the API expects, for example \"Authorization\" or \"X-API-Key\""));
        }
        if secret_value.is_empty() {
            return Err(CommandError::invalid_params("Credential value must be a non-empty string"));
        }

        let metadata = Credential {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            header_key: header_key.to_string(),
            description: credential
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            created_at: chrono::Utc::now(),
            last_used: None,
        };

        self.secrets.set(&secret_key(&metadata.id), secret_value).await?;
        let appended = self.state.update(CREDENTIALS, |all: &mut Vec<Credential>| {
            all.push(metadata.clone())
        });
        if let Err(err) = appended {
            if let Err(rollback) = self.secrets.delete(&secret_key(&metadata.id)).await {
                self.logger.warn(
                    "orphaned secret after failed metadata write",
                    Some(&serde_json::json!({"id": metadata.id, "error": rollback.message})),
                );
            }
            return Err(err);
        }

        self.logger.info(
            "credential stored",
            Some(&serde_json::json!({"id": metadata.id, "name": metadata.name})),
        );
        Ok(metadata.id)
    }

    pub async fn get(&self, id: &str) -> Result<Option<StoredCredential>, CommandError> {
        let Some(mut metadata) = self.metadata()?.into_iter().find(|c| c.id == id) else {
            return Ok(None);
        };
        let Some(secret_value) = self.secrets.get(&secret_key(id)).await? else {
            self.logger.warn(
                "credential metadata has no stored secret",
                Some(&serde_json::json!({"id": id})),
            );
            return Ok(None);
        };

        let now = chrono::Utc::now();
        self.state.update(CREDENTIALS, |all: &mut Vec<Credential>| {
            if let Some(entry) = all.iter_mut().find(|c| c.id == id) {
                entry.last_used = Some(now);
            }
        })?;
        metadata.last_used = Some(now);

        Ok(Some(StoredCredential {
            metadata,
            secret_value,
        }))
    }

    pub fn list(&self) -> Result<Vec<Credential>, CommandError> {
        self.metadata()
    }

    /// Secret first, then metadata: a failed secret removal leaves the
    /// credential fully intact.
    pub async fn delete(&self, id: &str) -> Result<bool, CommandError> {
        if !self.metadata()?.iter().any(|c| c.id == id) {
            return Ok(false);
        }
        self.secrets.delete(&secret_key(id)).await?;
        self.state.update(CREDENTIALS, |all: &mut Vec<Credential>| {
            all.retain(|c| c.id != id)
        })?;
        self.logger.info("credential deleted", Some(&serde_json::json!({"id": id})));
        Ok(true)
    }

    pub async fn clear_all(&self) -> Result<ClearReport, CommandError> {
        let ids: Vec<String> = self.metadata()?.into_iter().map(|c| c.id).collect();
        let mut removed = Vec::new();
        let mut failed = Vec::new();
        for id in ids {
            match self.delete(&id).await {
                Ok(_) => removed.push(id),
                Err(err) => failed.push(FailedDeletion {
                    id,
                    error: err.message,
                }),
            }
        }
        if !failed.is_empty() {
            self.logger.warn(
                "some credentials could not be cleared",
                Some(&serde_json::json!({"failed": failed.len(), "removed": removed.len()})),
            );
        }
        Ok(ClearReport {
            success: failed.is_empty(),
            removed,
            failed,
        })
    }

    pub fn format_as_header(stored: &StoredCredential) -> BTreeMap<String, String> {
        BTreeMap::from([(
            stored.metadata.header_key.clone(),
            stored.secret_value.clone(),
        )])
    }

    pub async fn auth_header(&self, id: &str) -> Result<Option<AuthHeader>, CommandError> {
        Ok(self.get(id).await?.map(|stored| AuthHeader {
            key: stored.metadata.header_key,
            value: stored.secret_value,
        }))
    }
}
