use crate::constants::keys::{LAST_SELECTED_SPEC_URL, SPEC_URLS};
use crate::errors::CommandError;
use crate::models::SpecUrl;
use crate::services::state::StateService;
use std::sync::Arc;

/// Saved spec locations (global) and the last one opened (workspace).
#[derive(Clone)]
pub struct SpecUrlService {
    global: Arc<StateService>,
    workspace: Arc<StateService>,
}

impl SpecUrlService {
    pub fn new(global: Arc<StateService>, workspace: Arc<StateService>) -> Self {
        Self { global, workspace }
    }

    pub fn list(&self) -> Result<Vec<SpecUrl>, CommandError> {
        self.global.get_or_default(SPEC_URLS)
    }

    pub fn save(&self, name: &str, url: &str) -> Result<SpecUrl, CommandError> {
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() {
            return Err(CommandError::invalid_params("Spec name must be a non-empty string"));
        }
        if url.is_empty() {
            return Err(CommandError::invalid_params("Spec url must be a non-empty string"));
        }
        let entry = SpecUrl {
            id: format!("spec_{}", uuid::Uuid::new_v4().simple()),
            name: name.to_string(),
            url: url.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let saved = entry.clone();
        self.global
            .update(SPEC_URLS, move |urls: &mut Vec<SpecUrl>| urls.push(saved))?;
        Ok(entry)
    }

    pub fn delete(&self, id: &str) -> Result<bool, CommandError> {
        self.global.update(SPEC_URLS, |urls: &mut Vec<SpecUrl>| {
            let before = urls.len();
            urls.retain(|spec| spec.id != id);
            urls.len() != before
        })
    }

    pub fn last_selected(&self) -> Result<Option<String>, CommandError> {
        self.workspace.get(LAST_SELECTED_SPEC_URL)
    }

    pub fn set_last_selected(&self, url_id: &str) -> Result<(), CommandError> {
        self.workspace.set(LAST_SELECTED_SPEC_URL, &url_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SpecUrlService {
        SpecUrlService::new(
            Arc::new(StateService::in_memory()),
            Arc::new(StateService::in_memory()),
        )
    }

    #[test]
    fn save_list_delete() {
        let specs = service();
        let petstore = specs.save("Petstore", "https://petstore3.swagger.io/api/v3/openapi.json").unwrap();
        assert!(petstore.id.starts_with("spec_"));
        specs.save("Local", "http://localhost:3000/openapi.json").unwrap();
        assert_eq!(specs.list().unwrap().len(), 2);

        assert!(specs.delete(&petstore.id).unwrap());
        assert!(!specs.delete(&petstore.id).unwrap());
        assert!(!specs.delete("spec_unknown").unwrap());
        assert_eq!(specs.list().unwrap()[0].name, "Local");
    }

    #[test]
    fn last_selected_round_trip() {
        let specs = service();
        assert_eq!(specs.last_selected().unwrap(), None);
        specs.set_last_selected("spec_abc").unwrap();
        assert_eq!(specs.last_selected().unwrap().as_deref(), Some("spec_abc"));
    }

    #[test]
    fn blank_fields_are_rejected() {
        assert!(service().save(" ", "http://x").is_err());
        assert!(service().save("x", "").is_err());
    }
}
