use crate::constants::keys::SELECTED_ROUTE;
use crate::errors::CommandError;
use crate::models::RouteRef;
use crate::services::cipher::SecretCipher;
use crate::services::codegen::{CodeGenerator, ProcessCodeGenerator};
use crate::services::credentials::CredentialService;
use crate::services::dispatcher::RequestDispatcher;
use crate::services::history::HistoryService;
use crate::services::logger::Logger;
use crate::services::pins::PinService;
use crate::services::secret_store::{EncryptedFileSecretStore, MemorySecretStore, SecretStore};
use crate::services::spec_loader::SpecLoader;
use crate::services::spec_urls::SpecUrlService;
use crate::services::state::StateService;
use crate::utils::paths::StatePaths;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelOutcome {
    Created,
    Revealed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    pub id: String,
    pub route: Option<RouteRef>,
    pub opened_at: String,
}

/// The single active panel. Opening while one exists reveals it instead.
pub struct PanelSlot {
    active: Mutex<Option<Panel>>,
    workspace: Arc<StateService>,
}

impl PanelSlot {
    pub fn new(workspace: Arc<StateService>) -> Self {
        Self {
            active: Mutex::new(None),
            workspace,
        }
    }

    pub fn open_or_reveal(&self, route: Option<RouteRef>) -> Result<PanelOutcome, CommandError> {
        if let Some(route) = route.as_ref() {
            self.workspace.set(SELECTED_ROUTE, route)?;
        }
        let mut guard = self
            .active
            .lock()
            .map_err(|_| CommandError::internal("Panel slot lock poisoned"))?;
        match guard.as_mut() {
            Some(panel) => {
                if route.is_some() {
                    panel.route = route;
                }
                Ok(PanelOutcome::Revealed)
            }
            None => {
                let route = match route {
                    Some(route) => Some(route),
                    None => self.workspace.get::<RouteRef>(SELECTED_ROUTE).ok().flatten(),
                };
                *guard = Some(Panel {
                    id: uuid::Uuid::new_v4().to_string(),
                    route,
                    opened_at: chrono::Utc::now().to_rfc3339(),
                });
                Ok(PanelOutcome::Created)
            }
        }
    }

    pub fn active(&self) -> Option<Panel> {
        self.active.lock().ok().and_then(|guard| guard.clone())
    }

    /// Returns whether a panel was open.
    pub fn dispose(&self) -> Result<bool, CommandError> {
        let previous = self
            .active
            .lock()
            .map_err(|_| CommandError::internal("Panel slot lock poisoned"))?
            .take();
        self.workspace.unset(SELECTED_ROUTE)?;
        Ok(previous.is_some())
    }
}

pub struct App {
    pub logger: Logger,
    pub global: Arc<StateService>,
    pub workspace: Arc<StateService>,
    pub credentials: Arc<CredentialService>,
    pub history: HistoryService,
    pub dispatcher: RequestDispatcher,
    pub spec_loader: SpecLoader,
    pub spec_urls: SpecUrlService,
    pub pins: PinService,
    pub codegen: Arc<dyn CodeGenerator>,
    pub panel: PanelSlot,
}

impl App {
    fn assemble(
        logger: Logger,
        global: Arc<StateService>,
        workspace: Arc<StateService>,
        secrets: Arc<dyn SecretStore>,
        workspace_root: PathBuf,
    ) -> Self {
        let credentials = Arc::new(CredentialService::new(logger.clone(), global.clone(), secrets));
        let history = HistoryService::new(logger.clone(), global.clone());
        let dispatcher = RequestDispatcher::new(logger.clone(), credentials.clone(), history.clone());
        Self {
            spec_loader: SpecLoader::new(logger.clone(), workspace.clone()),
            spec_urls: SpecUrlService::new(global.clone(), workspace.clone()),
            pins: PinService::new(workspace.clone()),
            codegen: Arc::new(ProcessCodeGenerator::new(logger.clone(), workspace_root)),
            panel: PanelSlot::new(workspace.clone()),
            logger,
            global,
            workspace,
            credentials,
            history,
            dispatcher,
        }
    }

    pub fn initialize(
        logger: Logger,
        paths: &StatePaths,
        workspace_root: PathBuf,
    ) -> Result<Self, CommandError> {
        let global = Arc::new(StateService::open(&paths.global_state)?);
        let workspace = Arc::new(StateService::open(&paths.workspace_state)?);
        let cipher = SecretCipher::load(&paths.key)?;
        let secrets: Arc<dyn SecretStore> =
            Arc::new(EncryptedFileSecretStore::open(&paths.secrets, cipher)?);
        logger.info(
            "state loaded",
            Some(&serde_json::json!({
                "global_state": paths.global_state.display().to_string(),
                "workspace_state": paths.workspace_state.display().to_string(),
            })),
        );
        Ok(Self::assemble(logger, global, workspace, secrets, workspace_root))
    }

    /// Nothing touches disk; for tests and throwaway sessions.
    pub fn in_memory(logger: Logger) -> Self {
        let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::assemble(
            logger,
            Arc::new(StateService::in_memory()),
            Arc::new(StateService::in_memory()),
            Arc::new(MemorySecretStore::new()),
            root,
        )
    }

    pub fn with_code_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.codegen = generator;
        self
    }
}
