use crate::constants::keys::PINNED_ROUTES;
use crate::errors::CommandError;
use crate::models::{HttpMethod, PinnedRoute};
use crate::services::state::StateService;
use std::sync::Arc;

/// Pinned routes are identified by method and path only.
#[derive(Clone)]
pub struct PinService {
    workspace: Arc<StateService>,
}

impl PinService {
    pub fn new(workspace: Arc<StateService>) -> Self {
        Self { workspace }
    }

    pub fn list(&self) -> Result<Vec<PinnedRoute>, CommandError> {
        self.workspace.get_or_default(PINNED_ROUTES)
    }

    pub fn is_pinned(&self, method: HttpMethod, path: &str) -> Result<bool, CommandError> {
        Ok(self
            .list()?
            .iter()
            .any(|pin| pin.method == method && pin.path == path))
    }

    /// Returns whether the route is pinned after the toggle.
    pub fn toggle(&self, method: HttpMethod, path: &str) -> Result<bool, CommandError> {
        self.workspace
            .update(PINNED_ROUTES, |pins: &mut Vec<PinnedRoute>| {
                let before = pins.len();
                pins.retain(|pin| !(pin.method == method && pin.path == path));
                if pins.len() == before {
                    pins.push(PinnedRoute {
                        method,
                        path: path.to_string(),
                    });
                    true
                } else {
                    false
                }
            })
    }
}
