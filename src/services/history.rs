use crate::constants::history::DEFAULT_LIMIT;
use crate::constants::keys::{HISTORY_LIMIT, REQUEST_HISTORY};
use crate::errors::CommandError;
use crate::models::RequestSnapshot;
use crate::services::logger::Logger;
use crate::services::state::StateService;
use std::sync::Arc;

/// Newest-first, capacity-bounded request history persisted in global state.
#[derive(Clone)]
pub struct HistoryService {
    logger: Logger,
    state: Arc<StateService>,
}

impl HistoryService {
    pub fn new(logger: Logger, state: Arc<StateService>) -> Self {
        Self {
            logger: logger.child("history"),
            state,
        }
    }

    /// Read on every call so a changed limit applies to the next append.
    pub fn limit(&self) -> usize {
        match self.state.get::<usize>(HISTORY_LIMIT) {
            Ok(Some(limit)) if limit > 0 => limit,
            Ok(_) => DEFAULT_LIMIT,
            Err(err) => {
                self.logger.warn(
                    "ignoring malformed history limit",
                    Some(&serde_json::json!({"error": err.message})),
                );
                DEFAULT_LIMIT
            }
        }
    }

    pub fn set_limit(&self, limit: usize) -> Result<(), CommandError> {
        if limit == 0 {
            return Err(CommandError::invalid_params("History limit must be at least 1"));
        }
        self.state.set(HISTORY_LIMIT, &limit)
    }

    pub fn append(&self, snapshot: RequestSnapshot) -> Result<(), CommandError> {
        let limit = self.limit();
        let evicted = self
            .state
            .update(REQUEST_HISTORY, |entries: &mut Vec<RequestSnapshot>| {
                entries.insert(0, snapshot);
                let before = entries.len();
                entries.truncate(limit);
                before - entries.len()
            })?;
        if evicted > 0 {
            self.logger.debug(
                "history trimmed",
                Some(&serde_json::json!({"evicted": evicted, "limit": limit})),
            );
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<RequestSnapshot>, CommandError> {
        self.state.get_or_default(REQUEST_HISTORY)
    }

    pub fn clear(&self) -> Result<(), CommandError> {
        self.state.set(REQUEST_HISTORY, &Vec::<RequestSnapshot>::new())
    }
}
