use std::sync::Arc;

use huddle_config::AppConfig;
use huddle_rowstore::{RowStore, RowStoreClient, StoreResult};
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn RowStore>,
    participant_role_id: Option<String>,
}

impl AppState {
    pub fn new(store: Arc<dyn RowStore>, participant_role_id: Option<String>) -> Self {
        Self {
            store,
            participant_role_id: participant_role_id.filter(|id| !id.trim().is_empty()),
        }
    }

    /// Builds the state from configuration, with a store client carrying the
    /// service API key.
    pub fn from_config(config: &AppConfig) -> StoreResult<Self> {
        let mut client = RowStoreClient::new(&config.backend)?;
        match config.backend.api_key.as_deref() {
            Some(key) if !key.is_empty() => client = client.with_api_key(key),
            _ => warn!("no backend API key configured; registrations will be rejected upstream"),
        }
        if config.backend.participant_role_id.is_none() {
            warn!("no participant role configured; /api/register will answer 503");
        }

        Ok(Self::new(
            Arc::new(client),
            config.backend.participant_role_id.clone(),
        ))
    }

    pub fn store(&self) -> &dyn RowStore {
        self.store.as_ref()
    }

    pub fn participant_role_id(&self) -> Option<&str> {
        self.participant_role_id.as_deref()
    }
}
