use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use huddle_chats::{
    FeedSettings, FileSessionStore, LoginGuard, MemberDirectory, RegisterClient,
};
use huddle_config::AppConfig;
use huddle_rowstore::{RowStore, RowStoreClient, StoreError};
use tracing::{info, warn};

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Everything a client command needs, wired from configuration.
#[derive(Clone)]
pub struct ClientServices {
    pub client: Arc<RowStoreClient>,
    pub store: Arc<dyn RowStore>,
    pub sessions: FileSessionStore,
    pub directory: MemberDirectory,
    pub feed_settings: FeedSettings,
    gateway_url: String,
    request_timeout: std::time::Duration,
    redirected: Arc<AtomicBool>,
}

impl ClientServices {
    /// Builds the store client with the saved session token. `route` is the
    /// page the command stands for; a 401 seen from anywhere but the login
    /// page in production clears the saved session.
    pub fn initialise(config: &AppConfig, route: &str) -> Result<Self> {
        let sessions = FileSessionStore::from_config(&config.session);
        let token = sessions
            .token()
            .with_context(|| format!("failed to read session from {}", sessions.path().display()))?;

        let guard = LoginGuard::new(config.mode);
        let redirected = Arc::new(AtomicBool::new(false));
        let hook = {
            let sessions = sessions.clone();
            let redirected = redirected.clone();
            let route = route.to_string();
            Arc::new(move |error: &StoreError| {
                let Some(target) = guard.redirect_for(error, &route) else {
                    return;
                };
                redirected.store(true, Ordering::SeqCst);
                warn!(redirect = target, "session rejected by backend");
                if let Err(error) = sessions.clear() {
                    warn!(error = %error, "failed to clear rejected session");
                }
            })
        };

        let client = Arc::new(
            RowStoreClient::new(&config.backend)
                .context("failed to build backend client")?
                .with_token(token)
                .with_error_hook(hook),
        );
        let store: Arc<dyn RowStore> = client.clone();

        info!(
            backend = %client.base_url(),
            mode = ?config.mode,
            signed_in = client.token().is_some(),
            "client services ready"
        );

        Ok(Self {
            directory: MemberDirectory::new(store.clone()),
            client,
            store,
            sessions,
            feed_settings: FeedSettings::from_config(&config.feed),
            gateway_url: config.http.public_url(),
            request_timeout: config.backend.request_timeout(),
            redirected,
        })
    }

    /// True once a rejected session sent the user back to the login page.
    pub fn redirected_to_login(&self) -> bool {
        self.redirected.load(Ordering::SeqCst)
    }

    pub fn registrar(&self) -> Result<RegisterClient> {
        RegisterClient::new(&self.gateway_url, self.request_timeout)
            .context("failed to build registration client")
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
