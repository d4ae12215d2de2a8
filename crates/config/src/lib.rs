use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "huddle.toml",
    "config/huddle.toml",
    "crates/config/huddle.toml",
    "../huddle.toml",
    "../config/huddle.toml",
];

/// Lower bound for the message poll period.
pub const MIN_POLL_INTERVAL_MS: u64 = 2_000;
/// Upper bound for the message poll period.
pub const MAX_POLL_INTERVAL_MS: u64 = 5_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Build flavour. Only production builds redirect to the login page on 401.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Development,
    Production,
}

impl RunMode {
    pub fn is_production(self) -> bool {
        matches!(self, RunMode::Production)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

impl HttpConfig {
    /// Base URL the client uses to reach the registration gateway.
    pub fn public_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Connection settings for the hosted row store.
///
/// ```
/// use huddle_config::BackendConfig;
///
/// let backend = BackendConfig::default();
/// assert_eq!(backend.request_timeout_seconds, 30);
/// assert!(backend.api_key.is_none());
/// assert!(backend.participant_role_id.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "BackendConfig::default_base_url")]
    pub base_url: String,
    /// Service key sent as `x-api-key` by the register route only.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Role attached to every member created through registration.
    #[serde(default)]
    pub participant_role_id: Option<String>,
    #[serde(default = "BackendConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl BackendConfig {
    fn default_base_url() -> String {
        "http://localhost:8080/api/project".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            api_key: None,
            participant_role_id: None,
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "FeedConfig::default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "FeedConfig::default_page_size")]
    pub page_size: u32,
}

impl FeedConfig {
    const fn default_poll_interval() -> u64 {
        5_000
    }

    const fn default_page_size() -> u32 {
        10
    }

    /// Poll period clamped to the 2-5 second window.
    ///
    /// ```
    /// use huddle_config::FeedConfig;
    ///
    /// let mut feed = FeedConfig::default();
    /// feed.poll_interval_ms = 100;
    /// assert_eq!(feed.poll_interval().as_millis(), 2_000);
    /// ```
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
        )
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::default_poll_interval(),
            page_size: Self::default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "SessionConfig::default_token_path")]
    pub token_path: PathBuf,
    /// Lifetime of the token cookie when "remember me" is checked.
    #[serde(default = "SessionConfig::default_remember_days")]
    pub remember_days: u32,
}

impl SessionConfig {
    fn default_token_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("huddle").join("session.json"))
            .unwrap_or_else(|| PathBuf::from(".huddle-session.json"))
    }

    const fn default_remember_days() -> u32 {
        30
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_path: Self::default_token_path(),
            remember_days: Self::default_remember_days(),
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use huddle_config::load;
///
/// std::env::remove_var("HUDDLE_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("mode", "development")
        .context("invalid default for mode")?
        .set_default("http.address", defaults.http.address.clone())
        .context("invalid default for http.address")?
        .set_default("http.port", i64::from(defaults.http.port))
        .context("invalid default for http.port")?
        .set_default("backend.base_url", defaults.backend.base_url.clone())
        .context("invalid default for backend.base_url")?
        .set_default(
            "feed.poll_interval_ms",
            i64::try_from(defaults.feed.poll_interval_ms).unwrap_or(i64::MAX),
        )
        .context("invalid default for feed.poll_interval_ms")?
        .set_default("feed.page_size", i64::from(defaults.feed.page_size))
        .context("invalid default for feed.page_size")?;

    let environment_overrides = config::Environment::with_prefix("HUDDLE").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("HUDDLE_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via HUDDLE_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.backend.api_key.is_none() {
        config.backend.api_key = std::env::var("PROJECT_API_KEY").ok();
    }
    if config.backend.participant_role_id.is_none() {
        config.backend.participant_role_id = std::env::var("PARTICIPANT_ROLE_ID").ok();
    }

    if config.feed.page_size == 0 {
        config.feed.page_size = defaults.feed.page_size;
    }

    debug!(mode = ?config.mode, base_url = %config.backend.base_url, "loaded client configuration");
    Ok(config)
}
