//! Session token persistence and the unauthorized-response guard.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use huddle_config::{RunMode, SessionConfig};
use huddle_rowstore::StoreError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::ChatResult;

pub const TOKEN_COOKIE: &str = "token";
pub const LOGIN_ROUTE: &str = "/login";

/// The auth token as it would be stored in a browser cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    /// Unset for a session that ends with the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionCookie {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            name: TOKEN_COOKIE.to_string(),
            value: token.into(),
            path: "/".to_string(),
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Stores the session cookie as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
    remember_days: u32,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>, remember_days: u32) -> Self {
        Self {
            path: path.into(),
            remember_days,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.token_path.clone(), config.remember_days)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Builds the cookie for a fresh login. Only "remember me" sets an
    /// expiry.
    pub fn issue(&self, token: impl Into<String>, remember: bool, now: DateTime<Utc>) -> SessionCookie {
        let expires_at = remember.then(|| now + Duration::days(i64::from(self.remember_days)));
        SessionCookie::new(token, expires_at)
    }

    /// The stored cookie. A missing or expired cookie reads as `None`.
    pub fn load(&self) -> ChatResult<Option<SessionCookie>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let cookie: SessionCookie = serde_json::from_str(&contents)?;
        if cookie.is_expired(Utc::now()) {
            debug!(path = %self.path.display(), "Stored session has expired");
            return Ok(None);
        }
        Ok(Some(cookie))
    }

    pub fn token(&self) -> ChatResult<Option<String>> {
        Ok(self.load()?.map(|cookie| cookie.value))
    }

    pub fn save(&self, cookie: &SessionCookie) -> ChatResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(cookie)?)?;
        debug!(path = %self.path.display(), "Session saved");
        Ok(())
    }

    pub fn clear(&self) -> ChatResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Session cleared");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Decides whether a failed store call sends the user back to the login
/// route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginGuard {
    mode: RunMode,
}

impl LoginGuard {
    pub fn new(mode: RunMode) -> Self {
        Self { mode }
    }

    /// `Some("/login")` for a 401 in production when not already there.
    pub fn redirect_for(&self, error: &StoreError, current_route: &str) -> Option<&'static str> {
        let on_login = current_route.trim_end_matches('/') == LOGIN_ROUTE;
        (error.is_unauthorized() && self.mode.is_production() && !on_login).then_some(LOGIN_ROUTE)
    }
}
