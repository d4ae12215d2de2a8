//! Login and registration.
//!
//! Both forms validate locally first; an invalid form never reaches the
//! network.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use huddle_rowstore::RowStore;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::session::{FileSessionStore, SessionCookie};
use crate::types::{ChatError, ChatResult};
use crate::utils::Validator;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub remember: bool,
}

impl LoginForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            remember: false,
        }
    }

    pub fn remember(mut self, remember: bool) -> Self {
        self.remember = remember;
        self
    }

    pub fn validate(&self) -> ChatResult<()> {
        Validator::email(&self.email)?;
        Validator::password(&self.password)
    }

    pub fn can_submit(&self) -> bool {
        self.validate().is_ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegistrationForm {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        confirm_password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            confirm_password: confirm_password.into(),
        }
    }

    pub fn validate(&self) -> ChatResult<()> {
        Validator::email(&self.email)?;
        Validator::password(&self.password)?;
        if self.confirm_password.is_empty() {
            return Err(ChatError::validation("Please confirm the password"));
        }
        if self.password != self.confirm_password {
            return Err(ChatError::validation("Passwords do not match"));
        }
        Ok(())
    }

    pub fn can_submit(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Signs in and persists the session cookie.
pub async fn login(
    store: &dyn RowStore,
    form: &LoginForm,
    sessions: &FileSessionStore,
) -> ChatResult<SessionCookie> {
    form.validate()?;

    let token = store.authenticate(form.email.trim(), &form.password).await?;
    let cookie = sessions.issue(token, form.remember, Utc::now());
    sessions.save(&cookie)?;

    info!(email = %form.email.trim(), remember = form.remember, "Signed in");
    Ok(cookie)
}

/// Creates member accounts on behalf of the client.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, email: &str, password: &str) -> ChatResult<()>;
}

pub async fn register(registrar: &dyn Registrar, form: &RegistrationForm) -> ChatResult<()> {
    form.validate()?;
    registrar.register(form.email.trim(), &form.password).await?;
    info!(email = %form.email.trim(), "Registered");
    Ok(())
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Calls the gateway's registration route.
#[derive(Debug, Clone)]
pub struct RegisterClient {
    http: Client,
    endpoint: String,
}

impl RegisterClient {
    pub fn new(gateway_url: &str, timeout: Duration) -> ChatResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/api/register", gateway_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Registrar for RegisterClient {
    async fn register(&self, email: &str, password: &str) -> ChatResult<()> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&RegisterRequest { email, password })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.or(body.message))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
        Err(ChatError::registration(status.as_u16(), message))
    }
}
