//! Simulated sign-in. No credentials are checked; any non-empty email and password
//! produce a local user record that is persisted under `currentUser`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use crate::storage::{read_json, write_json, KeyValueStore, CURRENT_USER_KEY};

const DEFAULT_LATENCY: Duration = Duration::from_secs(1);
const PLACEHOLDER_PICTURE: &str = "https://via.placeholder.com/150";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    SignedIn(User),
    InvalidCredentials,
}

pub struct AuthSession {
    storage: Arc<dyn KeyValueStore>,
    current: watch::Sender<Option<User>>,
    latency: Duration,
}

impl AuthSession {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let saved = read_json::<User>(storage.as_ref(), CURRENT_USER_KEY);
        if let Some(user) = &saved {
            info!("Restored session for {}", user.email);
        }
        let (current, _) = watch::channel(saved);
        Self {
            storage,
            current,
            latency: DEFAULT_LATENCY,
        }
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// `Err` means the sign-in could not be completed, as opposed to being refused.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        tokio::time::sleep(self.latency).await;
        if email.is_empty() || password.is_empty() {
            return Ok(LoginOutcome::InvalidCredentials);
        }
        let user = User {
            id: "1".to_string(),
            email: email.to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            picture: Some(PLACEHOLDER_PICTURE.to_string()),
        };
        write_json(self.storage.as_ref(), CURRENT_USER_KEY, &user)
            .context("Failed to save signed-in user")?;
        info!("Signed in as {}", user.email);
        self.current.send_replace(Some(user.clone()));
        Ok(LoginOutcome::SignedIn(user))
    }

    pub fn logout(&self) -> Result<()> {
        self.storage
            .remove(CURRENT_USER_KEY)
            .context("Failed to clear signed-in user")?;
        self.current.send_replace(None);
        info!("Signed out");
        Ok(())
    }

    pub fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.borrow().is_some()
    }

    pub fn watch_user(&self) -> watch::Receiver<Option<User>> {
        self.current.subscribe()
    }
}

/// Form-level email check: one `@`, a non-empty local part, and a dotted domain.
pub fn validate_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.contains(char::is_whitespace) {
        return false;
    }
    let mut labels = domain.split('.');
    domain.contains('.') && labels.all(|l| !l.is_empty())
}
