//! Client for the external profile lookup API. Failures map onto a small
//! human-readable taxonomy the demo surfaces inline. The client never
//! retries; whoever renders the error decides whether to offer one.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    NotFound,
    AuthFailed,
    Backend(String),
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileError::NotFound => write!(f, "No profile found for that user yet."),
            ProfileError::AuthFailed => {
                write!(f, "The profile service rejected the request. Check credentials.")
            }
            ProfileError::Backend(detail) => {
                write!(f, "The profile service is unreachable: {}", detail)
            }
        }
    }
}

impl std::error::Error for ProfileError {}

/// Map an HTTP status onto the error taxonomy. `None` means success.
pub fn classify_status(status: u16) -> Option<ProfileError> {
    match status {
        200..=299 => None,
        404 => Some(ProfileError::NotFound),
        401 | 403 => Some(ProfileError::AuthFailed),
        other => Some(ProfileError::Backend(format!("status {}", other))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub traits: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub status: String,
}

pub struct ProfileClient {
    client: Client,
    base: String,
}

impl ProfileClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            base: cfg.profile_base.clone(),
        }
    }

    pub async fn fetch_profile(&self, user_id: &str) -> Result<Profile, ProfileError> {
        let url = format!("{}/api/profile/{}", self.base, user_id);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProfileError::Backend(e.to_string()))?;
        if let Some(err) = classify_status(resp.status().as_u16()) {
            return Err(err);
        }
        resp.json::<Profile>()
            .await
            .map_err(|e| ProfileError::Backend(e.to_string()))
    }

    pub async fn health(&self) -> Result<Health, ProfileError> {
        let url = format!("{}/health", self.base);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProfileError::Backend(e.to_string()))?;
        if let Some(err) = classify_status(resp.status().as_u16()) {
            return Err(err);
        }
        resp.json::<Health>()
            .await
            .map_err(|e| ProfileError::Backend(e.to_string()))
    }
}
