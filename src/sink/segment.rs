use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{wire_ts, SinkUser, TrackingSink};
use crate::config::Config;

/// HTTP client for a Segment-compatible tracking API.
pub struct SegmentSink {
    client: Client,
    base: String,
    auth_header: String,
    user: SinkUser,
}

impl SegmentSink {
    pub fn new(cfg: &Config) -> Result<Self> {
        let write_key = cfg
            .write_key
            .as_ref()
            .ok_or_else(|| anyhow!("missing WRITE_KEY"))?;
        Ok(Self {
            client: Client::new(),
            base: cfg.segment_base.clone(),
            auth_header: basic_auth(write_key),
            user: SinkUser::anonymous(),
        })
    }

    async fn post(&self, call: &str, body: &Value) -> Result<()> {
        let url = format!("{}/v1/{}", self.base, call);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let err: SegmentError = serde_json::from_str(&text).unwrap_or(SegmentError {
                error: text.clone(),
            });
            return Err(anyhow!(
                "segment {} rejected: {} - {}",
                call,
                status.as_u16(),
                err.error
            ));
        }
        Ok(())
    }
}

/// The write key is the username of a Basic credential with empty password.
fn basic_auth(write_key: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:", write_key)))
}

#[derive(Deserialize, Debug)]
struct SegmentError {
    #[serde(default)]
    error: String,
}

// Payload builders are pure so the wire shape is testable without a server.

fn base_body(user: &SinkUser, ts: &str) -> Map<String, Value> {
    let mut body = Map::new();
    if let Some(id) = &user.id {
        body.insert("userId".to_string(), json!(id));
    }
    body.insert("anonymousId".to_string(), json!(user.anonymous_id));
    body.insert("timestamp".to_string(), json!(ts));
    body
}

pub(crate) fn identify_body(
    user: &SinkUser,
    user_id: &str,
    traits: &Map<String, Value>,
    ts: &str,
) -> Value {
    let mut body = base_body(user, ts);
    body.insert("userId".to_string(), json!(user_id));
    body.insert("traits".to_string(), Value::Object(traits.clone()));
    Value::Object(body)
}

pub(crate) fn track_body(
    user: &SinkUser,
    event: &str,
    properties: &Map<String, Value>,
    ts: &str,
) -> Value {
    let mut body = base_body(user, ts);
    body.insert("event".to_string(), json!(event));
    body.insert("properties".to_string(), Value::Object(properties.clone()));
    Value::Object(body)
}

pub(crate) fn page_body(
    user: &SinkUser,
    name: &str,
    properties: &Map<String, Value>,
    ts: &str,
) -> Value {
    let mut body = base_body(user, ts);
    body.insert("name".to_string(), json!(name));
    body.insert("properties".to_string(), Value::Object(properties.clone()));
    Value::Object(body)
}

#[async_trait]
impl TrackingSink for SegmentSink {
    async fn identify(
        &mut self,
        user_id: &str,
        traits: &Map<String, Value>,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        let body = identify_body(&self.user, user_id, traits, &wire_ts(ts));
        self.post("identify", &body).await?;
        // Latch only after the backend accepted the call.
        self.user.id = Some(user_id.to_string());
        Ok(())
    }

    async fn track(
        &mut self,
        event: &str,
        properties: &Map<String, Value>,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        let body = track_body(&self.user, event, properties, &wire_ts(ts));
        self.post("track", &body).await
    }

    async fn page(
        &mut self,
        name: &str,
        properties: &Map<String, Value>,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        let body = page_body(&self.user, name, properties, &wire_ts(ts));
        self.post("page", &body).await
    }

    fn reset(&mut self) {
        self.user = SinkUser::anonymous();
    }

    fn user(&self) -> SinkUser {
        self.user.clone()
    }
}
