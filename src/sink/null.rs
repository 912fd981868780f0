use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::{SinkUser, TrackingSink};

// Stand-in for an absent backend: accepts everything, sends nothing.
// Identity still behaves like the real sink so callers see consistent ids.
pub struct NullSink {
    user: SinkUser,
}

impl NullSink {
    pub fn new() -> Self {
        Self {
            user: SinkUser::anonymous(),
        }
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingSink for NullSink {
    async fn identify(
        &mut self,
        user_id: &str,
        _traits: &Map<String, Value>,
        _ts: DateTime<Utc>,
    ) -> Result<()> {
        self.user.id = Some(user_id.to_string());
        Ok(())
    }

    async fn track(
        &mut self,
        _event: &str,
        _properties: &Map<String, Value>,
        _ts: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }

    async fn page(
        &mut self,
        _name: &str,
        _properties: &Map<String, Value>,
        _ts: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) {
        self.user = SinkUser::anonymous();
    }

    fn user(&self) -> SinkUser {
        self.user.clone()
    }
}
