//! The tracking backend seam. Everything that emits analytics calls goes
//! through a `TrackingSink` handed in by the caller; nothing reaches for a
//! global SDK handle. A missing backend is the `NullSink`, not an error.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::logging::ts_epoch_ms;

pub mod capture;
pub mod null;
pub mod segment;

pub use capture::{CallLog, CapturingSink, SinkCall};
pub use null::NullSink;
pub use segment::SegmentSink;

/// Identity pair the sink maintains: a device-scoped anonymous id that is
/// always present, and a user id once `identify` has run.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkUser {
    pub id: Option<String>,
    pub anonymous_id: String,
}

impl SinkUser {
    pub fn anonymous() -> Self {
        Self {
            id: None,
            anonymous_id: mint_anonymous_id(),
        }
    }
}

pub fn mint_anonymous_id() -> String {
    let tag: u32 = rand::thread_rng().gen();
    format!("anon-{}-{:08x}", ts_epoch_ms(), tag)
}

#[derive(Clone, Copy, Debug)]
pub enum SinkKind {
    Segment,
    Null,
}

impl SinkKind {
    /// `SINK` selects explicitly; otherwise the presence of a write key
    /// decides. No key means every emission is a quiet no-op.
    pub fn from_env() -> Self {
        match std::env::var("SINK").unwrap_or_default().as_str() {
            "segment" => SinkKind::Segment,
            "null" => SinkKind::Null,
            _ => {
                if std::env::var("WRITE_KEY").is_ok() {
                    SinkKind::Segment
                } else {
                    SinkKind::Null
                }
            }
        }
    }

    pub fn build(self, cfg: &Config) -> Result<Box<dyn TrackingSink + Send>> {
        match self {
            SinkKind::Segment => Ok(Box::new(SegmentSink::new(cfg)?)),
            SinkKind::Null => Ok(Box::new(NullSink::new())),
        }
    }
}

#[async_trait]
pub trait TrackingSink {
    /// Bind `user_id` to the current anonymous id and upsert profile traits.
    /// The binding persists for subsequent calls until `reset`.
    async fn identify(
        &mut self,
        user_id: &str,
        traits: &Map<String, Value>,
        ts: DateTime<Utc>,
    ) -> Result<()>;

    /// Record a named event with a property bag.
    async fn track(
        &mut self,
        event: &str,
        properties: &Map<String, Value>,
        ts: DateTime<Utc>,
    ) -> Result<()>;

    /// Record a page view.
    async fn page(
        &mut self,
        name: &str,
        properties: &Map<String, Value>,
        ts: DateTime<Utc>,
    ) -> Result<()>;

    /// Drop the current identity and mint a fresh anonymous id.
    fn reset(&mut self);

    fn user(&self) -> SinkUser;
}

/// Wire timestamp format shared by all sink payloads.
pub(crate) fn wire_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
