//! In-memory sink that records calls in arrival order. Tests keep a cloned
//! handle to the call log so they can inspect traffic after the sink itself
//! has been boxed and handed to a tracker; the diagnose binary uses it for
//! dry-run traces.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};

use super::{SinkUser, TrackingSink};

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Identify {
        user_id: String,
        traits: Map<String, Value>,
        ts: String,
    },
    Track {
        event: String,
        properties: Map<String, Value>,
        ts: String,
    },
    Page {
        name: String,
        properties: Map<String, Value>,
        ts: String,
    },
    Reset,
}

impl SinkCall {
    pub fn label(&self) -> &'static str {
        match self {
            SinkCall::Identify { .. } => "identify",
            SinkCall::Track { .. } => "track",
            SinkCall::Page { .. } => "page",
            SinkCall::Reset => "reset",
        }
    }
}

/// Cloneable handle onto a capturing sink's recorded calls.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<SinkCall>>>);

impl CallLog {
    pub fn snapshot(&self) -> Vec<SinkCall> {
        self.0.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Track-call event names, in order.
    pub fn events(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Track { event, .. } => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Identify-call user ids, in order.
    pub fn identified_users(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Identify { user_id, .. } => Some(user_id),
                _ => None,
            })
            .collect()
    }

    fn push(&self, call: SinkCall) {
        if let Ok(mut v) = self.0.lock() {
            v.push(call);
        }
    }
}

pub struct CapturingSink {
    log: CallLog,
    user: SinkUser,
    /// When set, async calls beyond this many recorded ones fail, simulating
    /// a backend that goes away mid-sequence.
    fail_after: Option<usize>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            user: SinkUser::anonymous(),
            fail_after: None,
        }
    }

    pub fn failing_after(n: usize) -> Self {
        let mut sink = Self::new();
        sink.fail_after = Some(n);
        sink
    }

    /// Handle that stays valid after the sink is boxed away.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.log.snapshot()
    }

    pub fn events(&self) -> Vec<String> {
        self.log.events()
    }

    fn gate(&self) -> Result<()> {
        match self.fail_after {
            Some(n) if self.log.len() >= n => Err(anyhow!("sink offline")),
            _ => Ok(()),
        }
    }
}

impl Default for CapturingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingSink for CapturingSink {
    async fn identify(
        &mut self,
        user_id: &str,
        traits: &Map<String, Value>,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        self.gate()?;
        self.user.id = Some(user_id.to_string());
        self.log.push(SinkCall::Identify {
            user_id: user_id.to_string(),
            traits: traits.clone(),
            ts: super::wire_ts(ts),
        });
        Ok(())
    }

    async fn track(
        &mut self,
        event: &str,
        properties: &Map<String, Value>,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        self.gate()?;
        self.log.push(SinkCall::Track {
            event: event.to_string(),
            properties: properties.clone(),
            ts: super::wire_ts(ts),
        });
        Ok(())
    }

    async fn page(
        &mut self,
        name: &str,
        properties: &Map<String, Value>,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        self.gate()?;
        self.log.push(SinkCall::Page {
            name: name.to_string(),
            properties: properties.clone(),
            ts: super::wire_ts(ts),
        });
        Ok(())
    }

    fn reset(&mut self) {
        self.user = SinkUser::anonymous();
        self.log.push(SinkCall::Reset);
    }

    fn user(&self) -> SinkUser {
        self.user.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let mut sink = CapturingSink::new();
        sink.identify("hcp-001", &Map::new(), Utc::now()).await.unwrap();
        sink.track("Resource Downloaded", &Map::new(), Utc::now())
            .await
            .unwrap();
        sink.page("hcp-portal", &Map::new(), Utc::now()).await.unwrap();
        let labels: Vec<&str> = sink.calls().iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["identify", "track", "page"]);
    }

    #[tokio::test]
    async fn test_handle_outlives_boxed_sink() {
        let sink = CapturingSink::new();
        let log = sink.log();
        let mut boxed: Box<dyn TrackingSink + Send> = Box::new(sink);
        boxed.track("one", &Map::new(), Utc::now()).await.unwrap();
        drop(boxed);
        assert_eq!(log.events(), vec!["one".to_string()]);
    }

    #[tokio::test]
    async fn test_fail_after_cuts_off_later_calls() {
        let mut sink = CapturingSink::failing_after(2);
        sink.track("one", &Map::new(), Utc::now()).await.unwrap();
        sink.track("two", &Map::new(), Utc::now()).await.unwrap();
        let err = sink.track("three", &Map::new(), Utc::now()).await;
        assert!(err.is_err(), "third call must fail");
        assert_eq!(sink.events(), vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn test_reset_is_recorded_and_reissues_identity() {
        let mut sink = CapturingSink::new();
        sink.identify("patient-001", &Map::new(), Utc::now())
            .await
            .unwrap();
        let anon_before = sink.user().anonymous_id;
        sink.reset();
        assert_eq!(sink.calls().last(), Some(&SinkCall::Reset));
        assert!(sink.user().id.is_none());
        assert_ne!(sink.user().anonymous_id, anon_before);
    }
}
