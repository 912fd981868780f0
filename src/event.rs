//! Event records and the bounded in-memory event log backing the demo UI.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;

use crate::logging::ts_epoch_ms;

/// Which portal an event is attributed to in the demo event list.
/// Simulator-driven traffic (anonymous visitors, bulk runs) is tagged `Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Patient,
    Hcp,
    Admin,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Patient => "patient",
            UserType::Hcp => "hcp",
            UserType::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: String,
    /// RFC3339, matches the timestamp sent to the sink.
    pub ts: String,
    pub user_type: UserType,
    pub user_id: String,
    pub event_name: String,
    pub properties: Map<String, Value>,
}

impl AnalyticsEvent {
    pub fn new(
        user_type: UserType,
        user_id: &str,
        event_name: &str,
        properties: Map<String, Value>,
        ts: String,
    ) -> Self {
        Self {
            id: mint_event_id(),
            ts,
            user_type,
            user_id: user_id.to_string(),
            event_name: event_name.to_string(),
            properties,
        }
    }
}

fn mint_event_id() -> String {
    let tag: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("evt-{}-{:06x}", ts_epoch_ms(), tag)
}

/// Newest-first event list, capped. Inserting past the cap evicts the oldest.
/// Never persisted; exists so a demo surface can show recent traffic.
pub struct EventLog {
    events: VecDeque<AnalyticsEvent>,
    cap: usize,
}

impl EventLog {
    pub fn new(cap: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(cap.min(1024)),
            cap: cap.max(1),
        }
    }

    pub fn push(&mut self, event: AnalyticsEvent) {
        self.events.push_front(event);
        while self.events.len() > self.cap {
            self.events.pop_back();
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &AnalyticsEvent> {
        self.events.iter()
    }

    pub fn newest(&self) -> Option<&AnalyticsEvent> {
        self.events.front()
    }

    pub fn oldest(&self) -> Option<&AnalyticsEvent> {
        self.events.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::ts_now;

    fn event(name: &str) -> AnalyticsEvent {
        AnalyticsEvent::new(UserType::Admin, "sim", name, Map::new(), ts_now())
    }

    #[test]
    fn test_log_caps_at_limit() {
        let mut log = EventLog::new(1000);
        for i in 0..1001 {
            log.push(event(&format!("e{}", i)));
        }
        assert_eq!(log.len(), 1000, "1001st insert must evict, not grow");
        assert_eq!(log.newest().unwrap().event_name, "e1000");
        assert_eq!(
            log.oldest().unwrap().event_name,
            "e1",
            "oldest entry e0 must be the one evicted"
        );
    }

    #[test]
    fn test_log_newest_first_order() {
        let mut log = EventLog::new(10);
        log.push(event("first"));
        log.push(event("second"));
        log.push(event("third"));
        let names: Vec<&str> = log.iter().map(|e| e.event_name.as_str()).collect();
        assert_eq!(names, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_zero_cap_clamps_to_one() {
        let mut log = EventLog::new(0);
        log.push(event("only"));
        log.push(event("newer"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.newest().unwrap().event_name, "newer");
    }

    #[test]
    fn test_event_ids_unique_enough() {
        let a = mint_event_id();
        let b = mint_event_id();
        assert!(a.starts_with("evt-"));
        // Same millisecond is possible; the random tag keeps ids distinct.
        assert_ne!(a, b);
    }

    #[test]
    fn test_user_type_serializes_lowercase() {
        let json = serde_json::to_string(&UserType::Hcp).unwrap();
        assert_eq!(json, "\"hcp\"");
    }
}
