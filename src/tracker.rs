//! The event trampoline. Site instrumentation funnels through `Tracker`,
//! which merges stored attribution into every property bag, drops rapid
//! duplicate page views, forwards to the sink without letting sink failures
//! escape, and mirrors each event into the bounded demo log.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::attribution::MarketingAttribution;
use crate::config::Config;
use crate::event::{AnalyticsEvent, EventLog, UserType};
use crate::logging::{
    agg_increment, log_dedupe_drop, log_identify, log_sink_error, log_track,
};
use crate::sink::{SinkUser, TrackingSink};
use crate::store::{Store, KEY_LAST_PATIENT_ID};

pub const PAGE_VIEWED: &str = "Page Viewed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Emitted,
    Deduped,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerStats {
    pub emitted: u64,
    pub identifies: u64,
    pub deduped: u64,
    pub sink_errors: u64,
}

pub struct Tracker {
    sink: Box<dyn TrackingSink + Send>,
    attribution: Option<MarketingAttribution>,
    log: EventLog,
    /// Page name and event-time epoch seconds of the last page view that
    /// went through. Drives the duplicate suppression window.
    last_page: Option<(String, i64)>,
    dedupe_window_secs: u64,
    stats: TrackerStats,
}

impl Tracker {
    pub fn new(
        sink: Box<dyn TrackingSink + Send>,
        attribution: Option<MarketingAttribution>,
        cfg: &Config,
    ) -> Self {
        Self {
            sink,
            attribution,
            log: EventLog::new(cfg.event_log_cap),
            last_page: None,
            dedupe_window_secs: cfg.page_dedupe_secs,
            stats: TrackerStats::default(),
        }
    }

    fn merged_props(&self, mut props: Map<String, Value>) -> Map<String, Value> {
        if let Some(attr) = &self.attribution {
            attr.merge_into(&mut props);
        }
        props
    }

    fn is_duplicate_page(&self, props: &Map<String, Value>, ts_secs: i64) -> Option<String> {
        let page = props
            .get("page_name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if let Some((last_name, last_ts)) = &self.last_page {
            if *last_name == page && (ts_secs - last_ts).abs() < self.dedupe_window_secs as i64 {
                return Some(page);
            }
        }
        None
    }

    /// Track with an explicit timestamp. The timestamp is the dedupe clock,
    /// so back-dated emissions spaced days apart are never suppressed.
    pub async fn track_event_at(
        &mut self,
        ts: DateTime<Utc>,
        user_type: UserType,
        user_id: &str,
        name: &str,
        props: Map<String, Value>,
    ) -> TrackOutcome {
        if name == PAGE_VIEWED {
            if let Some(page) = self.is_duplicate_page(&props, ts.timestamp()) {
                self.stats.deduped += 1;
                log_dedupe_drop(&page, self.dedupe_window_secs);
                agg_increment("dedupe_drop");
                return TrackOutcome::Deduped;
            }
            let page = props
                .get("page_name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            self.last_page = Some((page, ts.timestamp()));
        }

        let merged = self.merged_props(props);
        if let Err(err) = self.sink.track(name, &merged, ts).await {
            self.stats.sink_errors += 1;
            log_sink_error("track", &err.to_string());
            agg_increment("sink_error");
        }
        // The demo log keeps the event whether or not the backend took it.
        let wire_ts = ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        self.log
            .push(AnalyticsEvent::new(user_type, user_id, name, merged, wire_ts));
        self.stats.emitted += 1;
        log_track(
            user_type.as_str(),
            user_id,
            name,
            self.log.newest().map(|e| e.properties.len()).unwrap_or(0),
        );
        agg_increment("track");
        TrackOutcome::Emitted
    }

    pub async fn track_event(
        &mut self,
        user_type: UserType,
        user_id: &str,
        name: &str,
        props: Map<String, Value>,
    ) -> TrackOutcome {
        self.track_event_at(Utc::now(), user_type, user_id, name, props)
            .await
    }

    /// Page-view helper: a `page` call plus the `Page Viewed` track most
    /// instrumented sites pair it with. Both are suppressed together when
    /// the dedupe window swallows the view.
    pub async fn page_view(
        &mut self,
        user_type: UserType,
        user_id: &str,
        name: &str,
        path: &str,
    ) -> TrackOutcome {
        let ts = Utc::now();
        let mut props = Map::new();
        props.insert("page_name".to_string(), Value::String(name.to_string()));
        props.insert("path".to_string(), Value::String(path.to_string()));

        let outcome = self
            .track_event_at(ts, user_type, user_id, PAGE_VIEWED, props.clone())
            .await;
        if outcome == TrackOutcome::Emitted {
            let merged = self.merged_props(props);
            if let Err(err) = self.sink.page(name, &merged, ts).await {
                self.stats.sink_errors += 1;
                log_sink_error("page", &err.to_string());
                agg_increment("sink_error");
            }
        }
        outcome
    }

    pub async fn identify_at(
        &mut self,
        ts: DateTime<Utc>,
        user_id: &str,
        traits: Map<String, Value>,
    ) {
        self.stats.identifies += 1;
        match self.sink.identify(user_id, &traits, ts).await {
            Ok(()) => {
                log_identify(user_id, traits.len());
                agg_increment("identify");
            }
            Err(err) => {
                self.stats.sink_errors += 1;
                log_sink_error("identify", &err.to_string());
                agg_increment("sink_error");
            }
        }
    }

    pub async fn identify(&mut self, user_id: &str, traits: Map<String, Value>) {
        self.identify_at(Utc::now(), user_id, traits).await
    }

    /// Patient portal login: identify, emit the login event, and remember the
    /// id for the next run. Storage failures degrade silently, same as the
    /// capture path.
    pub async fn login_patient(
        &mut self,
        store: &mut Store,
        patient_id: &str,
        traits: Map<String, Value>,
    ) {
        self.identify(patient_id, traits).await;
        self.track_event(UserType::Patient, patient_id, "Patient Logged In", Map::new())
            .await;
        let _ = store.set(KEY_LAST_PATIENT_ID, patient_id);
    }

    /// Emit the logout event under the departing identity, then drop it.
    pub async fn logout(&mut self, store: &mut Store) {
        let user_id = self
            .sink
            .user()
            .id
            .unwrap_or_else(|| "anonymous".to_string());
        self.track_event(UserType::Patient, &user_id, "Patient Logged Out", Map::new())
            .await;
        self.sink.reset();
        let _ = store.delete(KEY_LAST_PATIENT_ID);
    }

    pub fn snapshot_user(&self) -> SinkUser {
        self.sink.user()
    }

    pub fn sink_mut(&mut self) -> &mut (dyn TrackingSink + Send) {
        self.sink.as_mut()
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }
}
