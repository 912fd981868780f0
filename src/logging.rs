//! Structured logging for the journey simulator.
//!
//! Design goals:
//! 1. Multi-level granularity (TRACE → FATAL)
//! 2. Domain-specific categories for filtering
//! 3. Summarization-friendly periodic checkpoints
//! 4. Replay/audit support via deterministic timestamps and config hashes

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Sink,        // Calls forwarded to the tracking backend
    Journey,     // Scripted journey replay
    Population,  // Bulk cohort generation
    Attribution, // UTM/click-id capture and merge
    Identity,    // Anonymous id, identify, login/logout
    Live,        // Live simulator loop
    Profile,     // Profile API client
    System,      // Startup, shutdown, pacing
    Audit,       // Replay/audit trail entries
    Perf,        // Performance profiling
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Sink => "sink",
            Domain::Journey => "journey",
            Domain::Population => "population",
            Domain::Attribution => "attribution",
            Domain::Identity => "identity",
            Domain::Live => "live",
            Domain::Profile => "profile",
            Domain::System => "system",
            Domain::Audit => "audit",
            Domain::Perf => "perf",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // Check LOG_DOMAINS env var (comma-separated list or "all")
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Sequence counter for ordering
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }
        let events_path = run_dir.join("events.jsonl");
        let trace_path = run_dir.join("trace.jsonl");
        let manifest_path = run_dir.join("manifest.json");

        let _ = std::fs::write(
            manifest_path,
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        let events = File::create(events_path).unwrap_or_else(|err| {
            eprintln!("[log] failed to create events log: {}", err);
            File::create("/tmp/journeysim-events.jsonl").expect("events fallback")
        });
        let trace = File::create(trace_path).unwrap_or_else(|err| {
            eprintln!("[log] failed to create trace log: {}", err);
            File::create("/tmp/journeysim-trace.jsonl").expect("trace fallback")
        });

        RunContext {
            run_id,
            events: Mutex::new(BufWriter::new(events)),
            trace: Mutex::new(BufWriter::new(trace)),
        }
    })
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in [
        "authorization",
        "Authorization",
        "write_key",
        "WRITE_KEY",
        "api_key",
    ] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["user_id", "anonymous_id", "journey_id", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds (for replay correlation)
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    emit_record(level, domain.as_str(), event, fields);
}

/// Flat-field log line keyed by module, used by the binaries.
pub fn json_log(module: &str, fields: Map<String, Value>) {
    emit_record(Level::Info, module, module, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    println!("{}", line);
}

// =============================================================================
// Audit Trail Logs
// =============================================================================

/// Log an audit entry tying a run to its configuration and script inputs
pub fn log_audit(event_type: &str, config_hash: &str, script_hash: &str) {
    log(
        Level::Info,
        Domain::Audit,
        event_type,
        obj(&[
            ("config_hash", v_str(config_hash)),
            ("script_hash", v_str(script_hash)),
        ]),
    );
}

// =============================================================================
// Summarization Logs
// =============================================================================

/// Periodic summary for aggregation
pub fn log_periodic_summary(
    period_secs: u64,
    tracks: u64,
    identifies: u64,
    dedupe_drops: u64,
    sink_errors: u64,
) {
    log(
        Level::Info,
        Domain::System,
        "periodic_summary",
        obj(&[
            ("period_secs", json!(period_secs)),
            ("tracks", json!(tracks)),
            ("identifies", json!(identifies)),
            ("dedupe_drops", json!(dedupe_drops)),
            ("sink_errors", json!(sink_errors)),
        ]),
    );
}

/// Session summary on shutdown
pub fn log_session_summary(
    duration_secs: u64,
    total_events: u64,
    tracks: u64,
    identifies: u64,
    journeys_replayed: u64,
    sink_errors: u64,
) {
    log(
        Level::Info,
        Domain::System,
        "session_summary",
        obj(&[
            ("duration_secs", json!(duration_secs)),
            ("total_events", json!(total_events)),
            ("tracks", json!(tracks)),
            ("identifies", json!(identifies)),
            ("journeys_replayed", json!(journeys_replayed)),
            ("sink_errors", json!(sink_errors)),
        ]),
    );
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_track(user_type: &str, user_id: &str, event: &str, property_count: usize) {
    log(
        Level::Debug,
        Domain::Sink,
        "track",
        obj(&[
            ("user_type", v_str(user_type)),
            ("user_id", v_str(user_id)),
            ("event_name", v_str(event)),
            ("property_count", json!(property_count)),
        ]),
    );
}

pub fn log_identify(user_id: &str, trait_count: usize) {
    log(
        Level::Info,
        Domain::Identity,
        "identify",
        obj(&[
            ("user_id", v_str(user_id)),
            ("trait_count", json!(trait_count)),
        ]),
    );
}

pub fn log_dedupe_drop(page: &str, window_secs: u64) {
    log(
        Level::Debug,
        Domain::Sink,
        "dedupe_drop",
        obj(&[
            ("page", v_str(page)),
            ("window_secs", json!(window_secs)),
        ]),
    );
}

pub fn log_sink_error(call: &str, error: &str) {
    log(
        Level::Warn,
        Domain::Sink,
        "sink_error",
        obj(&[("call", v_str(call)), ("error", v_str(error))]),
    );
}

pub fn log_journey_step(journey_id: &str, step_index: usize, event: &str) {
    log(
        Level::Debug,
        Domain::Journey,
        "journey_step",
        obj(&[
            ("journey_id", v_str(journey_id)),
            ("step_index", json!(step_index)),
            ("event_name", v_str(event)),
        ]),
    );
}

pub fn log_attribution_captured(source: &str, medium: &str, campaign: &str) {
    log(
        Level::Info,
        Domain::Attribution,
        "captured",
        obj(&[
            ("utm_source", v_str(source)),
            ("utm_medium", v_str(medium)),
            ("utm_campaign", v_str(campaign)),
        ]),
    );
}

// =============================================================================
// Utility Functions (legacy compatibility)
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    domain: Domain,
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
    enabled: bool,
}

impl ProfileScope {
    pub fn new(_module: &'static str, label: &'static str) -> Self {
        let enabled = Self::should_sample();
        Self {
            domain: Domain::Perf,
            label,
            context: None,
            started: Instant::now(),
            enabled,
        }
    }

    pub fn with_context(
        _module: &'static str,
        label: &'static str,
        fields: &[(&str, Value)],
    ) -> Self {
        let enabled = Self::should_sample();
        Self {
            domain: Domain::Perf,
            label,
            context: if enabled { Some(obj(fields)) } else { None },
            started: Instant::now(),
            enabled,
        }
    }

    fn should_sample() -> bool {
        std::env::var("PROFILE_SAMPLE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(|p| {
                if p >= 1.0 {
                    true
                } else if p <= 0.0 {
                    false
                } else {
                    let seq = PROFILE_SEQ.fetch_add(1, Ordering::SeqCst);
                    let bucket = (seq % 10_000) as f64 / 10_000.0;
                    bucket < p
                }
            })
            .unwrap_or(true)
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, self.domain, "profile", fields);
    }
}

// =============================================================================
// Log Aggregator for Periodic Summaries
// =============================================================================

static AGGREGATOR: OnceLock<Mutex<LogAggregator>> = OnceLock::new();

fn get_aggregator() -> &'static Mutex<LogAggregator> {
    AGGREGATOR.get_or_init(|| Mutex::new(LogAggregator::new()))
}

struct LogAggregator {
    tracks: u64,
    identifies: u64,
    dedupe_drops: u64,
    sink_errors: u64,
    last_flush: Instant,
    flush_interval_secs: u64,
}

impl LogAggregator {
    fn new() -> Self {
        Self {
            tracks: 0,
            identifies: 0,
            dedupe_drops: 0,
            sink_errors: 0,
            last_flush: Instant::now(),
            flush_interval_secs: std::env::var("LOG_FLUSH_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }

    fn increment(&mut self, event: &str) {
        match event {
            "track" => self.tracks += 1,
            "identify" => self.identifies += 1,
            "dedupe_drop" => self.dedupe_drops += 1,
            "sink_error" => self.sink_errors += 1,
            _ => {}
        }
    }

    fn maybe_flush(&mut self) -> Option<(u64, u64, u64, u64)> {
        if self.last_flush.elapsed().as_secs() >= self.flush_interval_secs {
            let result = (
                self.tracks,
                self.identifies,
                self.dedupe_drops,
                self.sink_errors,
            );
            self.tracks = 0;
            self.identifies = 0;
            self.dedupe_drops = 0;
            self.sink_errors = 0;
            self.last_flush = Instant::now();
            Some(result)
        } else {
            None
        }
    }
}

/// Call periodically to emit aggregated stats
pub fn tick_aggregator() {
    if let Ok(mut agg) = get_aggregator().lock() {
        let period = agg.flush_interval_secs;
        if let Some((tracks, identifies, drops, errors)) = agg.maybe_flush() {
            log_periodic_summary(period, tracks, identifies, drops, errors);
        }
    }
}

/// Increment a counter in the aggregator
pub fn agg_increment(event: &str) {
    if let Ok(mut agg) = get_aggregator().lock() {
        agg.increment(event);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_sanitize_redacts_write_key() {
        let fields = obj(&[
            ("write_key", v_str("sk-very-secret")),
            ("event_name", v_str("Page Viewed")),
        ]);
        let clean = sanitize_fields(fields);
        assert_eq!(clean.get("write_key").unwrap(), "[REDACTED]");
        assert_eq!(clean.get("event_name").unwrap(), "Page Viewed");
    }

    #[test]
    fn test_sanitize_redacts_authorization_header() {
        let fields = obj(&[("Authorization", v_str("Basic abc123"))]);
        let clean = sanitize_fields(fields);
        assert_eq!(clean.get("Authorization").unwrap(), "[REDACTED]");
    }

    #[test]
    fn test_obj_helper() {
        let m = obj(&[("key", v_str("value")), ("num", v_num(42.0))]);
        assert_eq!(m.get("key").unwrap(), "value");
        assert_eq!(m.get("num").unwrap(), 42.0);
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }

    #[test]
    fn test_split_fields_promotes_identity_keys() {
        let fields = obj(&[
            ("user_id", v_str("patient-001")),
            ("page", v_str("/treatment")),
        ]);
        let (top, data) = split_fields(fields);
        assert!(top.contains_key("user_id"));
        assert!(!top.contains_key("page"));
        assert!(data.contains_key("page"));
    }
}
