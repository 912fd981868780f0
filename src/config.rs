use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Clone, Serialize)]
pub struct Config {
    pub segment_base: String,
    pub write_key: Option<String>,
    pub profile_base: String,
    pub store_path: String,
    pub site_base: String,
    pub landing_page: String,
    pub event_log_cap: usize,
    pub page_dedupe_secs: u64,
    pub step_delay_ms: u64,
    pub emit_delay_ms: u64,
    pub events_per_minute: u64,
    pub seed: u64,
    pub visitors: usize,
    pub patients: usize,
    pub hcps: usize,
    pub participants: usize,
    pub high_engagement_pct: f64,
    pub kill_file: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            segment_base: std::env::var("SEGMENT_BASE").unwrap_or_else(|_| "https://api.segment.io".to_string()),
            write_key: std::env::var("WRITE_KEY").ok(),
            profile_base: std::env::var("PROFILE_BASE").unwrap_or_else(|_| "http://localhost:3001".to_string()),
            store_path: std::env::var("STORE_PATH").unwrap_or_else(|_| "./journeysim.sqlite".to_string()),
            site_base: std::env::var("SITE_BASE").unwrap_or_else(|_| "https://www.veridiangenomics-demo.com".to_string()),
            landing_page: std::env::var("LANDING_PAGE").unwrap_or_else(|_| "/".to_string()),
            event_log_cap: std::env::var("EVENT_LOG_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(1000),
            page_dedupe_secs: std::env::var("PAGE_DEDUPE_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(30),
            step_delay_ms: std::env::var("STEP_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(800),
            emit_delay_ms: std::env::var("EMIT_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(120),
            events_per_minute: std::env::var("EVENTS_PER_MINUTE").ok().and_then(|v| v.parse().ok()).unwrap_or(12),
            seed: std::env::var("SEED").ok().and_then(|v| v.parse().ok()).unwrap_or(42),
            visitors: std::env::var("VISITORS").ok().and_then(|v| v.parse().ok()).unwrap_or(25),
            patients: std::env::var("PATIENTS").ok().and_then(|v| v.parse().ok()).unwrap_or(10),
            hcps: std::env::var("HCPS").ok().and_then(|v| v.parse().ok()).unwrap_or(6),
            participants: std::env::var("PARTICIPANTS").ok().and_then(|v| v.parse().ok()).unwrap_or(4),
            high_engagement_pct: std::env::var("HIGH_ENGAGEMENT_PCT").ok().and_then(|v| v.parse().ok()).unwrap_or(0.3),
            kill_file: std::env::var("KILL_FILE").unwrap_or_else(|_| "/tmp/STOP".to_string()),
        }
    }

    /// Canonical JSON rendering, used for the config hash and diagnostics.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// SHA-256 of the canonical JSON. Ties log lines and run manifests to the
    /// exact settings that produced them.
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Per-tick pacing for the live simulator, derived from events/minute.
    pub fn tick_interval_ms(&self) -> u64 {
        60_000 / self.events_per_minute.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            segment_base: "https://api.segment.io".to_string(),
            write_key: None,
            profile_base: "http://localhost:3001".to_string(),
            store_path: ":memory:".to_string(),
            site_base: "https://www.veridiangenomics-demo.com".to_string(),
            landing_page: "/".to_string(),
            event_log_cap: 1000,
            page_dedupe_secs: 30,
            step_delay_ms: 800,
            emit_delay_ms: 120,
            events_per_minute: 12,
            seed: 42,
            visitors: 25,
            patients: 10,
            hcps: 6,
            participants: 4,
            high_engagement_pct: 0.3,
            kill_file: "/tmp/STOP".to_string(),
        }
    }

    #[test]
    fn test_config_hash_deterministic() {
        let cfg = base_config();
        assert_eq!(cfg.config_hash(), cfg.config_hash());
        assert_eq!(cfg.config_hash().len(), 64, "sha256 hex is 64 chars");
    }

    #[test]
    fn test_config_hash_sensitive_to_fields() {
        let a = base_config();
        let mut b = base_config();
        b.seed = 43;
        assert_ne!(
            a.config_hash(),
            b.config_hash(),
            "different seeds must hash differently"
        );
    }

    #[test]
    fn test_to_json_includes_cohort_sizes() {
        let json = base_config().to_json();
        assert!(json.contains("\"visitors\":25"));
        assert!(json.contains("\"patients\":10"));
        assert!(json.contains("\"event_log_cap\":1000"));
    }

    #[test]
    fn test_tick_interval_from_events_per_minute() {
        let mut cfg = base_config();
        cfg.events_per_minute = 12;
        assert_eq!(cfg.tick_interval_ms(), 5_000);
        cfg.events_per_minute = 0;
        assert_eq!(cfg.tick_interval_ms(), 60_000, "zero rate clamps to one per minute");
    }
}
