//! Diagnostic tool: dumps effective configuration, probes the profile API,
//! and dry-runs a journey through a capturing sink so the emitted call
//! stream can be inspected without a backend.

use journeysim::config::Config;
use journeysim::journey::{self, Pacing};
use journeysim::profile::ProfileClient;
use journeysim::sink::{CapturingSink, SinkCall, SinkKind};

#[tokio::main]
async fn main() {
    let cfg = Config::from_env();

    println!("=== Configuration ===");
    println!("config_hash: {}", cfg.config_hash());
    println!("segment_base: {}", cfg.segment_base);
    println!("write_key: {}", if cfg.write_key.is_some() { "set" } else { "unset" });
    println!("profile_base: {}", cfg.profile_base);
    println!("store_path: {}", cfg.store_path);
    println!("event_log_cap: {}", cfg.event_log_cap);
    println!("page_dedupe_secs: {}", cfg.page_dedupe_secs);
    println!("events_per_minute: {}", cfg.events_per_minute);
    println!("seed: {}", cfg.seed);
    println!(
        "cohorts: visitors={} patients={} hcps={} participants={}",
        cfg.visitors, cfg.patients, cfg.hcps, cfg.participants
    );

    println!();
    println!("=== Sink ===");
    match SinkKind::from_env() {
        SinkKind::Segment => println!("kind: segment ({})", cfg.segment_base),
        SinkKind::Null => println!("kind: null (no write key; emissions are dropped)"),
    }

    println!();
    println!("=== Profile API ===");
    let profile = ProfileClient::new(&cfg);
    match profile.health().await {
        Ok(health) => println!("health: {}", health.status),
        Err(err) => println!("health: unreachable ({})", err),
    }
    if let Some(user_id) = std::env::args().nth(1) {
        match profile.fetch_profile(&user_id).await {
            Ok(p) => println!("profile {}: {} traits", user_id, p.traits.len()),
            Err(err) => println!("profile {}: {}", user_id, err),
        }
    }

    println!();
    println!("=== Journey Dry Run ===");
    let journey = journey::builtin().remove(0);
    let mut sink = CapturingSink::new();
    let summary = journey::replay(&journey, &mut sink, Pacing::Instant).await;
    println!(
        "{}: {} steps emitted, {} skipped",
        journey.id, summary.steps_emitted, summary.steps_skipped
    );
    for call in sink.calls() {
        match call {
            SinkCall::Identify { user_id, traits, ts } => {
                println!("  identify {} ({} traits) @ {}", user_id, traits.len(), ts)
            }
            SinkCall::Track { event, properties, ts } => {
                println!("  track    {} ({} props) @ {}", event, properties.len(), ts)
            }
            SinkCall::Page { name, ts, .. } => println!("  page     {} @ {}", name, ts),
            SinkCall::Reset => println!("  reset"),
        }
    }
}
