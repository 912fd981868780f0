//! Live demo traffic. A toggleable loop that emits a weighted mix of page
//! views, conversion events, and occasional full journey replays at a
//! configured events-per-minute pace. Stopping clears the flag consulted
//! before each tick; a tick already in flight completes.

use rand::rngs::StdRng;
use rand::Rng;
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::event::UserType;
use crate::journey::{self, Pacing};
use crate::logging::{log, obj, tick_aggregator, v_str, Domain, Level};
use crate::population::PAGES;
use crate::tracker::Tracker;

/// Synthetic actor id for simulator-driven ambient traffic.
pub const SIM_USER: &str = "live-sim";

const CONVERSION_EVENTS: &[&str] = &[
    "Content Downloaded",
    "Contact Form Submitted",
    "Newsletter Subscribed",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveSummary {
    pub ticks: u64,
    pub journeys_replayed: u64,
}

#[derive(Clone)]
pub struct LiveSimulator {
    running: Arc<AtomicBool>,
}

impl LiveSimulator {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Flip the flag, returning the new state.
    pub fn toggle(&self) -> bool {
        let was = self.running.fetch_xor(true, Ordering::SeqCst);
        !was
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Drive ticks until the flag clears or the kill file appears. The flag
    /// is only consulted between ticks, so `stop` never interrupts one.
    pub async fn run(
        &self,
        cfg: &Config,
        tracker: &mut Tracker,
        rng: &mut StdRng,
    ) -> LiveSummary {
        let mut summary = LiveSummary::default();
        while self.is_running() {
            if Path::new(&cfg.kill_file).exists() {
                log(
                    Level::Warn,
                    Domain::Live,
                    "kill_file",
                    obj(&[("path", v_str(&cfg.kill_file))]),
                );
                break;
            }
            self.tick(cfg, tracker, rng, &mut summary).await;
            tick_aggregator();
            tokio::time::sleep(Duration::from_millis(cfg.tick_interval_ms())).await;
        }
        summary
    }

    /// One unit of demo traffic: mostly page views, some conversions, and
    /// now and then a whole journey arriving step by step.
    async fn tick(
        &self,
        cfg: &Config,
        tracker: &mut Tracker,
        rng: &mut StdRng,
        summary: &mut LiveSummary,
    ) {
        let roll: f64 = rng.gen();
        if roll < 0.70 {
            let (name, path) = PAGES[rng.gen_range(0..PAGES.len())];
            tracker
                .page_view(UserType::Admin, SIM_USER, name, path)
                .await;
        } else if roll < 0.85 {
            let event = CONVERSION_EVENTS[rng.gen_range(0..CONVERSION_EVENTS.len())];
            let props = match event {
                "Content Downloaded" => json!({
                    "content_title": "Understanding Exon-Skipping Therapy",
                    "content_type": "brochure",
                }),
                "Contact Form Submitted" => json!({"topic": "treatment-eligibility"}),
                _ => json!({"list": "caregiver-monthly"}),
            };
            tracker
                .track_event(
                    UserType::Admin,
                    SIM_USER,
                    event,
                    props.as_object().cloned().unwrap_or_default(),
                )
                .await;
        } else {
            let journeys = journey::builtin();
            let picked = &journeys[rng.gen_range(0..journeys.len())];
            journey::replay(
                picked,
                tracker.sink_mut(),
                Pacing::Staggered(Duration::from_millis(cfg.step_delay_ms)),
            )
            .await;
            summary.journeys_replayed += 1;
        }
        summary.ticks += 1;
    }
}

impl Default for LiveSimulator {
    fn default() -> Self {
        Self::new()
    }
}
