//! Replay a journey script against the configured sink. Takes a builtin
//! journey id, a path to a JSON script, or `-` for a script on stdin.
//! MODE=staggered paces steps with the configured delay instead of
//! back-dating them.

use std::io::Read;
use std::time::Duration;

use anyhow::Result;

use journeysim::config::Config;
use journeysim::journey::{self, Journey, Pacing};
use journeysim::logging::log_audit;
use journeysim::sink::SinkKind;

fn load_journey(arg: &str) -> Result<Journey> {
    if arg == "-" {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        return Journey::from_json(&raw);
    }
    if let Some(found) = journey::find_builtin(arg) {
        return Ok(found);
    }
    let raw = std::fs::read_to_string(arg)?;
    Journey::from_json(&raw)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    let arg = match std::env::args().nth(1) {
        Some(a) => a,
        None => {
            eprintln!("usage: replay <journey-id | script.json | -> [MODE=instant|staggered]");
            eprintln!();
            eprintln!("builtin journeys:");
            for j in journey::builtin() {
                eprintln!("  {:24} {} ({} steps)", j.id, j.title, j.steps.len());
            }
            return Ok(());
        }
    };

    let journey = match load_journey(&arg) {
        Ok(j) => j,
        Err(err) => {
            eprintln!("failed to load journey {}: {}", arg, err);
            std::process::exit(1);
        }
    };

    let pacing = match std::env::var("MODE").as_deref() {
        Ok("staggered") => Pacing::Staggered(Duration::from_millis(cfg.step_delay_ms)),
        _ => Pacing::Instant,
    };

    log_audit("replay", &cfg.config_hash(), &journey::script_hash(&journey));

    let mut sink = SinkKind::from_env().build(&cfg)?;
    let summary = journey::replay(&journey, sink.as_mut(), pacing).await;

    println!(
        "replayed {}: {} steps emitted, {} skipped",
        journey.id, summary.steps_emitted, summary.steps_skipped
    );
    if summary.steps_skipped > 0 {
        std::process::exit(1);
    }
    Ok(())
}
