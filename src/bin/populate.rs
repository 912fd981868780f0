//! One-shot bulk population run: mints the configured cohorts against the
//! configured sink and prints a summary. SEED pins the population; rerunning
//! with the same seed and config emits the identical call stream.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;

use journeysim::config::Config;
use journeysim::logging::log_audit;
use journeysim::population;
use journeysim::sink::SinkKind;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    log_audit("populate", &cfg.config_hash(), "-");

    eprintln!(
        "[populate] visitors={} patients={} hcps={} participants={} seed={}",
        cfg.visitors, cfg.patients, cfg.hcps, cfg.participants, cfg.seed
    );

    let mut sink = SinkKind::from_env().build(&cfg)?;
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let report = match population::generate(&cfg, sink.as_mut(), &mut rng).await {
        Ok(r) => r,
        Err(err) => {
            eprintln!("population generation failed: {}", err);
            std::process::exit(1);
        }
    };

    println!();
    println!("=== Population Report ===");
    println!("Visitors: {}", report.visitors);
    println!("Patients: {}", report.patients);
    println!("HCPs: {}", report.hcps);
    println!("Trial participants: {}", report.participants);
    println!("Total users: {}", report.total_users());
    println!("Track calls: {}", report.events_emitted);
    println!("Identify calls: {}", report.identifies_emitted);
    println!("Sink errors: {}", report.sink_errors);
    Ok(())
}
