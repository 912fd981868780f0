use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Map;

use journeysim::attribution;
use journeysim::config::Config;
use journeysim::event::UserType;
use journeysim::live::{LiveSimulator, SIM_USER};
use journeysim::logging::{json_log, log_audit, log_session_summary, obj, v_num, v_str};
use journeysim::population::PAGES;
use journeysim::sink::SinkKind;
use journeysim::store::{Store, KEY_LAST_PATIENT_ID};
use journeysim::tracker::Tracker;

fn page_name_for(path: &str) -> &str {
    PAGES
        .iter()
        .find(|(_, p)| *p == path)
        .map(|(name, _)| *name)
        .unwrap_or("landing")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    json_log(
        "startup",
        obj(&[
            ("config_hash", v_str(&cfg.config_hash())),
            ("site_base", v_str(&cfg.site_base)),
            ("events_per_minute", v_num(cfg.events_per_minute as f64)),
        ]),
    );
    log_audit("startup", &cfg.config_hash(), "-");

    let mut store = Store::open(&cfg.store_path)?;
    store.init()?;

    // The landing URL of this simulated session comes from the environment,
    // standing in for the browser address bar.
    let query = std::env::var("LANDING_QUERY").unwrap_or_default();
    let referrer = std::env::var("REFERRER").ok();
    let attribution =
        attribution::capture(&query, &cfg.landing_page, referrer.as_deref(), &mut store);
    json_log(
        "attribution",
        obj(&[(
            "status",
            v_str(if attribution.is_some() { "present" } else { "none" }),
        )]),
    );

    let kind = SinkKind::from_env();
    match kind {
        SinkKind::Segment => {
            json_log("sink", obj(&[("type", v_str("segment")), ("status", v_str("live"))]))
        }
        SinkKind::Null => {
            json_log("sink", obj(&[("type", v_str("null")), ("status", v_str("stub"))]))
        }
    }
    let sink = kind.build(&cfg)?;
    let mut tracker = Tracker::new(sink, attribution, &cfg);

    // A deep link naming a user wins over the remembered session.
    if let Some(user_id) = attribution::user_id_hint(&query) {
        json_log("deep_link", obj(&[("user_id", v_str(&user_id))]));
        tracker.identify(&user_id, Map::new()).await;
    } else if let Some(patient_id) = store.get(KEY_LAST_PATIENT_ID)? {
        json_log(
            "session_restore",
            obj(&[("user_id", v_str(&patient_id))]),
        );
        tracker.identify(&patient_id, Map::new()).await;
    }

    // The session opens on the landing page.
    tracker
        .page_view(
            UserType::Admin,
            SIM_USER,
            page_name_for(&cfg.landing_page),
            &cfg.landing_page,
        )
        .await;

    let sim = LiveSimulator::new();
    sim.start();
    let started = std::time::Instant::now();
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let live_summary = sim.run(&cfg, &mut tracker, &mut rng).await;

    let stats = tracker.stats();
    log_session_summary(
        started.elapsed().as_secs(),
        stats.emitted + stats.identifies,
        stats.emitted,
        stats.identifies,
        live_summary.journeys_replayed,
        stats.sink_errors,
    );
    json_log(
        "shutdown",
        obj(&[
            ("ticks", v_num(live_summary.ticks as f64)),
            ("events_logged", v_num(tracker.log().len() as f64)),
            ("deduped", v_num(stats.deduped as f64)),
        ]),
    );
    Ok(())
}
