//! Declarative journey scripts and their replay engine. A journey is pure
//! data: an ordered list of (actor, traits, event, properties, day offset)
//! steps. The replay engine walks the list in order, either back-dating
//! timestamps for an instant import or sleeping between steps so a live
//! dashboard shows gradual arrival.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::time::Duration as StdDuration;

use crate::event::UserType;
use crate::logging::{log_journey_step, log_sink_error, ProfileScope};
use crate::sink::TrackingSink;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyStep {
    pub user_id: String,
    pub user_type: UserType,
    #[serde(default)]
    pub traits: Map<String, Value>,
    pub event: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Fractional days before "now" this step happened. Only consulted by
    /// instant replay; staggered replay stamps steps as they are emitted.
    #[serde(default)]
    pub days_ago: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journey {
    pub id: String,
    pub title: String,
    pub steps: Vec<JourneyStep>,
}

impl Journey {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("journey script is not valid JSON")
    }
}

/// SHA-256 of the serialized script, for audit lines tying a run to the
/// exact steps it replayed.
pub fn script_hash(journey: &Journey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_string(journey).unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy)]
pub enum Pacing {
    /// Emit every step now, back-dated by its `days_ago` offset.
    Instant,
    /// Emit steps at the current time with a fixed gap between them.
    Staggered(StdDuration),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub steps_emitted: usize,
    pub steps_skipped: usize,
}

/// Replay a journey against a sink. Steps go out strictly in script order
/// as an identify/track pair per step. The first sink failure abandons the
/// rest of the script; nothing propagates to the caller.
pub async fn replay(
    journey: &Journey,
    sink: &mut dyn TrackingSink,
    pacing: Pacing,
) -> ReplaySummary {
    let _scope = ProfileScope::with_context(
        "journey",
        "replay",
        &[("journey_id", Value::String(journey.id.clone()))],
    );
    let mut emitted = 0usize;
    for (idx, step) in journey.steps.iter().enumerate() {
        if let Pacing::Staggered(delay) = pacing {
            if idx > 0 {
                tokio::time::sleep(delay).await;
            }
        }
        let ts = match pacing {
            Pacing::Instant => step
                .days_ago
                .map(|d| Utc::now() - Duration::milliseconds((d * 86_400_000.0) as i64))
                .unwrap_or_else(Utc::now),
            Pacing::Staggered(_) => Utc::now(),
        };

        if let Err(err) = sink.identify(&step.user_id, &step.traits, ts).await {
            log_sink_error("identify", &err.to_string());
            break;
        }
        if let Err(err) = sink.track(&step.event, &step.properties, ts).await {
            log_sink_error("track", &err.to_string());
            break;
        }
        emitted += 1;
        log_journey_step(&journey.id, idx, &step.event);
    }
    ReplaySummary {
        steps_emitted: emitted,
        steps_skipped: journey.steps.len() - emitted,
    }
}

// =============================================================================
// Builtin scripts
// =============================================================================

fn step(
    user_id: &str,
    user_type: UserType,
    traits: Value,
    event: &str,
    properties: Value,
    days_ago: f64,
) -> JourneyStep {
    JourneyStep {
        user_id: user_id.to_string(),
        user_type,
        traits: traits.as_object().cloned().unwrap_or_default(),
        event: event.to_string(),
        properties: properties.as_object().cloned().unwrap_or_default(),
        days_ago: Some(days_ago),
    }
}

/// The demo's stock journeys: one fictional actor each, multi-day arcs from
/// first touch to conversion (or churn).
pub fn builtin() -> Vec<Journey> {
    vec![
        Journey {
            id: "patient-activation".to_string(),
            title: "Anonymous visitor to active patient".to_string(),
            steps: vec![
                step(
                    "patient-0101",
                    UserType::Patient,
                    json!({"referral_source": "organic_search"}),
                    "Page Viewed",
                    json!({"page_name": "home", "path": "/"}),
                    6.0,
                ),
                step(
                    "patient-0101",
                    UserType::Patient,
                    json!({"email": "maya.reynolds@example.com"}),
                    "Content Downloaded",
                    json!({"content_title": "Understanding Exon-Skipping Therapy", "content_type": "brochure"}),
                    5.8,
                ),
                step(
                    "patient-0101",
                    UserType::Patient,
                    json!({"first_name": "Maya", "last_name": "Reynolds", "condition": "DMD"}),
                    "Account Created",
                    json!({"portal": "patient"}),
                    4.0,
                ),
                step(
                    "patient-0101",
                    UserType::Patient,
                    json!({}),
                    "Assessment Completed",
                    json!({"assessment": "symptom-tracker", "score": 14}),
                    3.0,
                ),
                step(
                    "patient-0101",
                    UserType::Patient,
                    json!({"genetic_testing": "pending"}),
                    "Genetic Testing Required",
                    json!({"test_panel": "exon-51"}),
                    1.0,
                ),
                step(
                    "patient-0101",
                    UserType::Patient,
                    json!({}),
                    "Portal Action Clicked",
                    json!({"action": "schedule-infusion"}),
                    0.2,
                ),
            ],
        },
        Journey {
            id: "hcp-engagement".to_string(),
            title: "HCP discovers the portal and requests a rep meeting".to_string(),
            steps: vec![
                step(
                    "hcp-0420",
                    UserType::Hcp,
                    json!({"specialty": "Pediatric Neurology"}),
                    "Page Viewed",
                    json!({"page_name": "hcp-portal", "path": "/hcp"}),
                    9.0,
                ),
                step(
                    "hcp-0420",
                    UserType::Hcp,
                    json!({"first_name": "Elena", "last_name": "Vasquez", "npi": "1932456789"}),
                    "HCP Account Created",
                    json!({"portal": "hcp"}),
                    8.5,
                ),
                step(
                    "hcp-0420",
                    UserType::Hcp,
                    json!({}),
                    "Resource Downloaded",
                    json!({"resource": "dosing-guide", "format": "pdf"}),
                    6.0,
                ),
                step(
                    "hcp-0420",
                    UserType::Hcp,
                    json!({}),
                    "Rep Meeting Requested",
                    json!({"territory": "northeast", "urgency": "routine"}),
                    2.0,
                ),
                step(
                    "hcp-0420",
                    UserType::Hcp,
                    json!({}),
                    "Portal Action Clicked",
                    json!({"action": "order-starter-kit"}),
                    0.5,
                ),
            ],
        },
        Journey {
            id: "trial-enrollment".to_string(),
            title: "Caregiver screens into the open-label extension trial".to_string(),
            steps: vec![
                step(
                    "participant-0077",
                    UserType::Patient,
                    json!({"relationship": "caregiver"}),
                    "Page Viewed",
                    json!({"page_name": "clinical-trials", "path": "/trials/ole-302"}),
                    12.0,
                ),
                step(
                    "participant-0077",
                    UserType::Patient,
                    json!({"first_name": "Jordan", "last_name": "Lee"}),
                    "Trial Screening Started",
                    json!({"trial_id": "OLE-302"}),
                    11.5,
                ),
                step(
                    "participant-0077",
                    UserType::Patient,
                    json!({"ambulatory_status": "non-ambulatory"}),
                    "Eligibility Determined",
                    json!({"trial_id": "OLE-302", "eligible": true}),
                    7.0,
                ),
                step(
                    "participant-0077",
                    UserType::Patient,
                    json!({"enrolled_trial": "OLE-302"}),
                    "Participant Enrolled",
                    json!({"trial_id": "OLE-302", "site": "Boston Children's"}),
                    2.5,
                ),
            ],
        },
        Journey {
            id: "lead-conversion".to_string(),
            title: "Campaign click converts to a contactable lead".to_string(),
            steps: vec![
                step(
                    "lead-0533",
                    UserType::Admin,
                    json!({}),
                    "Page Viewed",
                    json!({"page_name": "home", "path": "/", "utm_source": "facebook", "utm_campaign": "caregiver-stories"}),
                    3.0,
                ),
                step(
                    "lead-0533",
                    UserType::Admin,
                    json!({}),
                    "Page Viewed",
                    json!({"page_name": "treatments", "path": "/treatments"}),
                    2.9,
                ),
                step(
                    "lead-0533",
                    UserType::Admin,
                    json!({"email": "sam.ortiz@example.com"}),
                    "Content Downloaded",
                    json!({"content_title": "Caregiver Support Guide", "content_type": "guide"}),
                    2.8,
                ),
                step(
                    "lead-0533",
                    UserType::Admin,
                    json!({"phone": "+1-555-0117"}),
                    "Contact Form Submitted",
                    json!({"topic": "treatment-eligibility"}),
                    1.0,
                ),
            ],
        },
        Journey {
            id: "patient-churn".to_string(),
            title: "Enrolled patient disengages and deactivates".to_string(),
            steps: vec![
                step(
                    "patient-0218",
                    UserType::Patient,
                    json!({"first_name": "Theo", "last_name": "Brandt", "condition": "DMD"}),
                    "Page Viewed",
                    json!({"page_name": "patient-portal", "path": "/portal"}),
                    14.0,
                ),
                step(
                    "patient-0218",
                    UserType::Patient,
                    json!({}),
                    "Infusion Appointment Missed",
                    json!({"appointment_id": "inf-5512"}),
                    10.0,
                ),
                step(
                    "patient-0218",
                    UserType::Patient,
                    json!({}),
                    "Support Ticket Opened",
                    json!({"category": "insurance-coverage"}),
                    9.0,
                ),
                step(
                    "patient-0218",
                    UserType::Patient,
                    json!({"portal_status": "deactivated"}),
                    "Account Deactivated",
                    json!({"reason": "coverage-denied"}),
                    2.0,
                ),
            ],
        },
    ]
}

/// Look up a builtin script by id.
pub fn find_builtin(id: &str) -> Option<Journey> {
    builtin().into_iter().find(|j| j.id == id)
}
