//! Marketing attribution: capture UTM and click-id parameters from a landing
//! URL once, persist them, and merge them into every tracked event.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::logging::{log_attribution_captured, ts_epoch_ms, ts_now};
use crate::store::{Store, KEY_ATTRIBUTION};

/// Query keys that mark a visit as campaign traffic. Any one of them present
/// triggers a fresh capture that overwrites the stored record.
pub const RECOGNIZED_KEYS: [&str; 7] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketingAttribution {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    pub gclid: Option<String>,
    pub fbclid: Option<String>,
    pub referrer: Option<String>,
    pub landing_page: String,
    pub ts: String,
    pub session_id: String,
}

impl MarketingAttribution {
    /// Merge attribution fields into an event property bag under fixed key
    /// names. Absent optional fields stay absent; the capture timestamp is
    /// not copied onto events.
    pub fn merge_into(&self, props: &mut Map<String, Value>) {
        let mut put = |key: &str, value: &Option<String>| {
            if let Some(v) = value {
                props.insert(key.to_string(), Value::String(v.clone()));
            }
        };
        put("utm_source", &self.utm_source);
        put("utm_medium", &self.utm_medium);
        put("utm_campaign", &self.utm_campaign);
        put("utm_term", &self.utm_term);
        put("utm_content", &self.utm_content);
        put("gclid", &self.gclid);
        put("fbclid", &self.fbclid);
        put("referrer", &self.referrer);
        props.insert(
            "landing_page".to_string(),
            Value::String(self.landing_page.clone()),
        );
        props.insert(
            "session_id".to_string(),
            Value::String(self.session_id.clone()),
        );
    }
}

/// Parse a raw query string (leading '?' tolerated) into pairs.
fn parse_query(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn first_value(pairs: &[(String, String)], key: &str) -> Option<String> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}

fn mint_session_id() -> String {
    let tag: u32 = rand::thread_rng().gen_range(0..0x1_0000);
    format!("sess-{}-{:04x}", ts_epoch_ms(), tag)
}

/// Capture flow, run once at startup: if the query carries any recognized
/// key, build a fresh record and persist it, overwriting any prior one.
/// Otherwise fall back to whatever was stored earlier. Storage failures in
/// either direction degrade to "no attribution" without surfacing an error.
pub fn capture(
    query: &str,
    landing_page: &str,
    referrer: Option<&str>,
    store: &mut Store,
) -> Option<MarketingAttribution> {
    let pairs = parse_query(query);
    let has_recognized = pairs
        .iter()
        .any(|(k, _)| RECOGNIZED_KEYS.contains(&k.as_str()));

    if !has_recognized {
        return load_stored(store);
    }

    let record = MarketingAttribution {
        utm_source: first_value(&pairs, "utm_source"),
        utm_medium: first_value(&pairs, "utm_medium"),
        utm_campaign: first_value(&pairs, "utm_campaign"),
        utm_term: first_value(&pairs, "utm_term"),
        utm_content: first_value(&pairs, "utm_content"),
        gclid: first_value(&pairs, "gclid"),
        fbclid: first_value(&pairs, "fbclid"),
        referrer: referrer.map(|r| r.to_string()),
        landing_page: landing_page.to_string(),
        ts: ts_now(),
        session_id: mint_session_id(),
    };

    if let Ok(json) = serde_json::to_string(&record) {
        let _ = store.set(KEY_ATTRIBUTION, &json);
    }
    log_attribution_captured(
        record.utm_source.as_deref().unwrap_or(""),
        record.utm_medium.as_deref().unwrap_or(""),
        record.utm_campaign.as_deref().unwrap_or(""),
    );
    Some(record)
}

fn load_stored(store: &Store) -> Option<MarketingAttribution> {
    let json = store.get(KEY_ATTRIBUTION).ok().flatten()?;
    serde_json::from_str(&json).ok()
}

/// Ad hoc `userId` query parameter carried by select deep links.
pub fn user_id_hint(query: &str) -> Option<String> {
    first_value(&parse_query(query), "userId").filter(|v| !v.is_empty())
}
