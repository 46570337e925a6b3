//! aitr-config
//!
//! Layered YAML configuration loading + canonicalization, global engine
//! knobs, the IANA-aware trading calendar, and slim secrets resolution.

pub mod calendar;
mod secrets;

pub use calendar::{CalendarError, TradingCalendar};
pub use secrets::{resolve_secrets, ResolvedSecrets};

use std::fs;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Engine-wide knobs that are not per-trader (§6). Loaded once at daemon
/// startup, independent of any individual trader's [`aitr_schemas::Personality`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Wall-clock budget for one full scheduler tick across all of a
    /// trader's watchlist symbols, in seconds.
    pub tick_timeout_secs: u64,
    /// Wall-clock budget for a single signal source call, in seconds.
    pub source_timeout_secs: u64,
    /// Upper bound on concurrently running trader tasks.
    pub max_concurrent_traders: usize,
    /// How often the learning loop re-evaluates source weights, in hours.
    pub learning_interval_hours: i64,
    /// Capacity of the broadcast channel backing the SSE event feed.
    pub event_bus_capacity: usize,
    pub daemon_addr: String,
    pub database_url: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            tick_timeout_secs: 30,
            source_timeout_secs: 5,
            max_concurrent_traders: 64,
            learning_interval_hours: 24,
            event_bus_capacity: 1024,
            daemon_addr: "127.0.0.1:8899".to_string(),
            database_url: None,
        }
    }
}

/// Load + deep-merge YAML files in order (later files override earlier
/// ones), then canonicalize to JSON and hash the result. Mirrors the
/// layered-config approach used for broker/session configuration, adapted
/// here for `GlobalConfig` and trader `Personality` overlays.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(&s).with_context(|| format!("parse yaml: {p}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    let canonical = canonicalize_json(&merged);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

impl LoadedConfig {
    /// Deserializes a pointer path within the loaded config into `T`, e.g.
    /// `"/global"` for [`GlobalConfig`] or `"/traders/0/personality"` for a
    /// [`aitr_schemas::Personality`] override.
    pub fn deserialize_at<T: serde::de::DeserializeOwned>(&self, pointer: &str) -> Result<T> {
        let v = self
            .config_json
            .pointer(pointer)
            .with_context(|| format!("config pointer not found: {pointer}"))?;
        serde_json::from_value(v.clone()).with_context(|| format!("bad shape at {pointer}"))
    }
}

fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_overrides_scalars_and_keeps_siblings() {
        let mut a = serde_json::json!({"risk": {"stopLossPct": 0.05, "takeProfitPct": 0.1}});
        let b = serde_json::json!({"risk": {"stopLossPct": 0.08}});
        deep_merge(&mut a, b);
        assert_eq!(a["risk"]["stopLossPct"], 0.08);
        assert_eq!(a["risk"]["takeProfitPct"], 0.1);
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let v = serde_json::json!({"b": 1, "a": 2});
        assert_eq!(canonicalize_json(&v), r#"{"a":2,"b":1}"#);
    }
}
