//! Command handler modules for aitr-cli.
//!
//! Shared utilities used by multiple command paths live here. Command-specific
//! logic lives in the submodules.

pub mod db;
pub mod trader;

use std::fs;

use anyhow::{Context, Result};
use uuid::Uuid;

use aitr_schemas::{Personality, TraderId};

/// Parses a `TraderId` out of its UUID string form, the same shape
/// `aitr-daemon`'s path params accept.
pub fn parse_trader_id(raw: &str) -> Result<TraderId> {
    let uuid = Uuid::parse_str(raw).with_context(|| format!("bad trader id: {raw}"))?;
    Ok(TraderId::from_uuid(uuid))
}

/// Loads a [`Personality`] from a JSON file on disk.
pub fn load_personality(path: &str) -> Result<Personality> {
    let raw = fs::read_to_string(path).with_context(|| format!("read personality file: {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parse personality file: {path}"))
}
