use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ids::TraderId;
use crate::signal::SourceKind;

/// One calendar day's rollup for a trader, produced at end-of-day close-out
/// (§4.6 supplement, §GLOSSARY "Daily report").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub trader_id: TraderId,
    pub date: NaiveDate,
    pub start_value_micros: i64,
    pub end_value_micros: i64,
    pub pnl_micros: i64,
    pub pnl_pct: f64,
    pub fees_paid_micros: i64,
    pub trades_opened: u32,
    pub trades_closed: u32,
    pub win_count: u32,
    pub loss_count: u32,
    pub win_rate: f64,
    pub best_trade_pnl_micros: Option<i64>,
    pub worst_trade_pnl_micros: Option<i64>,
    pub per_source_accuracy: BTreeMap<SourceKind, f64>,
    /// Free-text, advisory-only observations (§9: never fed back into
    /// `LearningLoop`, human-facing only).
    pub insights: Vec<String>,
}

impl DailyReport {
    pub fn win_rate_from_counts(wins: u32, losses: u32) -> f64 {
        let total = wins + losses;
        if total == 0 {
            0.0
        } else {
            wins as f64 / total as f64
        }
    }
}
