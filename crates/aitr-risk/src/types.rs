//! Value types for the ten-stage RiskGate (§4.3): sticky per-trader state
//! carried tick to tick, and the per-decision input snapshot the engine
//! evaluates against.

use chrono::{DateTime, Utc};

/// Sticky state a RiskGate carries across ticks for one trader, mirroring
/// `mqk-risk`'s `RiskState` day-rollover/peak-equity bookkeeping.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskState {
    pub day: chrono::NaiveDate,
    pub day_start_equity_micros: i64,
    pub peak_equity_micros: i64,
    pub consecutive_losses: u32,
    pub last_loss_closed_at: Option<DateTime<Utc>>,
}

impl RiskState {
    pub fn new(now: DateTime<Utc>, equity_micros: i64) -> Self {
        Self {
            day: now.date_naive(),
            day_start_equity_micros: equity_micros,
            peak_equity_micros: equity_micros,
            consecutive_losses: 0,
            last_loss_closed_at: None,
        }
    }

    /// Rolls the day-start equity forward and refreshes the running peak.
    /// Must run before `evaluate` is called for a given tick, mirroring
    /// `mqk-risk::engine::tick`'s role ahead of `evaluate`.
    pub fn tick(&mut self, now: DateTime<Utc>, equity_micros: i64) {
        let today = now.date_naive();
        if today != self.day {
            self.day = today;
            self.day_start_equity_micros = equity_micros;
        }
        if equity_micros > self.peak_equity_micros {
            self.peak_equity_micros = equity_micros;
        }
    }

    /// Records a closed trade's outcome for the loss-cooldown check (§4.3
    /// check 4). Only losing closes extend the streak; any other outcome
    /// resets it.
    pub fn record_trade_close(&mut self, realized_pnl_micros: i64, closed_at: DateTime<Utc>) {
        if realized_pnl_micros < 0 {
            self.consecutive_losses += 1;
            self.last_loss_closed_at = Some(closed_at);
        } else {
            self.consecutive_losses = 0;
            self.last_loss_closed_at = None;
        }
    }
}

/// Everything a single RiskGate evaluation needs (§4.3). `candidate_*`
/// fields carry the provisional sizing estimate the caller computes with
/// the same pure formula `PositionSizer` will later use for the real
/// allocation — RiskGate never sizes a trade itself, it only judges a
/// caller-supplied candidate (see DESIGN.md for the ordering rationale).
#[derive(Clone, Debug, PartialEq)]
pub struct RiskInput {
    pub now: DateTime<Utc>,
    pub is_close: bool,
    pub weighted_confidence: f64,
    pub agreement_fraction: f64,
    pub equity_micros: i64,
    pub cash_after_trade_micros: i64,
    pub initial_budget_micros: i64,
    pub open_position_count: u32,
    pub existing_symbol_exposure_micros: i64,
    pub candidate_notional_micros: i64,
    pub total_exposure_after_trade_micros: i64,
}
