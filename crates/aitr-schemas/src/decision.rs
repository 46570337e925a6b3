use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DecisionId, OrderId, PortfolioId, PositionId, TraderId};
use crate::signal::{Agreement, SourceKind, Verdict};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionType {
    Buy,
    Sell,
    Short,
    Close,
    Hold,
    Skip,
}

/// The ten-stage pipeline's rejection tags, in check order (§4.3). `None`
/// when the decision was not rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskRejection {
    InsufficientConfidence,
    InsufficientAgreement,
    MaxPositionsReached,
    LossCooldownActive,
    DailyLossLimitHit,
    DrawdownLimitHit,
    PositionSizeTooLarge,
    InsufficientCash,
    TotalExposureLimitHit,
    OutsideTradingWindow,
}

impl std::fmt::Display for RiskRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InsufficientConfidence => "insufficient_confidence",
            Self::InsufficientAgreement => "insufficient_agreement",
            Self::MaxPositionsReached => "max_positions_reached",
            Self::LossCooldownActive => "loss_cooldown_active",
            Self::DailyLossLimitHit => "daily_loss_limit_hit",
            Self::DrawdownLimitHit => "drawdown_limit_hit",
            Self::PositionSizeTooLarge => "position_size_too_large",
            Self::InsufficientCash => "insufficient_cash",
            Self::TotalExposureLimitHit => "total_exposure_limit_hit",
            Self::OutsideTradingWindow => "outside_trading_window",
        };
        write!(f, "{s}")
    }
}

/// Typed reasoning payload (§9 Design Note: stored as JSON at rest, but
/// carried as a real Rust type everywhere in memory rather than a loose map).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Reasoning {
    Fused {
        per_source: BTreeMap<SourceKind, Verdict>,
        weighted_score: f64,
        agreement: Agreement,
    },
    Rejected {
        stage: RiskRejection,
        detail: String,
    },
    Forced {
        detail: String,
    },
}

/// Snapshot of the market at decision time, enough to reconstruct "why" in
/// the SSE feed and UI without re-querying historical prices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub symbol: String,
    pub price_micros: i64,
    pub day_change_pct: f64,
    pub volatility: f64,
    pub volume: f64,
}

/// Portfolio state at decision time, for post-hoc explanation and audit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash_micros: i64,
    pub equity_micros: i64,
    pub open_position_count: u32,
    pub margin_used_micros: i64,
    pub daily_pnl_micros: i64,
}

/// Deferred outcome attribution, attached once the resulting trade closes or
/// expires (§4.5, §4.7).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub pnl_micros: i64,
    pub pnl_pct: f64,
    pub holding_days: i64,
    pub was_correct: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub trader_id: TraderId,
    pub portfolio_id: PortfolioId,
    pub symbol: String,
    /// Every symbol considered in the same tick as this one (§4: a tick
    /// evaluates the whole watchlist; each symbol still gets its own
    /// Decision, but carries the sibling set for audit).
    pub symbols_analyzed: Vec<String>,
    pub decision_type: DecisionType,
    pub confidence: f64,
    pub reasoning: Reasoning,
    pub market_context: MarketContext,
    pub portfolio_snapshot: PortfolioSnapshot,
    pub rejected_by: Option<RiskRejection>,
    /// True once the ledger call backing this decision actually ran and
    /// succeeded; false for hold/skip/rejected/ledger-failed decisions.
    pub executed: bool,
    pub resulting_position_id: Option<PositionId>,
    pub resulting_order_id: Option<OrderId>,
    /// Set when PortfolioLedger rejected an otherwise risk-approved trade
    /// (§7 "Ledger failure"): `executed` stays false and `rejected_by`
    /// stays `None`, since this is not a RiskGate rejection.
    pub execution_error: Option<String>,
    /// Short human-readable recap of what happened, for the SSE feed / UI.
    pub summary: String,
    pub outcome: Option<DecisionOutcome>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn is_actionable(&self) -> bool {
        !matches!(self.decision_type, DecisionType::Hold | DecisionType::Skip)
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected_by.is_some()
    }
}
