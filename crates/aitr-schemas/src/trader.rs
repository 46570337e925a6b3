use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PortfolioId, TraderId};
use crate::personality::Personality;

/// Lifecycle state for a [`Trader`] (§3, §4.6).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraderState {
    Stopped,
    Running,
    Paused,
}

/// Cumulative counters derived from a trader's Decisions + Positions.
///
/// Invariant (§8): these must stay consistent after any trade by being
/// recomputed from the decision/position history rather than incremented
/// ad hoc — see `aitr-runtime`'s recompute-from-decisions path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TraderCounters {
    pub decisions: u64,
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub total_pnl_micros: i64,
    pub best_trade_pnl_micros: i64,
    pub worst_trade_pnl_micros: i64,
    pub current_streak: i64,
    pub max_drawdown_pct: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trader {
    pub id: TraderId,
    pub name: String,
    pub personality: Personality,
    pub state: TraderState,
    pub portfolio_id: Option<PortfolioId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub counters: TraderCounters,
    /// Set when a configuration error forces a paused state outside of user
    /// intent (§7: "transition to paused with status_message").
    pub status_message: Option<String>,
}

impl Trader {
    pub fn new(name: impl Into<String>, personality: Personality, now: DateTime<Utc>) -> Self {
        Self {
            id: TraderId::new(),
            name: name.into(),
            personality,
            state: TraderState::Stopped,
            portfolio_id: None,
            created_at: now,
            updated_at: now,
            counters: TraderCounters::default(),
            status_message: None,
        }
    }
}
