//! aitr-schemas
//!
//! Shared value types for the trading engine: identifiers, signal types,
//! personality configuration, and the core entities (Trader, Portfolio,
//! Position, Order, Transaction, Decision, WeightHistory, DailyReport).
//!
//! Pure data: no IO, no async, no wall clock.

mod daily_report;
mod decision;
mod ids;
mod personality;
mod portfolio;
mod signal;
mod trader;
mod weight_history;

pub use daily_report::DailyReport;
pub use decision::{
    Decision, DecisionOutcome, DecisionType, MarketContext, PortfolioSnapshot, Reasoning,
    RiskRejection,
};
pub use ids::{
    DecisionId, OrderId, PortfolioId, PositionId, TraderId, TransactionId, WeightHistoryId,
    MICROS_SCALE,
};
pub use personality::{
    CapitalConfig, LearningConfig, Personality, PersonalityError, RiskConfig, RiskTolerance,
    ScheduleConfig, SentimentConfig, SignalsConfig, SizingMethod, TradingConfig, WatchlistConfig,
    parse_hhmm,
};
pub use portfolio::{
    BrokerProfile, CloseReason, OptionType, Order, OrderSide, OrderStatus, OrderType, Portfolio,
    Position, ProductType, Side, Transaction, TransactionKind, WarrantTerms,
};
pub use signal::{Agreement, Direction, SourceKind, Verdict};
pub use trader::{Trader, TraderCounters, TraderState};
