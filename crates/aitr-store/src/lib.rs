//! aitr-store
//!
//! Persistence for Traders, Portfolios, Decisions, WeightHistory, and
//! DailyReports (§6, §9 Design Note). Two implementations share one
//! `Store` trait, the way `mqk-db` separates its schema/pool plumbing from
//! the in-memory fixtures `mqk-testkit` builds on top of it:
//!
//! - [`memory::InMemoryStore`]: `tokio::sync::RwLock`-guarded in-process
//!   maps, for tests and single-process daemon deployments without a
//!   database.
//! - [`pg::PgStore`]: `sqlx::PgPool`-backed, storing each entity as a row
//!   keyed by its id plus a `data JSONB` column holding the full serialized
//!   value (the same opaque-JSON-column approach `mqk-db::insert_run` uses
//!   for its `config_json` field). This keeps the schema small while still
//!   giving indexed, typed columns for the lookup keys §6 actually queries
//!   by (trader_id, symbol, at).
//!
//! Per §9 Design Note, `reasoning`, `market_context`, and `portfolio_snapshot`
//! inside a `Decision` are stored as opaque JSON; the `Store` trait itself
//! only ever hands callers back fully-typed `aitr_schemas` values.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use aitr_schemas::{
    DailyReport, Decision, DecisionId, DecisionOutcome, Portfolio, PortfolioId, Trader, TraderId,
    Transaction, WeightHistory,
};

pub use memory::InMemoryStore;
pub use pg::PgStore;

/// Errors a `Store` implementation can return. Deliberately small: callers
/// (the daemon's HTTP handlers) translate `NotFound` into 404s and
/// `Backend` into 500s, matching the `mqk-db::DbError`-style boundary
/// between "this row doesn't exist" and "something went wrong".
#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Backend(msg) => write!(f, "store backend error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

/// The persistence boundary consumed by `aitr-runtime` and `aitr-daemon`.
/// Every method is keyed off the `aitr_schemas` id types rather than raw
/// UUIDs so a caller can't accidentally mix up a `TraderId` and a
/// `PortfolioId` at a call site.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_trader(&self, trader: &Trader) -> StoreResult<()>;
    async fn update_trader(&self, trader: &Trader) -> StoreResult<()>;
    async fn get_trader(&self, id: TraderId) -> StoreResult<Option<Trader>>;
    async fn list_traders(&self) -> StoreResult<Vec<Trader>>;
    async fn delete_trader(&self, id: TraderId) -> StoreResult<()>;

    async fn upsert_portfolio(&self, portfolio: &Portfolio) -> StoreResult<()>;
    async fn get_portfolio(&self, id: PortfolioId) -> StoreResult<Option<Portfolio>>;
    async fn get_portfolio_for_trader(&self, trader_id: TraderId) -> StoreResult<Option<Portfolio>>;

    /// Appends a freshly produced decision. Decisions are immutable once
    /// written except for the deferred `outcome` attached by
    /// `set_decision_outcome` (§4.7).
    async fn append_decision(&self, decision: &Decision) -> StoreResult<()>;
    async fn get_decision(&self, id: DecisionId) -> StoreResult<Option<Decision>>;
    async fn set_decision_outcome(&self, id: DecisionId, outcome: DecisionOutcome) -> StoreResult<()>;
    /// Range read by (trader, [since, until)) that `aitr-learning`'s
    /// accuracy window and the daemon's decision-history route both need
    /// (§6).
    async fn list_decisions_for_trader(
        &self,
        trader_id: TraderId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<Decision>>;

    async fn append_weight_history(&self, entry: &WeightHistory) -> StoreResult<()>;
    async fn list_weight_history(&self, trader_id: TraderId) -> StoreResult<Vec<WeightHistory>>;

    async fn upsert_daily_report(&self, report: &DailyReport) -> StoreResult<()>;
    async fn get_daily_report(&self, trader_id: TraderId, date: NaiveDate) -> StoreResult<Option<DailyReport>>;
    async fn list_daily_reports(&self, trader_id: TraderId) -> StoreResult<Vec<DailyReport>>;

    /// Persists the transactions a tick's ledger calls appended (opens,
    /// closes, overnight fees, theta decay). Batched per tick rather than
    /// one call per transaction, matching how `aitr-execution` already
    /// collects them into a single `Vec` before handing them back.
    async fn append_transactions(&self, txns: &[Transaction]) -> StoreResult<()>;
    /// Feeds `DailyReport` aggregation (fees paid, trades opened/closed) and
    /// the daemon's trading-history route.
    async fn list_transactions_for_portfolio(
        &self,
        portfolio_id: PortfolioId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>>;
}
