//! Postgres-backed `Store`, grounded on `mqk-db`'s pool/migration pattern
//! (`connect_from_env`, `migrate`) but using runtime-checked `sqlx::query`/
//! `sqlx::query_as::<_, (...)>` calls rather than the `query!`/`query_as!`
//! macros — `mqk-db/src/md.rs` itself favors the runtime-checked forms at
//! its actual call sites even though the `macros` feature stays enabled on
//! the `sqlx` dependency, and runtime checks are the only form that doesn't
//! need a live database or `SQLX_OFFLINE` metadata at build time.
//!
//! Each entity is stored in its own table keyed by id, with a handful of
//! indexed scalar columns for the lookups §6 actually needs (trader_id,
//! created_at, date) plus a `data JSONB` column holding the full
//! `serde_json`-serialized value. `Decision.reasoning`, `.market_context`,
//! and `.portfolio_snapshot` ride inside that same blob rather than getting
//! their own columns, per the §9 Design Note.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use aitr_schemas::{
    DailyReport, Decision, DecisionId, DecisionOutcome, Portfolio, PortfolioId, Trader, TraderId,
    Transaction, WeightHistory,
};

use crate::{Store, StoreError, StoreResult};

pub const ENV_DATABASE_URL: &str = "AITR_DATABASE_URL";

/// Connects using `AITR_DATABASE_URL` from the environment, mirroring
/// `mqk-db::connect_from_env`.
pub async fn connect_from_env() -> StoreResult<PgPool> {
    let url = std::env::var(ENV_DATABASE_URL)
        .map_err(|_| StoreError::Backend(format!("{ENV_DATABASE_URL} not set")))?;
    PgPool::connect(&url)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))
}

/// Applies the embedded migration set. Safe to call on every daemon start;
/// `sqlx::migrate!` tracks applied versions in its own bookkeeping table.
pub async fn migrate(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> StoreResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Backend(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> StoreResult<T> {
    serde_json::from_value(value).map_err(|e| StoreError::Backend(e.to_string()))
}

#[async_trait]
impl Store for PgStore {
    async fn create_trader(&self, trader: &Trader) -> StoreResult<()> {
        let data = to_json(trader)?;
        sqlx::query(
            "insert into traders (id, name, state, updated_at, data) values ($1, $2, $3, $4, $5)
             on conflict (id) do update set name = $2, state = $3, updated_at = $4, data = $5",
        )
        .bind(trader.id.0)
        .bind(&trader.name)
        .bind(format!("{:?}", trader.state))
        .bind(trader.updated_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn update_trader(&self, trader: &Trader) -> StoreResult<()> {
        self.create_trader(trader).await
    }

    async fn get_trader(&self, id: TraderId) -> StoreResult<Option<Trader>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("select data from traders where id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(|(data,)| from_json(data)).transpose()
    }

    async fn list_traders(&self) -> StoreResult<Vec<Trader>> {
        let rows: Vec<(serde_json::Value,)> =
            sqlx::query_as("select data from traders order by updated_at desc")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.into_iter().map(|(data,)| from_json(data)).collect()
    }

    async fn delete_trader(&self, id: TraderId) -> StoreResult<()> {
        sqlx::query("delete from traders where id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn upsert_portfolio(&self, portfolio: &Portfolio) -> StoreResult<()> {
        let data = to_json(portfolio)?;
        sqlx::query(
            "insert into portfolios (id, trader_id, data) values ($1, $2, $3)
             on conflict (id) do update set data = $3",
        )
        .bind(portfolio.id.0)
        .bind(portfolio.trader_id.0)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_portfolio(&self, id: PortfolioId) -> StoreResult<Option<Portfolio>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("select data from portfolios where id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(|(data,)| from_json(data)).transpose()
    }

    async fn get_portfolio_for_trader(&self, trader_id: TraderId) -> StoreResult<Option<Portfolio>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("select data from portfolios where trader_id = $1 limit 1")
                .bind(trader_id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(|(data,)| from_json(data)).transpose()
    }

    async fn append_decision(&self, decision: &Decision) -> StoreResult<()> {
        let data = to_json(decision)?;
        sqlx::query(
            "insert into decisions (id, trader_id, symbol, created_at, data)
             values ($1, $2, $3, $4, $5)
             on conflict (id) do update set data = $5",
        )
        .bind(decision.id.0)
        .bind(decision.trader_id.0)
        .bind(&decision.symbol)
        .bind(decision.created_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_decision(&self, id: DecisionId) -> StoreResult<Option<Decision>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("select data from decisions where id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(|(data,)| from_json(data)).transpose()
    }

    async fn set_decision_outcome(&self, id: DecisionId, outcome: DecisionOutcome) -> StoreResult<()> {
        let mut decision: Decision = self
            .get_decision(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("decision {id}")))?;
        decision.outcome = Some(outcome);
        self.append_decision(&decision).await
    }

    async fn list_decisions_for_trader(
        &self,
        trader_id: TraderId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<Decision>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "select data from decisions
             where trader_id = $1 and created_at >= $2 and created_at < $3
             order by created_at asc",
        )
        .bind(trader_id.0)
        .bind(since)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.into_iter().map(|(data,)| from_json(data)).collect()
    }

    async fn append_weight_history(&self, entry: &WeightHistory) -> StoreResult<()> {
        let data = to_json(entry)?;
        sqlx::query(
            "insert into weight_history (id, trader_id, at, data) values ($1, $2, $3, $4)
             on conflict (id) do update set data = $4",
        )
        .bind(entry.id.0)
        .bind(entry.trader_id.0)
        .bind(entry.at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_weight_history(&self, trader_id: TraderId) -> StoreResult<Vec<WeightHistory>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "select data from weight_history where trader_id = $1 order by at asc",
        )
        .bind(trader_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.into_iter().map(|(data,)| from_json(data)).collect()
    }

    async fn upsert_daily_report(&self, report: &DailyReport) -> StoreResult<()> {
        let data = to_json(report)?;
        sqlx::query(
            "insert into daily_reports (trader_id, date, data) values ($1, $2, $3)
             on conflict (trader_id, date) do update set data = $3",
        )
        .bind(report.trader_id.0)
        .bind(report.date)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_daily_report(&self, trader_id: TraderId, date: NaiveDate) -> StoreResult<Option<DailyReport>> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            "select data from daily_reports where trader_id = $1 and date = $2",
        )
        .bind(trader_id.0)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.map(|(data,)| from_json(data)).transpose()
    }

    async fn list_daily_reports(&self, trader_id: TraderId) -> StoreResult<Vec<DailyReport>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "select data from daily_reports where trader_id = $1 order by date asc",
        )
        .bind(trader_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.into_iter().map(|(data,)| from_json(data)).collect()
    }

    async fn append_transactions(&self, txns: &[Transaction]) -> StoreResult<()> {
        for txn in txns {
            let data = to_json(txn)?;
            sqlx::query(
                "insert into transactions (id, portfolio_id, at, data) values ($1, $2, $3, $4)
                 on conflict (id) do update set data = $4",
            )
            .bind(txn.id.0)
            .bind(txn.portfolio_id.0)
            .bind(txn.at)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn list_transactions_for_portfolio(
        &self,
        portfolio_id: PortfolioId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "select data from transactions
             where portfolio_id = $1 and at >= $2 and at < $3
             order by at asc",
        )
        .bind(portfolio_id.0)
        .bind(since)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        rows.into_iter().map(|(data,)| from_json(data)).collect()
    }
}
