//! In-process `Store` backed by `tokio::sync::RwLock`-guarded `BTreeMap`s.
//!
//! Grounded on `mqk-testkit`'s deterministic, no-external-IO fixture style:
//! every lookup is a plain map read, ordering is id-stable (`BTreeMap`
//! iterates in key order), and nothing here depends on wall clock or
//! randomness beyond what the caller passes in.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use aitr_schemas::{
    DailyReport, Decision, DecisionId, DecisionOutcome, Portfolio, PortfolioId, Trader, TraderId,
    Transaction, TransactionId, WeightHistory, WeightHistoryId,
};

use crate::{Store, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    traders: BTreeMap<TraderId, Trader>,
    portfolios: BTreeMap<PortfolioId, Portfolio>,
    decisions: BTreeMap<DecisionId, Decision>,
    weight_history: BTreeMap<WeightHistoryId, WeightHistory>,
    daily_reports: BTreeMap<(TraderId, NaiveDate), DailyReport>,
    transactions: BTreeMap<TransactionId, Transaction>,
}

/// Cheaply cloneable; all state lives behind the inner `Arc<RwLock<_>>` so
/// handing a `Store` to multiple `aitr-runtime` trader tasks is just a
/// clone.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_trader(&self, trader: &Trader) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        t.traders.insert(trader.id, trader.clone());
        Ok(())
    }

    async fn update_trader(&self, trader: &Trader) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        if !t.traders.contains_key(&trader.id) {
            return Err(StoreError::NotFound(format!("trader {}", trader.id)));
        }
        t.traders.insert(trader.id, trader.clone());
        Ok(())
    }

    async fn get_trader(&self, id: TraderId) -> StoreResult<Option<Trader>> {
        let t = self.inner.read().await;
        Ok(t.traders.get(&id).cloned())
    }

    async fn list_traders(&self) -> StoreResult<Vec<Trader>> {
        let t = self.inner.read().await;
        Ok(t.traders.values().cloned().collect())
    }

    async fn delete_trader(&self, id: TraderId) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        t.traders.remove(&id);
        Ok(())
    }

    async fn upsert_portfolio(&self, portfolio: &Portfolio) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        t.portfolios.insert(portfolio.id, portfolio.clone());
        Ok(())
    }

    async fn get_portfolio(&self, id: PortfolioId) -> StoreResult<Option<Portfolio>> {
        let t = self.inner.read().await;
        Ok(t.portfolios.get(&id).cloned())
    }

    async fn get_portfolio_for_trader(&self, trader_id: TraderId) -> StoreResult<Option<Portfolio>> {
        let t = self.inner.read().await;
        Ok(t.portfolios.values().find(|p| p.trader_id == trader_id).cloned())
    }

    async fn append_decision(&self, decision: &Decision) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        t.decisions.insert(decision.id, decision.clone());
        Ok(())
    }

    async fn get_decision(&self, id: DecisionId) -> StoreResult<Option<Decision>> {
        let t = self.inner.read().await;
        Ok(t.decisions.get(&id).cloned())
    }

    async fn set_decision_outcome(&self, id: DecisionId, outcome: DecisionOutcome) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        let decision = t
            .decisions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("decision {id}")))?;
        decision.outcome = Some(outcome);
        Ok(())
    }

    async fn list_decisions_for_trader(
        &self,
        trader_id: TraderId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<Decision>> {
        let t = self.inner.read().await;
        let mut out: Vec<Decision> = t
            .decisions
            .values()
            .filter(|d| d.trader_id == trader_id && d.created_at >= since && d.created_at < until)
            .cloned()
            .collect();
        out.sort_by_key(|d| d.created_at);
        Ok(out)
    }

    async fn append_weight_history(&self, entry: &WeightHistory) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        t.weight_history.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn list_weight_history(&self, trader_id: TraderId) -> StoreResult<Vec<WeightHistory>> {
        let t = self.inner.read().await;
        let mut out: Vec<WeightHistory> = t
            .weight_history
            .values()
            .filter(|w| w.trader_id == trader_id)
            .cloned()
            .collect();
        out.sort_by_key(|w| w.at);
        Ok(out)
    }

    async fn upsert_daily_report(&self, report: &DailyReport) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        t.daily_reports.insert((report.trader_id, report.date), report.clone());
        Ok(())
    }

    async fn get_daily_report(&self, trader_id: TraderId, date: NaiveDate) -> StoreResult<Option<DailyReport>> {
        let t = self.inner.read().await;
        Ok(t.daily_reports.get(&(trader_id, date)).cloned())
    }

    async fn list_daily_reports(&self, trader_id: TraderId) -> StoreResult<Vec<DailyReport>> {
        let t = self.inner.read().await;
        let mut out: Vec<DailyReport> = t
            .daily_reports
            .iter()
            .filter(|((tid, _), _)| *tid == trader_id)
            .map(|(_, r)| r.clone())
            .collect();
        out.sort_by_key(|r| r.date);
        Ok(out)
    }

    async fn append_transactions(&self, txns: &[Transaction]) -> StoreResult<()> {
        let mut t = self.inner.write().await;
        for txn in txns {
            t.transactions.insert(txn.id, txn.clone());
        }
        Ok(())
    }

    async fn list_transactions_for_portfolio(
        &self,
        portfolio_id: PortfolioId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>> {
        let t = self.inner.read().await;
        let mut out: Vec<Transaction> = t
            .transactions
            .values()
            .filter(|txn| txn.portfolio_id == portfolio_id && txn.at >= since && txn.at < until)
            .cloned()
            .collect();
        out.sort_by_key(|txn| txn.at);
        Ok(out)
    }
}
