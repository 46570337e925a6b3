//! The `Engine`: owns the store, the event bus, one cooperative scheduler
//! task per running trader, and the sticky per-trader [`RiskState`] the
//! RiskGate consults tick to tick. Grounded on `mqk-daemon::state::AppState`
//! — a shared, `Arc`-wrapped handle the HTTP layer clones into every
//! request — generalized from one daemon-wide status value to a registry of
//! independently schedulable traders.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use aitr_broker_paper::zero_cost;
use aitr_config::calendar::TradingCalendar;
use aitr_config::GlobalConfig;
use aitr_portfolio::equity_micros;
use aitr_risk::{RiskGateConfig, RiskState};
use aitr_schemas::{Personality, Portfolio, Trader, TraderId, TraderState};
use aitr_signals::{PriceFeed, SignalSource};
use aitr_store::Store;

use crate::bus::{new_bus, spawn_heartbeat, Event};
use crate::errors::{EngineError, EngineResult};
use crate::worker;

pub(crate) struct WorkerHandle {
    pub cancel: CancellationToken,
    pub join: tokio::task::JoinHandle<()>,
}

/// Shared engine state. Cheap to clone (everything lives behind `Arc`s),
/// the way `AppState` is handed to every Axum handler.
pub struct EngineInner {
    pub store: Arc<dyn Store>,
    pub config: GlobalConfig,
    pub bus: broadcast::Sender<Event>,
    pub risk_states: RwLock<BTreeMap<TraderId, RiskState>>,
    pub price_feed: Arc<dyn PriceFeed>,
    pub sources: Vec<Arc<dyn SignalSource>>,
    workers: RwLock<BTreeMap<TraderId, WorkerHandle>>,
}

#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        config: GlobalConfig,
        price_feed: Arc<dyn PriceFeed>,
        sources: Vec<Arc<dyn SignalSource>>,
    ) -> Self {
        let bus = new_bus(config.event_bus_capacity);
        spawn_heartbeat(bus.clone(), StdDuration::from_secs(5));

        let inner = Arc::new(EngineInner {
            store,
            config,
            bus,
            risk_states: RwLock::new(BTreeMap::new()),
            price_feed,
            sources,
            workers: RwLock::new(BTreeMap::new()),
        });

        let engine = Self { inner };
        worker::spawn_daily_maintenance_loop(engine.inner.clone());
        engine
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }

    /// Registers a new trader with a freshly funded paper portfolio (§4.6
    /// Created state). Left `Stopped` until `start_trader` is called.
    pub async fn create_trader(&self, name: &str, personality: Personality) -> EngineResult<Trader> {
        personality.validate()?;
        let now = Utc::now();
        let mut trader = Trader::new(name, personality.clone(), now);
        let portfolio = Portfolio::new(trader.id, personality.capital.initial_budget_micros, zero_cost());
        trader.portfolio_id = Some(portfolio.id);

        self.inner.store.create_trader(&trader).await?;
        self.inner.store.upsert_portfolio(&portfolio).await?;
        Ok(trader)
    }

    pub async fn get_trader(&self, trader_id: TraderId) -> EngineResult<Trader> {
        self.inner.store.get_trader(trader_id).await?.ok_or(EngineError::TraderNotFound)
    }

    pub async fn list_traders(&self) -> EngineResult<Vec<Trader>> {
        Ok(self.inner.store.list_traders().await?)
    }

    pub async fn get_portfolio(&self, trader_id: TraderId) -> EngineResult<Portfolio> {
        self.inner
            .store
            .get_portfolio_for_trader(trader_id)
            .await?
            .ok_or(EngineError::PortfolioNotFound)
    }

    /// Starts (or resumes) a trader's cooperative scheduler task (§4.6).
    /// Idempotent against a trader that's already `Paused`: flips back to
    /// `Running` without spawning a second worker.
    pub async fn start_trader(&self, trader_id: TraderId) -> EngineResult<()> {
        let mut trader = self.get_trader(trader_id).await?;

        {
            let workers = self.inner.workers.read().await;
            if let Some(handle) = workers.get(&trader_id) {
                if !handle.join.is_finished() {
                    if trader.state == TraderState::Paused {
                        drop(workers);
                        trader.state = TraderState::Running;
                        trader.updated_at = Utc::now();
                        self.inner.store.update_trader(&trader).await?;
                        let _ = self.inner.bus.send(Event::TraderStateChanged { trader_id, state: TraderState::Running });
                        return Ok(());
                    }
                    return Err(EngineError::AlreadyRunning);
                }
            }
        }

        let portfolio = self.get_portfolio(trader_id).await?;
        self.ensure_risk_state(trader_id, &portfolio).await;

        trader.state = TraderState::Running;
        trader.updated_at = Utc::now();
        self.inner.store.update_trader(&trader).await?;
        let _ = self.inner.bus.send(Event::TraderStateChanged { trader_id, state: TraderState::Running });

        let cancel = CancellationToken::new();
        let join = worker::spawn_trader_worker(self.inner.clone(), trader_id, cancel.clone());
        self.inner.workers.write().await.insert(trader_id, WorkerHandle { cancel, join });
        Ok(())
    }

    /// Stops a trader's scheduler task entirely (§4.6 `Stopped` state): the
    /// worker exits on its next between-symbols cancellation checkpoint.
    pub async fn stop_trader(&self, trader_id: TraderId) -> EngineResult<()> {
        let handle = self.inner.workers.write().await.remove(&trader_id);
        let Some(handle) = handle else { return Err(EngineError::NotRunning) };
        handle.cancel.cancel();

        let mut trader = self.get_trader(trader_id).await?;
        trader.state = TraderState::Stopped;
        trader.updated_at = Utc::now();
        self.inner.store.update_trader(&trader).await?;
        let _ = self.inner.bus.send(Event::TraderStateChanged { trader_id, state: TraderState::Stopped });
        Ok(())
    }

    /// Pauses a trader (§4.6 `Paused` state): the worker keeps running so
    /// open positions still get mark-to-market'd and protective exits still
    /// fire, but new openings stop being evaluated (see
    /// [`crate::worker::resolve_symbols`]).
    pub async fn pause_trader(&self, trader_id: TraderId) -> EngineResult<()> {
        let mut trader = self.get_trader(trader_id).await?;
        if trader.state != TraderState::Running {
            return Err(EngineError::NotRunning);
        }
        trader.state = TraderState::Paused;
        trader.updated_at = Utc::now();
        self.inner.store.update_trader(&trader).await?;
        let _ = self.inner.bus.send(Event::TraderStateChanged { trader_id, state: TraderState::Paused });
        Ok(())
    }

    /// Runs one adaptive-learning pass immediately instead of waiting for
    /// the daily maintenance job, for manual/CLI-triggered use.
    pub async fn trigger_learning(&self, trader_id: TraderId) -> EngineResult<()> {
        crate::maintenance::run_learning_for_trader(&self.inner, trader_id, Utc::now()).await
    }

    /// Replaces a trader's personality wholesale (§6 REST surface: "update
    /// Personality"). Revalidated the same way `create_trader` validates a
    /// fresh one (§7 "Configuration error"); an invalid replacement is
    /// rejected without mutating the stored trader.
    pub async fn update_personality(&self, trader_id: TraderId, personality: Personality) -> EngineResult<Trader> {
        personality.validate()?;
        let mut trader = self.get_trader(trader_id).await?;
        trader.personality = personality;
        trader.updated_at = Utc::now();
        trader.status_message = None;
        self.inner.store.update_trader(&trader).await?;
        Ok(trader)
    }

    /// Deletes a trader outright. Refuses while a worker is still running
    /// (§6: callers must `stop_trader` first) rather than silently
    /// cancelling it out from under a live schedule.
    pub async fn delete_trader(&self, trader_id: TraderId) -> EngineResult<()> {
        {
            let workers = self.inner.workers.read().await;
            if let Some(handle) = workers.get(&trader_id) {
                if !handle.join.is_finished() {
                    return Err(EngineError::AlreadyRunning);
                }
            }
        }
        self.inner.risk_states.write().await.remove(&trader_id);
        self.inner.store.delete_trader(trader_id).await?;
        Ok(())
    }

    pub async fn list_decisions(
        &self,
        trader_id: TraderId,
        since: chrono::DateTime<Utc>,
        until: chrono::DateTime<Utc>,
    ) -> EngineResult<Vec<aitr_schemas::Decision>> {
        Ok(self.inner.store.list_decisions_for_trader(trader_id, since, until).await?)
    }

    pub async fn list_daily_reports(&self, trader_id: TraderId) -> EngineResult<Vec<aitr_schemas::DailyReport>> {
        Ok(self.inner.store.list_daily_reports(trader_id).await?)
    }

    pub async fn list_weight_history(&self, trader_id: TraderId) -> EngineResult<Vec<aitr_schemas::WeightHistory>> {
        Ok(self.inner.store.list_weight_history(trader_id).await?)
    }

    async fn ensure_risk_state(&self, trader_id: TraderId, portfolio: &Portfolio) {
        let mut states = self.inner.risk_states.write().await;
        states.entry(trader_id).or_insert_with(|| RiskState::new(Utc::now(), equity_micros(portfolio)));
    }
}

/// Builds the RiskGate's config view of a trader's personality. Pure
/// mapping, kept next to `Engine` since it's the only place that needs it.
pub(crate) fn risk_config_from_personality(p: &Personality) -> RiskGateConfig {
    RiskGateConfig {
        min_confidence: p.trading.min_confidence,
        min_agreement: p.signals.min_agreement,
        daily_loss_pct: p.risk.daily_loss_pct,
        max_drawdown_pct: p.risk.max_drawdown_pct,
        reserve_cash_percent: p.capital.reserve_cash_percent,
        max_open_positions: p.trading.max_open_positions,
        max_position_percent: p.capital.max_position_percent,
        total_exposure_pct: p.risk.total_exposure_pct,
        loss_cooldown_trigger: p.risk.loss_cooldown_trigger,
        cooldown_minutes: p.risk.cooldown_minutes,
    }
}

pub(crate) fn calendar_from_personality(p: &Personality) -> EngineResult<TradingCalendar> {
    Ok(TradingCalendar::from_schedule(&p.schedule)?)
}

/// §4.6: the watchlist a tick should walk. `use_full_watchlist` has no
/// external "full market watchlist" collaborator to resolve against in this
/// workspace, so it falls back to the trader's own configured symbols (see
/// DESIGN.md).
pub(crate) fn resolve_symbols(trader: &Trader, portfolio: &Portfolio, paused: bool) -> Vec<String> {
    let configured = trader.personality.watchlist.symbols.clone();
    if !paused {
        return configured;
    }
    // Paused: only symbols with an open position still get walked, so
    // protective exits keep firing but no new position can open.
    let open: std::collections::BTreeSet<String> = portfolio.open_positions().map(|p| p.symbol.clone()).collect();
    configured.into_iter().filter(|s| open.contains(s)).collect()
}
