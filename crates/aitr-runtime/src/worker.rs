//! The per-trader cooperative scheduler (§4.6): one Tokio task per running
//! trader, woken on `checkIntervalMinutes`, mark-to-market first, then every
//! watchlist symbol through [`aitr_execution::evaluate_symbol`] with a
//! cancellation checkpoint between symbols. Grounded on
//! `mqk-daemon::state::spawn_heartbeat`'s `tokio::spawn` + `interval` shape,
//! but at finer grain: this loop calls the single-symbol pipeline directly
//! rather than `aitr_execution::run_trader_tick`'s whole-tick wrapper, so a
//! stop/pause request can take effect mid-tick instead of only between
//! ticks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use aitr_execution::{evaluate_symbol, SymbolTickParams};
use aitr_portfolio::mark_to_market;
use aitr_schemas::{PositionId, Trader, TraderId, TraderState};

use crate::backfill::{backfill_outcome_for_close, find_opening_decision};
use crate::counters::recompute_counters;
use crate::engine::{calendar_from_personality, resolve_symbols, risk_config_from_personality, EngineInner};

const MIN_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 60;

pub fn spawn_trader_worker(engine: Arc<EngineInner>, trader_id: TraderId, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff_secs = MIN_BACKOFF_SECS;
        loop {
            let trader = match engine.store.get_trader(trader_id).await {
                Ok(Some(t)) => t,
                Ok(None) => {
                    warn!(%trader_id, "worker exiting: trader no longer exists");
                    return;
                }
                Err(e) => {
                    error!(%trader_id, error = %e, "store unavailable, backing off");
                    if sleep_or_cancel(&cancel, backoff_secs).await {
                        return;
                    }
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }
            };
            if trader.state == TraderState::Stopped {
                return;
            }

            let interval = StdDuration::from_secs((trader.personality.schedule.check_interval_minutes.max(1) as u64) * 60);
            if sleep_or_cancel(&cancel, interval.as_secs()).await {
                return;
            }

            match run_one_tick(&engine, trader_id, &cancel).await {
                Ok(()) => backoff_secs = MIN_BACKOFF_SECS,
                Err(e) => {
                    error!(%trader_id, error = %e, "tick failed, backing off");
                    if sleep_or_cancel(&cancel, backoff_secs).await {
                        return;
                    }
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                }
            }
        }
    })
}

/// Sleeps for `secs`, waking early (and returning `true`) if cancelled.
async fn sleep_or_cancel(cancel: &CancellationToken, secs: u64) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(StdDuration::from_secs(secs.max(1))) => false,
    }
}

async fn run_one_tick(engine: &Arc<EngineInner>, trader_id: TraderId, cancel: &CancellationToken) -> crate::errors::EngineResult<()> {
    let mut trader: Trader = engine.store.get_trader(trader_id).await?.ok_or(crate::errors::EngineError::TraderNotFound)?;
    if trader.state == TraderState::Stopped {
        return Ok(());
    }
    let mut portfolio = engine.store.get_portfolio_for_trader(trader_id).await?.ok_or(crate::errors::EngineError::PortfolioNotFound)?;

    let now = Utc::now();
    let calendar = calendar_from_personality(&trader.personality)?;
    if trader.personality.schedule.trading_hours_only && !calendar.is_trading_time(now) {
        return Ok(());
    }

    {
        let mut states = engine.risk_states.write().await;
        let equity = aitr_portfolio::equity_micros(&portfolio);
        let state = states
            .entry(trader_id)
            .or_insert_with(|| aitr_risk::RiskState::new(now, equity));
        state.tick(now, equity);
    }

    let mut txns = Vec::new();
    let paused = trader.state == TraderState::Paused;
    let symbols = resolve_symbols(&trader, &portfolio, paused);

    let positions_before_close: std::collections::BTreeSet<PositionId> =
        portfolio.positions.values().filter(|p| p.is_open()).map(|p| p.id).collect();

    let open_symbols: Vec<String> = portfolio.open_positions().map(|p| p.symbol.clone()).collect();
    let mut quotes = BTreeMap::new();
    for symbol in &open_symbols {
        if let Ok(Ok(quote)) = tokio::time::timeout(
            StdDuration::from_secs(engine.config.source_timeout_secs),
            engine.price_feed.get_quote(symbol),
        )
        .await
        {
            quotes.insert(symbol.clone(), quote.price_micros);
        }
    }
    let auto_closed = mark_to_market(&mut portfolio, &quotes, now, &mut txns);

    for (position_id, trigger, pnl_micros) in &auto_closed {
        if let Some(position) = portfolio.positions.get(position_id) {
            let _ = engine.bus.send(crate::bus::Event::PositionClosed {
                trader_id,
                position_id: *position_id,
                symbol: position.symbol.clone(),
                reason: (*trigger).into(),
                realized_pnl_micros: *pnl_micros,
            });
        }
    }

    if !auto_closed.is_empty() {
        handle_auto_closes(engine, &trader, &portfolio, &auto_closed, &positions_before_close, now).await?;
    }

    let risk_cfg = risk_config_from_personality(&trader.personality);
    // Snapshot the ticked RiskState rather than holding the map's lock
    // across every symbol's `.await` points, which would block other
    // traders' workers from updating their own entries meanwhile.
    let risk_state = engine.risk_states.read().await.get(&trader_id).expect("ticked above").clone();
    let mut decisions = Vec::with_capacity(symbols.len());
    for symbol in &symbols {
        if cancel.is_cancelled() {
            break;
        }
        let _ = engine.bus.send(crate::bus::Event::Analyzing { trader_id, symbol: symbol.clone() });
        let decision = evaluate_symbol(SymbolTickParams {
            symbol,
            symbols_analyzed: &symbols,
            trader: &trader,
            portfolio: &mut portfolio,
            txns: &mut txns,
            sources: &engine.sources,
            price_feed: engine.price_feed.as_ref(),
            risk_cfg: &risk_cfg,
            risk_state: &risk_state,
            calendar: &calendar,
            now,
            source_timeout: StdDuration::from_secs(engine.config.source_timeout_secs),
            candle_lookback: 200,
        })
        .await;
        decisions.push(decision);
    }

    // Any close this tick (user-initiated or auto) feeds the loss-cooldown
    // streak (§4.3 check 4).
    for decision in &decisions {
        if matches!(decision.decision_type, aitr_schemas::DecisionType::Close) {
            if let Some(outcome) = &decision.outcome {
                let mut states = engine.risk_states.write().await;
                if let Some(state) = states.get_mut(&trader_id) {
                    state.record_trade_close(outcome.pnl_micros, now);
                }
            }
        }
    }

    engine.store.upsert_portfolio(&portfolio).await?;
    if !txns.is_empty() {
        engine.store.append_transactions(&txns).await?;
    }
    for decision in &decisions {
        engine.store.append_decision(decision).await?;
        let _ = engine.bus.send(crate::bus::Event::Decision(decision.clone()));
        publish_decision_side_effects(engine, trader_id, decision);
    }

    let since = now - chrono::Duration::days(trader.personality.learning.accuracy_window_days as i64);
    let history = engine.store.list_decisions_for_trader(trader_id, since, now + chrono::Duration::seconds(1)).await?;
    trader.counters = recompute_counters(&history);
    trader.updated_at = now;
    engine.store.update_trader(&trader).await?;

    Ok(())
}

/// Narrows a tick's blanket `Decision` event into the `trade_executed` /
/// `position_closed` / `error` events §4.8 lists separately (§7: a ledger
/// failure must surface as its own event, not just an `execution_error`
/// field subscribers would have to know to look inside `Decision` for).
fn publish_decision_side_effects(engine: &Arc<EngineInner>, trader_id: TraderId, decision: &aitr_schemas::Decision) {
    use aitr_schemas::DecisionType;

    let is_trade = matches!(decision.decision_type, DecisionType::Buy | DecisionType::Sell | DecisionType::Short | DecisionType::Close);

    if decision.executed && is_trade {
        let _ = engine.bus.send(crate::bus::Event::TradeExecuted(decision.clone()));
    }

    if decision.executed && decision.decision_type == DecisionType::Close {
        if let (Some(position_id), Some(outcome)) = (decision.resulting_position_id, &decision.outcome) {
            let _ = engine.bus.send(crate::bus::Event::PositionClosed {
                trader_id,
                position_id,
                symbol: decision.symbol.clone(),
                reason: aitr_schemas::CloseReason::User,
                realized_pnl_micros: outcome.pnl_micros,
            });
        }
    }

    // Only a genuine ledger failure on an approved trade counts; `Skip`'s
    // price-feed-unavailable path also sets `execution_error` but is
    // transient, not the §7 "ledger failure"/"fatal" case.
    if !decision.executed && is_trade {
        if let Some(message) = &decision.execution_error {
            let _ = engine.bus.send(crate::bus::Event::Error { trader_id, message: message.clone() });
        }
    }
}

/// Resolves the originating `Buy`/`Short` decision for each position
/// `mark_to_market` just auto-closed, backfills its outcome, and feeds the
/// close into the risk-cooldown streak (§4.7 step 6, §8 scenario S5).
async fn handle_auto_closes(
    engine: &Arc<EngineInner>,
    trader: &Trader,
    portfolio: &aitr_schemas::Portfolio,
    auto_closed: &[(PositionId, aitr_portfolio::AutoCloseTrigger, i64)],
    positions_open_before: &std::collections::BTreeSet<PositionId>,
    now: chrono::DateTime<Utc>,
) -> crate::errors::EngineResult<()> {
    let lookback_since = now - chrono::Duration::days(90);
    let history = engine.store.list_decisions_for_trader(trader.id, lookback_since, now + chrono::Duration::seconds(1)).await?;

    for (position_id, _trigger, pnl_micros) in auto_closed {
        if !positions_open_before.contains(position_id) {
            continue;
        }
        let Some(position) = portfolio.positions.get(position_id) else { continue };
        {
            let mut states = engine.risk_states.write().await;
            if let Some(state) = states.get_mut(&trader.id) {
                state.record_trade_close(*pnl_micros, now);
            }
        }
        if let Some(decision) = find_opening_decision(&history, *position_id) {
            let outcome = backfill_outcome_for_close(
                position,
                trader.personality.learning.correct_if_loss_above_micros,
                now,
            );
            engine.store.set_decision_outcome(decision.id, outcome).await?;
        }
    }
    Ok(())
}

/// One background task for the whole engine (not per trader): walks every
/// trader on `learning_interval_hours` cadence and runs overnight fees,
/// settle-expired, adaptive learning, and the daily report build (§4.7,
/// §4.6 supplement). GlobalConfig folds `overnightFeesAt`/`marketCloseJobAt`/
/// `outcomeBackfillEvery` into this single cadence rather than separate
/// knobs (see DESIGN.md).
pub fn spawn_daily_maintenance_loop(engine: Arc<EngineInner>) {
    tokio::spawn(async move {
        let interval = StdDuration::from_secs((engine.config.learning_interval_hours.max(1) as u64) * 3600);
        loop {
            tokio::time::sleep(interval).await;
            let traders = match engine.store.list_traders().await {
                Ok(t) => t,
                Err(e) => {
                    error!(error = %e, "daily maintenance: store unavailable");
                    continue;
                }
            };
            for trader in traders {
                let now = Utc::now();
                if let Err(e) = crate::maintenance::run_daily_maintenance(&engine, trader.id, now).await {
                    error!(trader_id = %trader.id, error = %e, "daily maintenance failed for trader");
                }
            }
        }
    });
}
