//! End-of-day maintenance orchestration (§4.6 supplement, §4.7): overnight
//! fees, warrant/knockout expiry settlement, outcome backfill for whatever
//! that settlement closed, the adaptive learning step, and the resulting
//! [`DailyReport`]. Invoked once per trader on
//! [`crate::worker::spawn_daily_maintenance_loop`]'s cadence, or directly by
//! [`crate::Engine::trigger_learning`] for a manual run.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use aitr_learning::run_learning_step;
use aitr_portfolio::{apply_overnight_fees, equity_micros, settle_expired};
use aitr_schemas::TraderId;

use crate::backfill::{backfill_outcome_for_close, find_opening_decision};
use crate::bus::Event;
use crate::counters::recompute_counters;
use crate::daily::build_daily_report;
use crate::engine::EngineInner;
use crate::errors::{EngineError, EngineResult};

pub async fn run_daily_maintenance(engine: &Arc<EngineInner>, trader_id: TraderId, now: DateTime<Utc>) -> EngineResult<()> {
    let mut trader = engine.store.get_trader(trader_id).await?.ok_or(EngineError::TraderNotFound)?;
    let mut portfolio = engine.store.get_portfolio_for_trader(trader_id).await?.ok_or(EngineError::PortfolioNotFound)?;

    let start_value_micros = equity_micros(&portfolio);
    let mut txns = Vec::new();

    apply_overnight_fees(&mut portfolio, now, &mut txns);
    let settled = settle_expired(&mut portfolio, now, &mut txns);

    if !settled.is_empty() {
        let lookback_since = now - chrono::Duration::days(90);
        let history = engine
            .store
            .list_decisions_for_trader(trader_id, lookback_since, now + chrono::Duration::seconds(1))
            .await?;
        for position_id in &settled {
            let Some(position) = portfolio.positions.get(position_id) else { continue };
            if let Some(decision) = find_opening_decision(&history, *position_id) {
                let outcome = backfill_outcome_for_close(
                    position,
                    trader.personality.learning.correct_if_loss_above_micros,
                    now,
                );
                engine.store.set_decision_outcome(decision.id, outcome).await?;
            }
        }
    }

    engine.store.upsert_portfolio(&portfolio).await?;
    if !txns.is_empty() {
        engine.store.append_transactions(&txns).await?;
    }

    let since = now - chrono::Duration::days(1);
    let today_decisions = engine.store.list_decisions_for_trader(trader_id, since, now).await?;
    let today_txns = engine
        .store
        .list_transactions_for_portfolio(portfolio.id, since, now)
        .await?;

    let accuracy_window_start = now - chrono::Duration::days(trader.personality.learning.accuracy_window_days as i64);
    let window_decisions = engine.store.list_decisions_for_trader(trader_id, accuracy_window_start, now).await?;

    let mut per_source_accuracy = std::collections::BTreeMap::new();
    match run_learning_step(trader_id, &trader.personality, &window_decisions, now) {
        aitr_learning::LearningOutcome::Adjusted(history) => {
            per_source_accuracy = history.accuracy_snapshot.clone();
            trader.personality.signals.weights = history.new_weights.clone();
            engine.store.append_weight_history(&history).await?;
            let _ = engine.bus.send(Event::WeightsAdjusted(history));
        }
        aitr_learning::LearningOutcome::Skipped { .. } => {}
    }

    let full_history = engine.store.list_decisions_for_trader(trader_id, now - chrono::Duration::days(365), now).await?;
    trader.counters = recompute_counters(&full_history);
    trader.updated_at = now;
    engine.store.update_trader(&trader).await?;

    let end_value_micros = equity_micros(&portfolio);
    let report = build_daily_report(
        trader_id,
        now.date_naive(),
        start_value_micros,
        end_value_micros,
        &today_decisions,
        &today_txns,
        per_source_accuracy,
    );
    engine.store.upsert_daily_report(&report).await?;
    let _ = engine.bus.send(Event::DailyReport(report));

    Ok(())
}

/// Runs the learning step alone, without the overnight-fee/expiry/report
/// machinery, for `Engine::trigger_learning`'s manual-run use case.
pub async fn run_learning_for_trader(engine: &Arc<EngineInner>, trader_id: TraderId, now: DateTime<Utc>) -> EngineResult<()> {
    let mut trader = engine.store.get_trader(trader_id).await?.ok_or(EngineError::TraderNotFound)?;
    let since = now - chrono::Duration::days(trader.personality.learning.accuracy_window_days as i64);
    let decisions = engine.store.list_decisions_for_trader(trader_id, since, now).await?;

    match run_learning_step(trader_id, &trader.personality, &decisions, now) {
        aitr_learning::LearningOutcome::Adjusted(history) => {
            trader.personality.signals.weights = history.new_weights.clone();
            trader.updated_at = now;
            engine.store.append_weight_history(&history).await?;
            engine.store.update_trader(&trader).await?;
            let _ = engine.bus.send(Event::WeightsAdjusted(history));
            Ok(())
        }
        aitr_learning::LearningOutcome::Skipped { .. } => Ok(()),
    }
}
