//! Pure end-of-day rollup (§4.6 supplement, §GLOSSARY "Daily report"). The
//! async orchestration that gathers the inputs lives in
//! [`crate::maintenance`]; this module only shapes the numbers into a
//! [`DailyReport`] so the arithmetic itself is unit-testable without a
//! store or a clock.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use aitr_schemas::{DailyReport, Decision, DecisionType, SourceKind, Transaction, TraderId};

#[allow(clippy::too_many_arguments)]
pub fn build_daily_report(
    trader_id: TraderId,
    date: NaiveDate,
    start_value_micros: i64,
    end_value_micros: i64,
    decisions: &[Decision],
    txns: &[Transaction],
    per_source_accuracy: BTreeMap<SourceKind, f64>,
) -> DailyReport {
    let trades_opened = decisions
        .iter()
        .filter(|d| d.executed && matches!(d.decision_type, DecisionType::Buy | DecisionType::Short))
        .count() as u32;

    let closes: Vec<&Decision> = decisions
        .iter()
        .filter(|d| d.executed && matches!(d.decision_type, DecisionType::Close | DecisionType::Sell))
        .collect();
    let trades_closed = closes.len() as u32;

    let win_count = closes.iter().filter(|d| d.outcome.as_ref().is_some_and(|o| o.pnl_micros > 0)).count() as u32;
    let loss_count = closes.iter().filter(|d| d.outcome.as_ref().is_some_and(|o| o.pnl_micros <= 0)).count() as u32;

    let best_trade_pnl_micros = closes.iter().filter_map(|d| d.outcome.as_ref()).map(|o| o.pnl_micros).max();
    let worst_trade_pnl_micros = closes.iter().filter_map(|d| d.outcome.as_ref()).map(|o| o.pnl_micros).min();

    let fees_paid_micros: i64 = txns.iter().map(|t| t.fee_micros).sum();
    let pnl_micros = end_value_micros - start_value_micros;
    let pnl_pct = if start_value_micros != 0 {
        pnl_micros as f64 / start_value_micros as f64
    } else {
        0.0
    };

    let insights = build_insights(pnl_micros, win_count, loss_count, fees_paid_micros);

    DailyReport {
        trader_id,
        date,
        start_value_micros,
        end_value_micros,
        pnl_micros,
        pnl_pct,
        fees_paid_micros,
        trades_opened,
        trades_closed,
        win_count,
        loss_count,
        win_rate: DailyReport::win_rate_from_counts(win_count, loss_count),
        best_trade_pnl_micros,
        worst_trade_pnl_micros,
        per_source_accuracy,
        insights,
    }
}

/// Free-text, advisory-only observations (§9: never fed back into the
/// learning loop). Deliberately simple threshold-based phrasing rather than
/// a templated sentence per metric, so the list stays short on a quiet day.
fn build_insights(pnl_micros: i64, win_count: u32, loss_count: u32, fees_paid_micros: i64) -> Vec<String> {
    let mut insights = Vec::new();
    if pnl_micros < 0 {
        insights.push(format!("day closed down {} micros", pnl_micros.abs()));
    }
    let total_closes = win_count + loss_count;
    if total_closes >= 3 && loss_count as f64 / total_closes as f64 > 0.6 {
        insights.push("loss rate above 60% today, consider reviewing signal weights".to_string());
    }
    if fees_paid_micros > 0 && pnl_micros.abs() > 0 && fees_paid_micros as f64 > pnl_micros.abs() as f64 * 0.2 {
        insights.push("fees consumed a large share of today's pnl".to_string());
    }
    insights
}
