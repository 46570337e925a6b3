//! Pure recompute of [`TraderCounters`] from a trader's full decision
//! history (§8 invariant: counters must stay consistent with history rather
//! than drift via ad-hoc increments). Called after every tick that appends
//! decisions, and once at daemon startup to repair counters after a crash.

use aitr_schemas::{Decision, DecisionType, TraderCounters};

pub fn recompute_counters(decisions: &[Decision]) -> TraderCounters {
    let mut counters = TraderCounters::default();
    counters.decisions = decisions.len() as u64;

    let mut equity_curve: Vec<i64> = Vec::new();
    let mut streak: i64 = 0;

    for decision in decisions {
        equity_curve.push(decision.portfolio_snapshot.equity_micros);

        if !matches!(decision.decision_type, DecisionType::Close | DecisionType::Sell) {
            continue;
        }
        let Some(outcome) = &decision.outcome else { continue };

        counters.trades += 1;
        counters.total_pnl_micros += outcome.pnl_micros;
        counters.best_trade_pnl_micros = counters.best_trade_pnl_micros.max(outcome.pnl_micros);
        counters.worst_trade_pnl_micros = counters.worst_trade_pnl_micros.min(outcome.pnl_micros);

        if outcome.pnl_micros > 0 {
            counters.wins += 1;
            streak = if streak > 0 { streak + 1 } else { 1 };
        } else {
            counters.losses += 1;
            streak = if streak < 0 { streak - 1 } else { -1 };
        }
    }
    counters.current_streak = streak;
    counters.max_drawdown_pct = max_drawdown_pct(&equity_curve);
    counters
}

/// Largest peak-to-trough drop across the recorded equity curve, expressed
/// as a positive fraction of the peak. Derived straight from the
/// `portfolio_snapshot.equity_micros` every `Decision` already carries, no
/// separate equity-curve storage needed.
fn max_drawdown_pct(curve: &[i64]) -> f64 {
    let mut peak = i64::MIN;
    let mut worst = 0.0_f64;
    for &equity in curve {
        if equity > peak {
            peak = equity;
        }
        if peak > 0 {
            let drawdown = (peak - equity) as f64 / peak as f64;
            if drawdown > worst {
                worst = drawdown;
            }
        }
    }
    worst
}
