//! Outcome backfill (§4.7 step 6, §8 scenario S5): a position auto-closed by
//! `mark_to_market` (stop-loss, take-profit, knockout, margin call) or by
//! `settle_expired` (warrant/knockout expiry) has no `Decision` of its own —
//! the `Decision` that matters is whichever `Buy`/`Short` originally opened
//! it. This module finds that decision and resolves its outcome once the
//! realized pnl is known.

use chrono::{DateTime, Utc};

use aitr_learning::compute_outcome;
use aitr_schemas::{Decision, DecisionType, Position};

/// Locates the still-unresolved opening decision for a position, among a
/// trader's recent decision history, by matching `resulting_position_id`.
pub fn find_opening_decision<'a>(decisions: &'a [Decision], position_id: aitr_schemas::PositionId) -> Option<&'a Decision> {
    decisions.iter().find(|d| {
        d.resulting_position_id == Some(position_id)
            && matches!(d.decision_type, DecisionType::Buy | DecisionType::Short)
            && d.outcome.is_none()
    })
}

/// Builds the `DecisionOutcome` an auto-closed position's opening decision
/// should be backfilled with.
pub fn backfill_outcome_for_close(
    position: &Position,
    correct_if_loss_above_micros: i64,
    now: DateTime<Utc>,
) -> aitr_schemas::DecisionOutcome {
    let pnl_micros = position.realized_pnl_micros.unwrap_or(0);
    let holding_days = (now - position.opened_at).num_days();
    let decision_type = match position.side {
        aitr_schemas::Side::Long => DecisionType::Buy,
        aitr_schemas::Side::Short => DecisionType::Short,
    };
    compute_outcome(decision_type, pnl_micros, position.margin_used_micros, holding_days, correct_if_loss_above_micros)
}
