use aitr_schemas::{DecisionOutcome, DecisionType};

/// §4.7 step 6's outcome-correctness policy. `correct_if_loss_above_micros`
/// is the configured small-loss tolerance (negative, e.g. -100_000_000 for
/// $100): a close with a loss no worse than that still counts correct.
///
/// Called twice in the pipeline: immediately for `Close` decisions (the
/// realized pnl is already known at execution time) and later, by whatever
/// backfill step watches for position closure, for the `Buy`/`Short`
/// decision that originally opened the position.
pub fn compute_outcome(
    decision_type: DecisionType,
    pnl_micros: i64,
    cost_basis_micros: i64,
    holding_days: i64,
    correct_if_loss_above_micros: i64,
) -> DecisionOutcome {
    let pnl_pct = if cost_basis_micros != 0 {
        pnl_micros as f64 / cost_basis_micros.abs() as f64
    } else {
        0.0
    };
    let was_correct = match decision_type {
        DecisionType::Buy | DecisionType::Short => pnl_micros > 0,
        DecisionType::Close | DecisionType::Sell => {
            pnl_micros > 0 || pnl_micros > correct_if_loss_above_micros
        }
        DecisionType::Hold | DecisionType::Skip => true,
    };
    DecisionOutcome { pnl_micros, pnl_pct, holding_days, was_correct }
}
