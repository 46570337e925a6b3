use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use aitr_schemas::{
    Decision, DecisionType, Direction, Personality, Reasoning, SourceKind, TraderId, Verdict,
    WeightHistory, WeightHistoryId,
};

/// Result of one §4.7 adaptive-learning pass over a trader's recent
/// decision history. Mirrors `mqk-promotion::evaluator`'s pure
/// `fn evaluate(...) -> Report` shape: a plain function over historical
/// data producing an explicit decision value, no side effects.
#[derive(Clone, Debug, PartialEq)]
pub enum LearningOutcome {
    Adjusted(WeightHistory),
    Skipped { reason: String },
}

/// Runs the weight-adaptation step for one trader. `decisions` should cover
/// at least `personality.learning.accuracy_window_days`; only entries with
/// a resolved `outcome` and a `Fused` reasoning payload contribute to
/// accuracy. Pure: callers own fetching the window and persisting the
/// result.
pub fn run_learning_step(
    trader_id: TraderId,
    personality: &Personality,
    decisions: &[Decision],
    now: DateTime<Utc>,
) -> LearningOutcome {
    if !personality.learning.enabled || !personality.learning.update_weights {
        return LearningOutcome::Skipped { reason: "learning_disabled".to_string() };
    }

    let resolved: Vec<&Decision> = decisions.iter().filter(|d| d.outcome.is_some()).collect();
    if (resolved.len() as u32) < personality.learning.min_trades_before_adjust {
        return LearningOutcome::Skipped { reason: "insufficient_data".to_string() };
    }

    let accuracy = per_source_accuracy(&resolved);
    let scores: BTreeMap<SourceKind, f64> =
        accuracy.iter().map(|(source, acc)| (*source, acc.max(0.1))).collect();
    let score_sum: f64 = scores.values().sum();

    let old_weights = personality.signals.weights.clone();
    let mut new_weights = BTreeMap::new();
    for (source, old_weight) in &old_weights {
        let target = scores.get(source).copied().unwrap_or(0.1) / score_sum;
        let step = (target - old_weight)
            .clamp(-personality.learning.max_weight_change, personality.learning.max_weight_change);
        new_weights.insert(*source, (old_weight + step).clamp(0.05, 0.5));
    }
    let total: f64 = new_weights.values().sum();
    for weight in new_weights.values_mut() {
        *weight /= total;
    }

    let max_move = old_weights
        .iter()
        .map(|(source, old)| (new_weights.get(source).copied().unwrap_or(*old) - old).abs())
        .fold(0.0_f64, f64::max);

    if max_move < 0.01 {
        return LearningOutcome::Skipped { reason: "no_change".to_string() };
    }

    LearningOutcome::Adjusted(WeightHistory {
        id: WeightHistoryId::new(),
        trader_id,
        old_weights,
        new_weights,
        accuracy_snapshot: accuracy,
        reason: "adaptive_step".to_string(),
        at: now,
    })
}

/// Accuracy per source: the fraction of resolved decisions, among those the
/// source voted on, where the source's called direction agreed with the
/// direction the fused decision actually traded and that trade turned out
/// correct (or the source dissented from a trade that turned out
/// incorrect). Sources with zero votes in the window score 0, which the
/// `max(0.1, _)` floor in [`run_learning_step`] then picks up.
fn per_source_accuracy(decisions: &[&Decision]) -> BTreeMap<SourceKind, f64> {
    let mut hits: BTreeMap<SourceKind, u32> = BTreeMap::new();
    let mut votes: BTreeMap<SourceKind, u32> = BTreeMap::new();

    for decision in decisions {
        let Reasoning::Fused { per_source, weighted_score, .. } = &decision.reasoning else {
            continue;
        };
        let Some(outcome) = &decision.outcome else { continue };
        if !matches!(decision.decision_type, DecisionType::Buy | DecisionType::Short | DecisionType::Close) {
            continue;
        }
        let traded_up = *weighted_score > 0.5;

        for (source, verdict) in per_source {
            *votes.entry(*source).or_insert(0) += 1;
            let agreed = source_agreed_with_direction(verdict, traded_up);
            if agreed == outcome.was_correct {
                *hits.entry(*source).or_insert(0) += 1;
            }
        }
    }

    SourceKind::ALL
        .into_iter()
        .map(|source| {
            let total = votes.get(&source).copied().unwrap_or(0);
            let hit = hits.get(&source).copied().unwrap_or(0);
            let acc = if total == 0 { 0.0 } else { hit as f64 / total as f64 };
            (source, acc)
        })
        .collect()
}

fn source_agreed_with_direction(verdict: &Verdict, traded_up: bool) -> bool {
    match verdict.direction {
        Direction::Up => traded_up,
        Direction::Down => !traded_up,
        Direction::Neutral => false,
    }
}
