//! SignalAggregator (§4.2): fuses per-source Verdicts under personality
//! weights into a single weighted score, agreement level, and proposed
//! action. Pure function over value types, no IO — mirrors
//! `mqk-risk::engine::evaluate`'s style of deterministic evaluation.

use std::collections::BTreeMap;

use aitr_schemas::{Agreement, Direction, SourceKind, Verdict};

use crate::direction_from_score;

/// What the fused signal proposes before RiskGate/PositionSizer see it.
/// `SellOrShort` is resolved to `Sell` or `Short` downstream once the
/// caller knows whether the symbol already has an open long position and
/// whether its product type supports shorting (§4.2).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProposedAction {
    Buy,
    SellOrShort,
    Hold,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FusionResult {
    pub per_source: BTreeMap<SourceKind, Verdict>,
    pub renormalized_weights: BTreeMap<SourceKind, f64>,
    pub weighted_score: f64,
    pub weighted_confidence: f64,
    pub direction: Direction,
    pub agreement: Agreement,
    pub proposed: ProposedAction,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FusionOutcome {
    Fused(FusionResult),
    /// §4.2 step 1: absent-source weight mass exceeded 0.5.
    InsufficientSignals { absent_weight_mass: f64 },
}

/// Fuses `verdicts` (sources that responded; absent sources are simply
/// missing keys) under `weights` (must already sum to ~1 across the full
/// configured source set, per `Personality::validate`).
///
/// `min_confidence` supplies the `ε = min_confidence − 0.5` margin used by
/// the buy/sell decision rule in step 5.
pub fn fuse(
    verdicts: &BTreeMap<SourceKind, Verdict>,
    weights: &BTreeMap<SourceKind, f64>,
    min_confidence: f64,
) -> FusionOutcome {
    let absent_weight_mass: f64 = weights
        .iter()
        .filter(|(k, _)| !verdicts.contains_key(k))
        .map(|(_, w)| w)
        .sum();

    if absent_weight_mass > 0.5 {
        return FusionOutcome::InsufficientSignals { absent_weight_mass };
    }

    let present_mass: f64 = weights
        .iter()
        .filter(|(k, _)| verdicts.contains_key(k))
        .map(|(_, w)| w)
        .sum();

    let renormalized_weights: BTreeMap<SourceKind, f64> = if present_mass > 0.0 {
        weights
            .iter()
            .filter(|(k, _)| verdicts.contains_key(k))
            .map(|(k, w)| (*k, w / present_mass))
            .collect()
    } else {
        BTreeMap::new()
    };

    let weighted_score: f64 = renormalized_weights
        .iter()
        .map(|(k, w)| w * verdicts[k].score)
        .sum();
    let weighted_confidence: f64 = renormalized_weights
        .iter()
        .map(|(k, w)| w * verdicts[k].confidence)
        .sum();

    let direction = direction_from_score(weighted_score);
    let agreement = classify_agreement(verdicts);

    let eps = (min_confidence - 0.5).max(0.0);
    let proposed = if weighted_score > 0.5 + eps && agreement >= Agreement::Majority {
        ProposedAction::Buy
    } else if weighted_score < 0.5 - eps && agreement >= Agreement::Majority {
        ProposedAction::SellOrShort
    } else {
        ProposedAction::Hold
    };

    FusionOutcome::Fused(FusionResult {
        per_source: verdicts.clone(),
        renormalized_weights,
        weighted_score,
        weighted_confidence,
        direction,
        agreement,
        proposed,
    })
}

/// §4.2 step 4: count per-source directions and classify the result.
fn classify_agreement(verdicts: &BTreeMap<SourceKind, Verdict>) -> Agreement {
    if verdicts.is_empty() {
        return Agreement::None;
    }
    let mut counts: BTreeMap<u8, u32> = BTreeMap::new();
    for v in verdicts.values() {
        let tag = match v.direction {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Neutral => 2,
        };
        *counts.entry(tag).or_insert(0) += 1;
    }
    let total = verdicts.len() as u32;
    let top = *counts.values().max().unwrap();
    let top_ties = counts.values().filter(|&&c| c == top).count();

    if top as usize == verdicts.len() {
        Agreement::Full
    } else if top * 2 > total {
        Agreement::Majority
    } else if top * 2 == total && top_ties >= 2 {
        Agreement::None
    } else {
        Agreement::Mixed
    }
}
