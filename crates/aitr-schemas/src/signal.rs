use serde::{Deserialize, Serialize};

/// The four signal sources a trader can fuse (§4.1).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Ml,
    Rl,
    Sentiment,
    Technical,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Ml,
        SourceKind::Rl,
        SourceKind::Sentiment,
        SourceKind::Technical,
    ];
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceKind::Ml => "ml",
            SourceKind::Rl => "rl",
            SourceKind::Sentiment => "sentiment",
            SourceKind::Technical => "technical",
        };
        write!(f, "{s}")
    }
}

/// Directional call carried by a [`Verdict`] or an aggregated decision.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

/// A single source's output for one symbol (§4.1, §GLOSSARY).
///
/// `score` and `confidence` are both in `[0, 1]`. Score 0.5 is neutral;
/// above is bullish, below is bearish. Sources must be idempotent for a
/// given `(symbol, window)` — this type carries no hidden randomness.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub score: f64,
    pub confidence: f64,
    pub direction: Direction,
    pub rationale: String,
}

impl Verdict {
    pub fn new(score: f64, confidence: f64, direction: Direction, rationale: impl Into<String>) -> Self {
        debug_assert!((0.0..=1.0).contains(&score), "score must be in [0,1]");
        debug_assert!((0.0..=1.0).contains(&confidence), "confidence must be in [0,1]");
        Self {
            score,
            confidence,
            direction,
            rationale: rationale.into(),
        }
    }
}

/// Degree to which independent signal sources share direction (§GLOSSARY).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Agreement {
    None,
    Mixed,
    Majority,
    Full,
}

impl Agreement {
    /// Maps an agreement level to the floor fraction used by RiskGate check 2.
    pub fn as_fraction(self) -> f64 {
        match self {
            Agreement::Full => 1.0,
            Agreement::Majority => 0.66,
            Agreement::Mixed => 0.33,
            Agreement::None => 0.0,
        }
    }
}
