//! aitr-signals
//!
//! SignalSource trait + four deterministic stub variants (§4.1), the
//! SignalAggregator pure-function fuser (§4.2), and the `PriceFeed`
//! collaborator contract that sources and the scheduler consume.
//!
//! Pure logic only: no wall clock, no randomness. Callers pass in
//! everything a source or the aggregator needs to decide.

mod aggregator;
mod sources;

pub use aggregator::{fuse, FusionOutcome, FusionResult, ProposedAction};
pub use sources::{MlSource, RlSource, SentimentSource, TechnicalSource};

use async_trait::async_trait;

use aitr_schemas::{Direction, PortfolioSnapshot, SourceKind, Verdict};

/// A single OHLCV bar, price in micros (§3 Representation).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candle {
    pub open_micros: i64,
    pub high_micros: i64,
    pub low_micros: i64,
    pub close_micros: i64,
    pub volume: f64,
}

/// A current tradable price, stamped at fetch time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quote {
    pub price_micros: i64,
}

/// Everything a [`SignalSource`] needs to evaluate one symbol (§4.1): the
/// candle history (at least `max(sequenceLength, 200)` bars per §6's
/// freshness contract, enforced by the caller) and the latest quote.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceWindow {
    pub symbol: String,
    pub candles: Vec<Candle>,
    pub quote: Quote,
}

impl PriceWindow {
    pub fn day_change_pct(&self) -> f64 {
        match self.candles.last() {
            Some(c) if c.open_micros != 0 => {
                (self.quote.price_micros - c.open_micros) as f64 / c.open_micros as f64
            }
            _ => 0.0,
        }
    }

    pub fn latest_volume(&self) -> f64 {
        self.candles.last().map(|c| c.volume).unwrap_or(0.0)
    }
}

/// §6 PriceFeed contract. Out of scope to implement for real: the daemon
/// wires a live adapter, the testkit crate a scripted `FakePriceFeed`.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn get_candles(&self, symbol: &str, lookback: usize) -> Result<Vec<Candle>, PriceFeedError>;
    async fn get_quote(&self, symbol: &str) -> Result<Quote, PriceFeedError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PriceFeedError {
    Unavailable(String),
    Timeout,
}

impl std::fmt::Display for PriceFeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(s) => write!(f, "price feed unavailable: {s}"),
            Self::Timeout => write!(f, "price feed timed out"),
        }
    }
}

impl std::error::Error for PriceFeedError {}

/// §4.1's object-safe capability trait, grounded on the teacher's
/// `Strategy: Send + Sync` shape. `None` means "unavailable", never an
/// error — callers must tolerate missing sources without biasing (§4.2).
#[async_trait]
pub trait SignalSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn evaluate(
        &self,
        window: &PriceWindow,
        portfolio: &PortfolioSnapshot,
    ) -> Option<Verdict>;

    /// Cheap liveness probe (§6); stub sources are always available.
    fn available(&self) -> bool {
        true
    }
}

/// Maps a continuous score in `[0,1]` to a [`Direction`], the same
/// 0.5-centered convention used everywhere in §4.1/§4.2.
pub fn direction_from_score(score: f64) -> Direction {
    if score > 0.5 {
        Direction::Up
    } else if score < 0.5 {
        Direction::Down
    } else {
        Direction::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(candles: Vec<Candle>, quote_micros: i64) -> PriceWindow {
        PriceWindow {
            symbol: "TEST".to_string(),
            candles,
            quote: Quote { price_micros: quote_micros },
        }
    }

    #[test]
    fn day_change_pct_uses_last_candle_open() {
        let w = window(
            vec![Candle {
                open_micros: 100_000_000,
                high_micros: 110_000_000,
                low_micros: 99_000_000,
                close_micros: 105_000_000,
                volume: 1000.0,
            }],
            110_000_000,
        );
        assert!((w.day_change_pct() - 0.10).abs() < 1e-9);
    }

    #[test]
    fn day_change_pct_zero_with_no_candles() {
        let w = window(vec![], 100_000_000);
        assert_eq!(w.day_change_pct(), 0.0);
    }

    #[test]
    fn direction_boundaries() {
        assert_eq!(direction_from_score(0.5), Direction::Neutral);
        assert_eq!(direction_from_score(0.50001), Direction::Up);
        assert_eq!(direction_from_score(0.49999), Direction::Down);
    }
}
