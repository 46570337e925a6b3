use std::collections::{BTreeMap, BTreeSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use aitr_signals::{Candle, PriceFeed, PriceFeedError, Quote};

/// Deterministic, scripted [`PriceFeed`] stand-in (§6: PriceFeed is an
/// out-of-scope external collaborator). Candles are a fixed per-symbol
/// history; quotes are a per-symbol script consumed one entry per call,
/// sticking on the last entry once exhausted so a test can under-script a
/// long-running scenario without erroring.
pub struct FakePriceFeed {
    candles: BTreeMap<String, Vec<Candle>>,
    quotes: Mutex<BTreeMap<String, VecDeque<Quote>>>,
    unavailable: BTreeSet<String>,
}

impl Default for FakePriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePriceFeed {
    pub fn new() -> Self {
        Self { candles: BTreeMap::new(), quotes: Mutex::new(BTreeMap::new()), unavailable: BTreeSet::new() }
    }

    pub fn with_candles(mut self, symbol: impl Into<String>, candles: Vec<Candle>) -> Self {
        self.candles.insert(symbol.into(), candles);
        self
    }

    pub fn with_quotes(mut self, symbol: impl Into<String>, quotes: Vec<Quote>) -> Self {
        self.quotes.get_mut().insert(symbol.into(), quotes.into());
        self
    }

    pub fn mark_unavailable(mut self, symbol: impl Into<String>) -> Self {
        self.unavailable.insert(symbol.into());
        self
    }
}

#[async_trait]
impl PriceFeed for FakePriceFeed {
    async fn get_candles(&self, symbol: &str, lookback: usize) -> Result<Vec<Candle>, PriceFeedError> {
        if self.unavailable.contains(symbol) {
            return Err(PriceFeedError::Unavailable(symbol.to_string()));
        }
        let candles = self.candles.get(symbol).cloned().unwrap_or_default();
        let skip = candles.len().saturating_sub(lookback);
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, PriceFeedError> {
        if self.unavailable.contains(symbol) {
            return Err(PriceFeedError::Unavailable(symbol.to_string()));
        }
        let mut quotes = self.quotes.lock().await;
        let script = quotes
            .get_mut(symbol)
            .ok_or_else(|| PriceFeedError::Unavailable(format!("no quote script for {symbol}")))?;
        let quote = if script.len() > 1 {
            script.pop_front().expect("len > 1 checked above")
        } else {
            *script.front().ok_or_else(|| PriceFeedError::Unavailable(format!("quote script exhausted for {symbol}")))?
        };
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn quote_script_advances_then_sticks_on_last() {
        let feed = FakePriceFeed::new().with_quotes(
            "AAPL",
            vec![Quote { price_micros: 100_000_000 }, Quote { price_micros: 101_000_000 }],
        );
        assert_eq!(feed.get_quote("AAPL").await.unwrap().price_micros, 100_000_000);
        assert_eq!(feed.get_quote("AAPL").await.unwrap().price_micros, 101_000_000);
        assert_eq!(feed.get_quote("AAPL").await.unwrap().price_micros, 101_000_000);
    }

    #[tokio::test]
    async fn candles_respect_lookback() {
        let candles = vec![
            Candle { open_micros: 1, high_micros: 2, low_micros: 1, close_micros: 2, volume: 1.0 },
            Candle { open_micros: 2, high_micros: 3, low_micros: 2, close_micros: 3, volume: 1.0 },
            Candle { open_micros: 3, high_micros: 4, low_micros: 3, close_micros: 4, volume: 1.0 },
        ];
        let feed = FakePriceFeed::new().with_candles("AAPL", candles);
        let got = feed.get_candles("AAPL", 2).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].close_micros, 3);
    }

    #[tokio::test]
    async fn marked_unavailable_symbol_always_errors() {
        let feed = FakePriceFeed::new().mark_unavailable("AAPL");
        assert!(feed.get_quote("AAPL").await.is_err());
        assert!(feed.get_candles("AAPL", 10).await.is_err());
    }
}
