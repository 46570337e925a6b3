//! Deterministic stub implementations of the four §4.1 source kinds.
//!
//! None of these run real inference (out of scope per §1) — each is a
//! small, idempotent function of the candle window, suitable as a stand-in
//! for paper trading and for exercising the rest of the pipeline.

use async_trait::async_trait;

use aitr_schemas::{PortfolioSnapshot, SourceKind, Verdict};

use crate::{direction_from_score, PriceWindow, SignalSource};

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

fn sma(candles: &[crate::Candle], n: usize) -> Option<f64> {
    if candles.len() < n || n == 0 {
        return None;
    }
    let tail = &candles[candles.len() - n..];
    Some(tail.iter().map(|c| c.close_micros as f64).sum::<f64>() / n as f64)
}

/// Momentum stub: compares the latest close to a 20-bar SMA. Stands in for
/// the ML price predictor (§1 "opaque ML price predictor" collaborator).
#[derive(Clone, Copy, Debug, Default)]
pub struct MlSource;

#[async_trait]
impl SignalSource for MlSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Ml
    }

    async fn evaluate(&self, window: &PriceWindow, _portfolio: &PortfolioSnapshot) -> Option<Verdict> {
        let last = window.candles.last()?.close_micros as f64;
        let avg = sma(&window.candles, 20)?;
        if avg == 0.0 {
            return None;
        }
        let deviation = (last - avg) / avg;
        // Map a +/-5% deviation band onto [0,1], centered at 0.5.
        let score = clamp01(0.5 + deviation * 10.0);
        let confidence = clamp01(deviation.abs() * 10.0 + 0.3);
        Some(Verdict::new(
            score,
            confidence,
            direction_from_score(score),
            format!("price {deviation:.4} off 20-bar SMA"),
        ))
    }
}

/// Breakout stub: compares the latest close to the rolling high/low range.
/// Stands in for the RL action policy (§1).
#[derive(Clone, Copy, Debug, Default)]
pub struct RlSource;

#[async_trait]
impl SignalSource for RlSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Rl
    }

    async fn evaluate(&self, window: &PriceWindow, _portfolio: &PortfolioSnapshot) -> Option<Verdict> {
        if window.candles.len() < 10 {
            return None;
        }
        let tail = &window.candles[window.candles.len() - 10..];
        let high = tail.iter().map(|c| c.high_micros).max()?;
        let low = tail.iter().map(|c| c.low_micros).min()?;
        if high == low {
            return None;
        }
        let last = window.candles.last()?.close_micros;
        let pos_in_range = (last - low) as f64 / (high - low) as f64;
        let score = clamp01(pos_in_range);
        let confidence = clamp01((pos_in_range - 0.5).abs() * 1.6 + 0.2);
        Some(Verdict::new(
            score,
            confidence,
            direction_from_score(score),
            format!("{:.2} of 10-bar range", pos_in_range),
        ))
    }
}

/// Day-change stub: a crude proxy for news/sentiment polarity, since no
/// text corpus is available in paper trading. Stands in for the sentiment
/// analyzer (§1).
#[derive(Clone, Copy, Debug, Default)]
pub struct SentimentSource;

#[async_trait]
impl SignalSource for SentimentSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Sentiment
    }

    async fn evaluate(&self, window: &PriceWindow, _portfolio: &PortfolioSnapshot) -> Option<Verdict> {
        if window.candles.is_empty() {
            return None;
        }
        let change = window.day_change_pct();
        let score = clamp01(0.5 + change * 5.0);
        let confidence = clamp01(change.abs() * 8.0 + 0.2);
        Some(Verdict::new(
            score,
            confidence,
            direction_from_score(score),
            format!("day change {:.4}", change),
        ))
    }
}

/// Moving-average crossover stub for a conventional technical indicator.
#[derive(Clone, Copy, Debug, Default)]
pub struct TechnicalSource;

#[async_trait]
impl SignalSource for TechnicalSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Technical
    }

    async fn evaluate(&self, window: &PriceWindow, _portfolio: &PortfolioSnapshot) -> Option<Verdict> {
        let fast = sma(&window.candles, 5)?;
        let slow = sma(&window.candles, 20)?;
        if slow == 0.0 {
            return None;
        }
        let spread = (fast - slow) / slow;
        let score = clamp01(0.5 + spread * 8.0);
        let confidence = clamp01(spread.abs() * 12.0 + 0.25);
        Some(Verdict::new(
            score,
            confidence,
            direction_from_score(score),
            format!("5/20 SMA spread {:.4}", spread),
        ))
    }
}
