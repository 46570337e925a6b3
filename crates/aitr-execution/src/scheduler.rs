//! §4.6 step 3's whole-tick wrapper: mark every open position to market
//! first (so stop-loss/take-profit/knockout/margin-call closes are settled
//! before any new opening is considered, per the ordering guarantee in
//! §4.5/§5), then walk the symbol set sequentially through
//! [`crate::evaluate_symbol`]. `aitr-runtime`'s per-trader worker calls
//! this once per wake; it owns the store round-trip, RiskState tick, and
//! cancellation checks this module deliberately doesn't know about.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};

use aitr_config::calendar::TradingCalendar;
use aitr_portfolio::mark_to_market;
use aitr_risk::{RiskGateConfig, RiskState};
use aitr_schemas::{Decision, Portfolio, Trader, Transaction};
use aitr_signals::{PriceFeed, SignalSource};

use crate::tick::{evaluate_symbol, SymbolTickParams};

/// Output of one full trader tick: every [`Decision`] produced (one per
/// symbol considered, per §4.6 step 4) plus the transactions the ledger
/// appended along the way (new opens/closes and any mark-to-market
/// auto-closes).
pub struct TickOutcome {
    pub decisions: Vec<Decision>,
    pub txns: Vec<Transaction>,
}

#[allow(clippy::too_many_arguments)]
pub async fn run_trader_tick(
    trader: &Trader,
    portfolio: &mut Portfolio,
    symbols: &[String],
    sources: &[Arc<dyn SignalSource>],
    price_feed: &dyn PriceFeed,
    risk_cfg: &RiskGateConfig,
    risk_state: &RiskState,
    calendar: &TradingCalendar,
    now: DateTime<Utc>,
    source_timeout: StdDuration,
    candle_lookback: usize,
) -> TickOutcome {
    let mut txns = Vec::new();

    let open_symbols: Vec<String> = portfolio.open_positions().map(|p| p.symbol.clone()).collect();
    let mut quotes = BTreeMap::new();
    for symbol in &open_symbols {
        if let Ok(quote) = tokio::time::timeout(source_timeout, price_feed.get_quote(symbol)).await {
            if let Ok(quote) = quote {
                quotes.insert(symbol.clone(), quote.price_micros);
            }
        }
    }
    mark_to_market(portfolio, &quotes, now, &mut txns);

    let mut decisions = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let decision = evaluate_symbol(SymbolTickParams {
            symbol,
            symbols_analyzed: symbols,
            trader,
            portfolio,
            txns: &mut txns,
            sources,
            price_feed,
            risk_cfg,
            risk_state,
            calendar,
            now,
            source_timeout,
            candle_lookback,
        })
        .await;
        decisions.push(decision);
    }

    TickOutcome { decisions, txns }
}
