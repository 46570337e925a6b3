//! Equity and exposure computation shared by the RiskGate checks 6–10 and
//! the scheduler's portfolio snapshots, grounded on `mqk-portfolio::metrics`'s
//! role of deriving account-level aggregates from position state rather than
//! tracking them as separately-mutated counters (which would drift).

use aitr_schemas::{Portfolio, Side};

/// Cash plus margin-plus-unrealized-P&L across every open position. Cash
/// already excludes reserved margin (debited at `open_position` time), so
/// this adds it back alongside the mark-to-market gain/loss.
pub fn equity_micros(portfolio: &Portfolio) -> i64 {
    let open_value: i64 = portfolio
        .open_positions()
        .map(|p| p.margin_used_micros + unrealized_pnl_micros(p))
        .sum();
    portfolio.cash_micros + open_value
}

/// Unrealized P&L of a single open position at its current mark.
pub fn unrealized_pnl_micros(position: &aitr_schemas::Position) -> i64 {
    let diff = position.current_price_micros - position.entry_price_micros;
    let signed_diff = match position.side {
        Side::Long => diff,
        Side::Short => -diff,
    };
    (signed_diff as f64 * position.quantity) as i64
}

/// Gross notional exposure across all open positions (absolute value, long
/// and short both count toward the total-exposure cap per §4.3 check 10).
pub fn total_exposure_micros(portfolio: &Portfolio) -> i64 {
    portfolio.open_positions().map(|p| p.notional_micros().abs()).sum()
}

/// Gross notional exposure already carried in one symbol (§4.3 check 9).
pub fn symbol_exposure_micros(portfolio: &Portfolio, symbol: &str) -> i64 {
    portfolio
        .open_positions()
        .filter(|p| p.symbol == symbol)
        .map(|p| p.notional_micros().abs())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aitr_schemas::{BrokerProfile, PositionId, ProductType, TraderId};
    use chrono::{TimeZone, Utc};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 7, 17, 0, 0).unwrap()
    }

    fn portfolio_with_long(entry: i64, current: i64, qty: f64) -> Portfolio {
        let mut p = Portfolio::new(TraderId::new(), 100_000_000_000, BrokerProfile::paper_default());
        p.cash_micros = 75_000_000_000;
        let position = aitr_schemas::Position {
            id: PositionId::new(),
            portfolio_id: p.id,
            symbol: "AAPL".to_string(),
            product_type: ProductType::Stock,
            side: Side::Long,
            quantity: qty,
            entry_price_micros: entry,
            current_price_micros: current,
            leverage: 1.0,
            margin_used_micros: 25_000_000_000,
            stop_loss_micros: None,
            take_profit_micros: None,
            knockout_level_micros: None,
            expiry_date: None,
            warrant: None,
            cumulative_fees_micros: 0,
            opened_at: now(),
            closed_at: None,
            close_reason: None,
            realized_pnl_micros: None,
        };
        p.positions.insert(position.id, position);
        p
    }

    #[test]
    fn equity_adds_unrealized_gain_on_top_of_cash_and_margin() {
        let p = portfolio_with_long(100_000_000, 110_000_000, 250.0);
        // gain = (110-100)*1e6 micros-per-dollar-diff * 250 shares = 2_500_000_000
        assert_eq!(equity_micros(&p), 75_000_000_000 + 25_000_000_000 + 2_500_000_000);
    }

    #[test]
    fn equity_subtracts_unrealized_loss() {
        let p = portfolio_with_long(100_000_000, 95_000_000, 250.0);
        assert_eq!(equity_micros(&p), 75_000_000_000 + 25_000_000_000 - 1_250_000_000);
    }

    #[test]
    fn total_exposure_sums_absolute_notional() {
        let p = portfolio_with_long(100_000_000, 110_000_000, 250.0);
        assert_eq!(total_exposure_micros(&p), 250.0 as i64 * 110_000_000);
    }

    #[test]
    fn symbol_exposure_ignores_other_symbols() {
        let p = portfolio_with_long(100_000_000, 110_000_000, 250.0);
        assert_eq!(symbol_exposure_micros(&p, "MSFT"), 0);
        assert!(symbol_exposure_micros(&p, "AAPL") > 0);
    }
}
