//! Product-aware fee model (§4.5): commission, spread, overnight carry, and
//! warrant theta decay, all computed in micros from a [`BrokerProfile`].

use aitr_schemas::{BrokerProfile, ProductType, Side};

/// Commission per broker profile: `flat + percent·notional`, clamped into
/// `[min_commission, max_commission]`. Knockouts carry zero commission
/// (§4.5 fee model table).
pub fn commission_micros(broker: &BrokerProfile, product: ProductType, notional_micros: i64) -> i64 {
    if matches!(product, ProductType::Knockout | ProductType::Warrant) {
        return 0;
    }
    let percent_micros = (notional_micros as f64 * broker.percent_commission) as i64;
    let raw = broker.flat_fee_micros + percent_micros;
    raw.clamp(broker.min_commission_micros, broker.max_commission_micros)
}

/// Spread cost = `spreadPct · notional` (§4.5). Knockouts use a wider
/// spread but still route through the same formula — the wider rate lives
/// in the broker profile, not as a special case here.
pub fn spread_cost_micros(broker: &BrokerProfile, notional_micros: i64) -> i64 {
    (notional_micros.unsigned_abs() as f64 * broker.spread_pct) as i64
}

/// One day's overnight carry for CFD/factor positions: `rate · notional`,
/// rate selected by side (§4.5: `longRate`/`shortRate`). Zero for stock,
/// knockout, and warrant (warrants decay via theta instead).
pub fn overnight_fee_micros(
    broker: &BrokerProfile,
    product: ProductType,
    side: Side,
    notional_micros: i64,
) -> i64 {
    match product {
        ProductType::Cfd | ProductType::Factor => {
            let rate = match side {
                Side::Long => broker.cfd_overnight_long_rate,
                Side::Short => broker.cfd_overnight_short_rate,
            };
            (notional_micros.unsigned_abs() as f64 * rate) as i64
        }
        ProductType::Stock | ProductType::Knockout | ProductType::Warrant => 0,
    }
}

/// Crude Black-Scholes-free theta proxy: time value decays linearly to
/// zero as `days_to_expiry` shrinks, scaled by `implied_vol`. Good enough
/// for paper trading's daily decay job (§4.5); not a pricing model.
pub fn warrant_theta_decay_micros(
    time_value_micros: i64,
    days_to_expiry: i64,
    implied_vol: f64,
) -> i64 {
    if days_to_expiry <= 0 || time_value_micros <= 0 {
        return time_value_micros.max(0);
    }
    let daily_fraction = (1.0 / days_to_expiry as f64) * (0.5 + implied_vol.clamp(0.0, 5.0));
    ((time_value_micros as f64) * daily_fraction.min(1.0)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> BrokerProfile {
        BrokerProfile {
            id: "test".to_string(),
            flat_fee_micros: 1_000_000,
            percent_commission: 0.001,
            min_commission_micros: 500_000,
            max_commission_micros: 50_000_000,
            spread_pct: 0.0005,
            cfd_overnight_long_rate: 0.0002,
            cfd_overnight_short_rate: 0.0001,
            margin_liquidation_level: 0.8,
            max_leverage: 20.0,
        }
    }

    #[test]
    fn commission_applies_flat_plus_percent() {
        let c = commission_micros(&broker(), ProductType::Stock, 25_000_000_000);
        assert_eq!(c, 1_000_000 + 25_000_000);
    }

    #[test]
    fn commission_clamped_to_min() {
        let c = commission_micros(&broker(), ProductType::Stock, 0);
        assert_eq!(c, 500_000);
    }

    #[test]
    fn knockout_has_zero_commission() {
        assert_eq!(commission_micros(&broker(), ProductType::Knockout, 25_000_000_000), 0);
    }

    #[test]
    fn cfd_overnight_rate_depends_on_side() {
        let long_fee = overnight_fee_micros(&broker(), ProductType::Cfd, Side::Long, 100_000_000_000);
        let short_fee = overnight_fee_micros(&broker(), ProductType::Cfd, Side::Short, 100_000_000_000);
        assert_eq!(long_fee, 20_000_000);
        assert_eq!(short_fee, 10_000_000);
    }

    #[test]
    fn stock_has_no_overnight_fee() {
        assert_eq!(overnight_fee_micros(&broker(), ProductType::Stock, Side::Long, 100_000_000_000), 0);
    }

    #[test]
    fn theta_decay_consumes_remaining_value_at_expiry() {
        assert_eq!(warrant_theta_decay_micros(1_000_000, 0, 0.3), 1_000_000);
    }
}
