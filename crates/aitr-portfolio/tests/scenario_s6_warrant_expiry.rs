//! §8 scenario S6: a call warrant that expires out-of-the-money settles at
//! (near-)zero intrinsic value, realizing a loss equal to the premium paid.

use chrono::{TimeZone, Utc};

use aitr_portfolio::{open_position, settle_expired, OpenIntent};
use aitr_schemas::{
    BrokerProfile, CloseReason, OptionType, Portfolio, ProductType, Side, TraderId, WarrantTerms,
};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 7, 17, 0, 0).unwrap()
}

#[test]
fn scenario_s6_otm_call_warrant_settles_at_intrinsic_value_zero() {
    let mut portfolio = Portfolio::new(TraderId::new(), 100_000 * 1_000_000, BrokerProfile::paper_default());
    let mut txns = Vec::new();

    // GIVEN: a call warrant, strike $100, 10 units bought at $5 each,
    // expiring an hour before `now`.
    let entry_price_micros = 5_000_000;
    let quantity = 10.0;
    let intent = OpenIntent {
        symbol: "NVDA_C100".to_string(),
        product_type: ProductType::Warrant,
        side: Side::Long,
        quantity,
        price_micros: entry_price_micros,
        leverage: 1.0,
        stop_loss_micros: None,
        take_profit_micros: None,
        knockout_level_micros: None,
        expiry_date: Some(now() - chrono::Duration::hours(1)),
        warrant: Some(WarrantTerms { strike_micros: 100_000_000, option_type: OptionType::Call, ratio: 1.0, implied_vol: 0.4 }),
    };
    let position_id = open_position(&mut portfolio, intent, now() - chrono::Duration::days(30), &mut txns).unwrap();
    let entry_cost_micros = portfolio.positions[&position_id].margin_used_micros;

    // Last mark-to-market before expiry saw the underlying at $95 — below
    // the $100 strike, so the call is worthless.
    portfolio.positions.get_mut(&position_id).unwrap().current_price_micros = 95_000_000;

    // WHEN: daily maintenance settles everything past its expiry date.
    let settled = settle_expired(&mut portfolio, now(), &mut txns);

    // THEN: intrinsic value is exactly 0, so realized loss is exactly the
    // premium paid — not off by a floored-to-1-micro settlement price.
    assert_eq!(settled, vec![position_id]);
    let closed = &portfolio.positions[&position_id];
    assert!(!closed.is_open());
    assert_eq!(closed.close_reason, Some(CloseReason::Expiry));

    let close_price_micros = 0i64;
    let expected_pnl_micros = (close_price_micros - entry_price_micros) * quantity as i64;
    assert_eq!(closed.realized_pnl_micros, Some(expected_pnl_micros));
    assert_eq!(closed.realized_pnl_micros, Some(-entry_cost_micros));

    assert_eq!(txns.len(), 2); // open + expiry close
    let close_txn = txns.last().unwrap();
    assert_eq!(close_txn.position_id, Some(position_id));
}

#[test]
fn scenario_s6_itm_call_warrant_settles_above_zero() {
    let mut portfolio = Portfolio::new(TraderId::new(), 100_000 * 1_000_000, BrokerProfile::paper_default());
    let mut txns = Vec::new();

    let intent = OpenIntent {
        symbol: "NVDA_C100".to_string(),
        product_type: ProductType::Warrant,
        side: Side::Long,
        quantity: 10.0,
        price_micros: 5_000_000,
        leverage: 1.0,
        stop_loss_micros: None,
        take_profit_micros: None,
        knockout_level_micros: None,
        expiry_date: Some(now() - chrono::Duration::hours(1)),
        warrant: Some(WarrantTerms { strike_micros: 100_000_000, option_type: OptionType::Call, ratio: 1.0, implied_vol: 0.4 }),
    };
    let position_id = open_position(&mut portfolio, intent, now() - chrono::Duration::days(30), &mut txns).unwrap();

    // Underlying settled at $112 — $12 of intrinsic value per warrant.
    portfolio.positions.get_mut(&position_id).unwrap().current_price_micros = 112_000_000;

    settle_expired(&mut portfolio, now(), &mut txns);

    let closed = &portfolio.positions[&position_id];
    assert_eq!(closed.close_reason, Some(CloseReason::Expiry));
    // (112 - 100) strike diff * 10 units of premium paid at 5 each: gross
    // pnl is against entry price, not strike, so (12_000_000 - 5_000_000)*10.
    assert_eq!(closed.realized_pnl_micros, Some((12_000_000 - 5_000_000) * 10));
}
