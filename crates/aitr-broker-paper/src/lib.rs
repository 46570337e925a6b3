//! aitr-broker-paper
//!
//! Deterministic broker profiles for paper trading. Real brokerage
//! connectivity is out of scope (spec.md §1 Non-goals); this crate's only
//! job is to supply the [`aitr_schemas::BrokerProfile`] commission/spread/
//! overnight-rate parameters `PortfolioLedger` fees against, grounded on
//! `mqk-broker-paper`'s "no randomness, no network IO" deterministic-adapter
//! stance — generalized here from order routing (unneeded, since
//! `aitr-portfolio::ledger` simulates fills directly) to profile selection.

use aitr_schemas::BrokerProfile;

/// Zero-commission, zero-spread profile: the baseline "no real broker" case
/// (§4.5 fee model), identical to `BrokerProfile::paper_default`.
pub fn zero_cost() -> BrokerProfile {
    BrokerProfile::paper_default()
}

/// A discount-broker-shaped profile with nonzero but modest commission and
/// spread, for traders whose personality wants fee drag to matter.
pub fn discount() -> BrokerProfile {
    BrokerProfile {
        id: "paper-discount".to_string(),
        flat_fee_micros: 1_000_000,
        percent_commission: 0.0005,
        min_commission_micros: 1_000_000,
        max_commission_micros: 50_000_000,
        spread_pct: 0.0002,
        cfd_overnight_long_rate: 0.00015,
        cfd_overnight_short_rate: 0.00008,
        margin_liquidation_level: 0.8,
        max_leverage: 20.0,
    }
}

/// A margin-heavy profile for leveraged-product personalities: wider
/// spread, lower liquidation headroom, higher max leverage.
pub fn margin_heavy() -> BrokerProfile {
    BrokerProfile {
        id: "paper-margin-heavy".to_string(),
        flat_fee_micros: 0,
        percent_commission: 0.0,
        min_commission_micros: 0,
        max_commission_micros: 0,
        spread_pct: 0.001,
        cfd_overnight_long_rate: 0.0003,
        cfd_overnight_short_rate: 0.00015,
        margin_liquidation_level: 0.6,
        max_leverage: 50.0,
    }
}

/// Looks up a named profile by its `BrokerProfile.id`-ish key, the way a
/// Trader's stored configuration references one. Unknown names fall back
/// to [`zero_cost`] rather than erroring — paper trading has no "broker
/// onboarding" failure mode.
pub fn by_name(name: &str) -> BrokerProfile {
    match name {
        "paper-discount" => discount(),
        "paper-margin-heavy" => margin_heavy(),
        _ => zero_cost(),
    }
}
