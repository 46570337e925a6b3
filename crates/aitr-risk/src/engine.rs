//! The ten-stage RiskGate pipeline (§4.3): a fixed-order, short-circuit
//! walk over checks, each one a pure comparison against [`RiskInput`] and
//! [`RiskGateConfig`]. Grounded on `mqk-risk::engine::evaluate`'s shape:
//! mutate sticky state first, then walk checks in a declared order,
//! returning the first rejection.
//!
//! Checks 3, 4, and 6 bypass for close actions per spec text. Checks 7-10
//! (cash reserve, position count, symbol/total exposure) bypass for closes
//! too: a close only ever reduces exposure, so none of those limits can be
//! breached by one — extending the spec's bypass list by the same logic
//! the teacher applies when its sticky halt still permits `Flatten`.

use chrono::Duration;

use aitr_config::calendar::TradingCalendar;
use aitr_schemas::RiskRejection;

use crate::types::{RiskInput, RiskState};

#[derive(Clone, Debug, PartialEq)]
pub struct RiskGateConfig {
    pub min_confidence: f64,
    pub min_agreement: f64,
    pub daily_loss_pct: f64,
    pub max_drawdown_pct: f64,
    pub reserve_cash_percent: f64,
    pub max_open_positions: u32,
    pub max_position_percent: f64,
    pub total_exposure_pct: f64,
    pub loss_cooldown_trigger: u32,
    pub cooldown_minutes: i64,
}

/// Runs the ten checks in fixed order against `input`, consulting `state`
/// for the sticky conditions (drawdown, cooldown) and `calendar` for the
/// trading-hours check. Returns `Ok(())` if every applicable check passes,
/// or the first [`RiskRejection`] encountered.
///
/// Callers must run [`RiskState::tick`] before this on each new tick so
/// day-rollover and peak-equity bookkeeping stay current.
pub fn evaluate(
    cfg: &RiskGateConfig,
    state: &RiskState,
    calendar: &TradingCalendar,
    input: &RiskInput,
) -> Result<(), RiskRejection> {
    // 1. Confidence floor.
    if input.weighted_confidence < cfg.min_confidence {
        return Err(RiskRejection::InsufficientConfidence);
    }

    // 2. Agreement floor.
    if input.agreement_fraction < cfg.min_agreement {
        return Err(RiskRejection::InsufficientAgreement);
    }

    // 3. Trading hours (bypassed for closes).
    if !input.is_close && !calendar.is_trading_time(input.now) {
        return Err(RiskRejection::OutsideTradingWindow);
    }

    // 4. Loss cooldown (bypassed for closes).
    if !input.is_close {
        if let Some(last_loss) = state.last_loss_closed_at {
            let cooling_down = state.consecutive_losses >= cfg.loss_cooldown_trigger
                && input.now - last_loss < Duration::minutes(cfg.cooldown_minutes);
            if cooling_down {
                return Err(RiskRejection::LossCooldownActive);
            }
        }
    }

    // 5. Daily loss limit. Always enforced: a close that itself realizes
    // the breach must still be observable, but closes reduce exposure so
    // they are never the cause of a fresh breach; non-closes are blocked
    // outright once the day's floor is breached.
    let day_pnl_micros = input.equity_micros - state.day_start_equity_micros;
    let daily_floor_micros =
        -((cfg.daily_loss_pct * state.day_start_equity_micros as f64) as i64);
    if !input.is_close && day_pnl_micros < daily_floor_micros {
        return Err(RiskRejection::DailyLossLimitHit);
    }

    // 6. Max drawdown (bypassed for closes — "only closes permitted").
    if !input.is_close {
        let drawdown_floor_micros =
            (state.peak_equity_micros as f64 * (1.0 - cfg.max_drawdown_pct)) as i64;
        if input.equity_micros < drawdown_floor_micros {
            return Err(RiskRejection::DrawdownLimitHit);
        }
    }

    if input.is_close {
        return Ok(());
    }

    // 7. Cash reserve.
    let reserve_floor_micros = (cfg.reserve_cash_percent * input.initial_budget_micros as f64) as i64;
    if input.cash_after_trade_micros < reserve_floor_micros {
        return Err(RiskRejection::InsufficientCash);
    }

    // 8. Position count.
    if input.open_position_count >= cfg.max_open_positions {
        return Err(RiskRejection::MaxPositionsReached);
    }

    // 9. Symbol exposure.
    let symbol_exposure_after_micros =
        input.existing_symbol_exposure_micros + input.candidate_notional_micros;
    let symbol_exposure_cap_micros =
        (cfg.max_position_percent * input.initial_budget_micros as f64) as i64;
    if symbol_exposure_after_micros > symbol_exposure_cap_micros {
        return Err(RiskRejection::PositionSizeTooLarge);
    }

    // 10. Total exposure.
    let total_exposure_cap_micros =
        (cfg.total_exposure_pct * input.initial_budget_micros as f64) as i64;
    if input.total_exposure_after_trade_micros > total_exposure_cap_micros {
        return Err(RiskRejection::TotalExposureLimitHit);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aitr_config::calendar::TradingCalendar;
    use aitr_schemas::ScheduleConfig;
    use chrono::{TimeZone, Utc};

    fn calendar() -> TradingCalendar {
        let cfg = ScheduleConfig {
            enabled: true,
            check_interval_minutes: 15,
            trading_hours_only: true,
            timezone: "America/New_York".to_string(),
            trading_days: vec![1, 2, 3, 4, 5],
            trading_start: "09:30".to_string(),
            trading_end: "16:00".to_string(),
            avoid_open_min: 5,
            avoid_close_min: 5,
        };
        TradingCalendar::from_schedule(&cfg).unwrap()
    }

    fn cfg() -> RiskGateConfig {
        RiskGateConfig {
            min_confidence: 0.6,
            min_agreement: 0.66,
            daily_loss_pct: 0.05,
            max_drawdown_pct: 0.20,
            reserve_cash_percent: 0.10,
            max_open_positions: 5,
            max_position_percent: 0.25,
            total_exposure_pct: 0.80,
            loss_cooldown_trigger: 3,
            cooldown_minutes: 30,
        }
    }

    fn trading_noon() -> chrono::DateTime<Utc> {
        // 12:00 America/New_York during EST is 17:00 UTC; safely inside
        // [09:30+5m, 16:00-5m] on a Wednesday.
        Utc.with_ymd_and_hms(2026, 1, 7, 17, 0, 0).unwrap()
    }

    fn base_input() -> RiskInput {
        RiskInput {
            now: trading_noon(),
            is_close: false,
            weighted_confidence: 0.8,
            agreement_fraction: 0.66,
            equity_micros: 100_000_000_000,
            cash_after_trade_micros: 70_000_000_000,
            initial_budget_micros: 100_000_000_000,
            open_position_count: 1,
            existing_symbol_exposure_micros: 0,
            candidate_notional_micros: 25_000_000_000,
            total_exposure_after_trade_micros: 25_000_000_000,
        }
    }

    #[test]
    fn clean_input_passes_all_checks() {
        let state = RiskState::new(trading_noon(), 100_000_000_000);
        assert_eq!(evaluate(&cfg(), &state, &calendar(), &base_input()), Ok(()));
    }

    #[test]
    fn check1_confidence_floor_strict_inequality_at_threshold_passes() {
        let state = RiskState::new(trading_noon(), 100_000_000_000);
        let mut input = base_input();
        input.weighted_confidence = 0.6;
        assert_eq!(evaluate(&cfg(), &state, &calendar(), &input), Ok(()));
        input.weighted_confidence = 0.59999;
        assert_eq!(
            evaluate(&cfg(), &state, &calendar(), &input),
            Err(RiskRejection::InsufficientConfidence)
        );
    }

    #[test]
    fn check2_agreement_floor() {
        let state = RiskState::new(trading_noon(), 100_000_000_000);
        let mut input = base_input();
        input.agreement_fraction = 0.33;
        assert_eq!(
            evaluate(&cfg(), &state, &calendar(), &input),
            Err(RiskRejection::InsufficientAgreement)
        );
    }

    #[test]
    fn check3_outside_trading_hours_rejects_non_close_but_not_close() {
        let state = RiskState::new(trading_noon(), 100_000_000_000);
        let after_hours = Utc.with_ymd_and_hms(2026, 1, 7, 23, 0, 0).unwrap();
        let mut input = base_input();
        input.now = after_hours;
        assert_eq!(
            evaluate(&cfg(), &state, &calendar(), &input),
            Err(RiskRejection::OutsideTradingWindow)
        );
        input.is_close = true;
        assert_eq!(evaluate(&cfg(), &state, &calendar(), &input), Ok(()));
    }

    #[test]
    fn check4_loss_cooldown_blocks_opens_not_closes() {
        let mut state = RiskState::new(trading_noon(), 100_000_000_000);
        let loss_time = trading_noon() - Duration::minutes(10);
        state.consecutive_losses = 3;
        state.last_loss_closed_at = Some(loss_time);
        let mut input = base_input();
        assert_eq!(
            evaluate(&cfg(), &state, &calendar(), &input),
            Err(RiskRejection::LossCooldownActive)
        );
        input.is_close = true;
        assert_eq!(evaluate(&cfg(), &state, &calendar(), &input), Ok(()));
    }

    #[test]
    fn check4_cooldown_expires_after_window() {
        let mut state = RiskState::new(trading_noon(), 100_000_000_000);
        state.consecutive_losses = 3;
        state.last_loss_closed_at = Some(trading_noon() - Duration::minutes(31));
        assert_eq!(evaluate(&cfg(), &state, &calendar(), &base_input()), Ok(()));
    }

    #[test]
    fn check5_daily_loss_limit() {
        let mut state = RiskState::new(trading_noon(), 100_000_000_000);
        state.day_start_equity_micros = 100_000_000_000;
        let mut input = base_input();
        input.equity_micros = 94_000_000_000; // down 6% > 5% floor
        assert_eq!(
            evaluate(&cfg(), &state, &calendar(), &input),
            Err(RiskRejection::DailyLossLimitHit)
        );
    }

    #[test]
    fn check6_drawdown_limit_only_blocks_opens() {
        let mut state = RiskState::new(trading_noon(), 100_000_000_000);
        state.peak_equity_micros = 100_000_000_000;
        let mut input = base_input();
        input.equity_micros = 79_000_000_000; // down 21% > 20% floor
        assert_eq!(
            evaluate(&cfg(), &state, &calendar(), &input),
            Err(RiskRejection::DrawdownLimitHit)
        );
        input.is_close = true;
        assert_eq!(evaluate(&cfg(), &state, &calendar(), &input), Ok(()));
    }

    #[test]
    fn check7_cash_reserve() {
        let state = RiskState::new(trading_noon(), 100_000_000_000);
        let mut input = base_input();
        input.cash_after_trade_micros = 5_000_000_000; // below 10% reserve
        assert_eq!(
            evaluate(&cfg(), &state, &calendar(), &input),
            Err(RiskRejection::InsufficientCash)
        );
    }

    #[test]
    fn check8_position_count() {
        let state = RiskState::new(trading_noon(), 100_000_000_000);
        let mut input = base_input();
        input.open_position_count = 5;
        assert_eq!(
            evaluate(&cfg(), &state, &calendar(), &input),
            Err(RiskRejection::MaxPositionsReached)
        );
    }

    #[test]
    fn check9_symbol_exposure() {
        let state = RiskState::new(trading_noon(), 100_000_000_000);
        let mut input = base_input();
        input.existing_symbol_exposure_micros = 10_000_000_000;
        input.candidate_notional_micros = 20_000_000_000; // total 30k > 25k cap
        assert_eq!(
            evaluate(&cfg(), &state, &calendar(), &input),
            Err(RiskRejection::PositionSizeTooLarge)
        );
    }

    #[test]
    fn check10_total_exposure() {
        let state = RiskState::new(trading_noon(), 100_000_000_000);
        let mut input = base_input();
        input.total_exposure_after_trade_micros = 85_000_000_000; // > 80k cap
        assert_eq!(
            evaluate(&cfg(), &state, &calendar(), &input),
            Err(RiskRejection::TotalExposureLimitHit)
        );
    }

    #[test]
    fn closes_bypass_every_exposure_check_even_with_breached_values() {
        let mut state = RiskState::new(trading_noon(), 100_000_000_000);
        state.peak_equity_micros = 100_000_000_000;
        let input = RiskInput {
            now: trading_noon(),
            is_close: true,
            weighted_confidence: 0.8,
            agreement_fraction: 0.66,
            equity_micros: 60_000_000_000,
            cash_after_trade_micros: 0,
            initial_budget_micros: 100_000_000_000,
            open_position_count: 99,
            existing_symbol_exposure_micros: 999_000_000_000,
            candidate_notional_micros: 999_000_000_000,
            total_exposure_after_trade_micros: 999_000_000_000,
        };
        assert_eq!(evaluate(&cfg(), &state, &calendar(), &input), Ok(()));
        state.tick(trading_noon(), 60_000_000_000);
    }
}
