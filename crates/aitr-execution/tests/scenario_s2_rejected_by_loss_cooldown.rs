//! §8 scenario S2: the same personality as S1, but three consecutive losing
//! closes within the cooldown window must block a fresh open with no ledger
//! mutation at all.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use aitr_config::calendar::TradingCalendar;
use aitr_execution::{evaluate_symbol, SymbolTickParams};
use aitr_risk::{RiskGateConfig, RiskState};
use aitr_schemas::{
    BrokerProfile, CapitalConfig, DecisionType, Direction, LearningConfig, Portfolio,
    RiskConfig, RiskRejection, RiskTolerance, ScheduleConfig, SentimentConfig, SignalsConfig,
    SizingMethod, SourceKind, Trader, TradingConfig, Verdict, WatchlistConfig,
};
use aitr_signals::{Candle, SignalSource};
use aitr_testkit::{FakePriceFeed, FakeSignalSource};

fn personality() -> aitr_schemas::Personality {
    let weights: BTreeMap<SourceKind, f64> = SourceKind::ALL.iter().map(|s| (*s, 0.25)).collect();
    aitr_schemas::Personality {
        capital: CapitalConfig { initial_budget_micros: 100_000 * 1_000_000, max_position_percent: 0.25, reserve_cash_percent: 0.10 },
        risk: RiskConfig {
            tolerance: RiskTolerance::Moderate,
            max_drawdown_pct: 0.20,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
            daily_loss_pct: 0.05,
            total_exposure_pct: 0.80,
            loss_cooldown_trigger: 3,
            cooldown_minutes: 30,
        },
        signals: SignalsConfig { weights, min_agreement: 0.66 },
        trading: TradingConfig { min_confidence: 0.6, max_open_positions: 5, diversification: true, sizing_method: SizingMethod::Fixed },
        schedule: ScheduleConfig {
            enabled: true,
            check_interval_minutes: 15,
            trading_hours_only: true,
            timezone: "America/New_York".to_string(),
            trading_days: vec![1, 2, 3, 4, 5],
            trading_start: "09:30".to_string(),
            trading_end: "16:00".to_string(),
            avoid_open_min: 5,
            avoid_close_min: 5,
        },
        watchlist: WatchlistConfig { symbols: vec!["AAPL".to_string()], use_full_watchlist: false, product_types: BTreeMap::new() },
        sentiment: SentimentConfig { enabled: true, min_score: 0.0 },
        learning: LearningConfig {
            enabled: true,
            update_weights: true,
            min_trades_before_adjust: 20,
            accuracy_window_days: 30,
            max_weight_change: 0.05,
            correct_if_loss_above_micros: -100_000_000,
        },
    }
}

fn risk_cfg(p: &aitr_schemas::Personality) -> RiskGateConfig {
    RiskGateConfig {
        min_confidence: p.trading.min_confidence,
        min_agreement: p.signals.min_agreement,
        daily_loss_pct: p.risk.daily_loss_pct,
        max_drawdown_pct: p.risk.max_drawdown_pct,
        reserve_cash_percent: p.capital.reserve_cash_percent,
        max_open_positions: p.trading.max_open_positions,
        max_position_percent: p.capital.max_position_percent,
        total_exposure_pct: p.risk.total_exposure_pct,
        loss_cooldown_trigger: p.risk.loss_cooldown_trigger,
        cooldown_minutes: p.risk.cooldown_minutes,
    }
}

fn trading_noon() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 7, 17, 0, 0).unwrap()
}

#[tokio::test]
async fn scenario_s2_loss_cooldown_blocks_a_fresh_open() {
    let personality = personality();
    let now = trading_noon();
    let trader = Trader::new("s2-trader", personality.clone(), now);
    let mut portfolio = Portfolio::new(trader.id, 100_000 * 1_000_000, BrokerProfile::paper_default());
    let mut txns = Vec::new();
    let cash_before = portfolio.cash_micros;

    let candles: Vec<Candle> = (0..20)
        .map(|_| Candle { open_micros: 100_000_000, high_micros: 101_000_000, low_micros: 99_000_000, close_micros: 100_000_000, volume: 1_000.0 })
        .collect();
    let price_feed = FakePriceFeed::new()
        .with_candles("AAPL", candles)
        .with_quotes("AAPL", vec![aitr_signals::Quote { price_micros: 100_000_000 }]);

    let sources: Vec<Arc<dyn SignalSource>> = vec![
        Arc::new(FakeSignalSource::new(SourceKind::Ml, vec![Some(Verdict::new(0.8, 0.9, Direction::Up, "s2"))])),
        Arc::new(FakeSignalSource::new(SourceKind::Rl, vec![Some(Verdict::new(0.75, 0.85, Direction::Up, "s2"))])),
        Arc::new(FakeSignalSource::new(SourceKind::Sentiment, vec![Some(Verdict::new(0.7, 0.8, Direction::Up, "s2"))])),
        Arc::new(FakeSignalSource::new(SourceKind::Technical, vec![Some(Verdict::new(0.7, 0.7, Direction::Up, "s2"))])),
    ];

    let risk_cfg = risk_cfg(&personality);

    // GIVEN: three consecutive losing closes, the most recent 10 minutes ago
    // — well inside the configured 30-minute cooldown window.
    let mut risk_state = RiskState::new(now, aitr_portfolio::equity_micros(&portfolio));
    risk_state.record_trade_close(-5_000_000, now - chrono::Duration::minutes(25));
    risk_state.record_trade_close(-5_000_000, now - chrono::Duration::minutes(18));
    risk_state.record_trade_close(-5_000_000, now - chrono::Duration::minutes(10));

    let calendar = TradingCalendar::from_schedule(&personality.schedule).unwrap();
    let symbols = vec!["AAPL".to_string()];

    let decision = evaluate_symbol(SymbolTickParams {
        symbol: "AAPL",
        symbols_analyzed: &symbols,
        trader: &trader,
        portfolio: &mut portfolio,
        txns: &mut txns,
        sources: &sources,
        price_feed: &price_feed,
        risk_cfg: &risk_cfg,
        risk_state: &risk_state,
        calendar: &calendar,
        now,
        source_timeout: Duration::from_secs(1),
        candle_lookback: 20,
    })
    .await;

    assert_eq!(decision.decision_type, DecisionType::Skip);
    assert_eq!(decision.rejected_by, Some(RiskRejection::LossCooldownActive));
    assert!(!decision.executed);
    assert!(decision.resulting_position_id.is_none());
    assert!(portfolio.positions.is_empty());
    assert_eq!(portfolio.cash_micros, cash_before);
    assert!(txns.is_empty());
}
