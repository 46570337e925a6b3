//! §8 scenario S1: a clean majority-agreement buy through the full
//! evaluate_symbol pipeline (fusion -> risk gate -> sizing -> ledger).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use aitr_config::calendar::TradingCalendar;
use aitr_execution::{evaluate_symbol, SymbolTickParams};
use aitr_risk::{RiskGateConfig, RiskState};
use aitr_schemas::{
    BrokerProfile, CapitalConfig, DecisionType, Direction, LearningConfig, Portfolio,
    Reasoning, RiskConfig, RiskTolerance, ScheduleConfig, SentimentConfig, SignalsConfig,
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
    // Wednesday, well inside the NYSE session in America/New_York.
    Utc.with_ymd_and_hms(2026, 1, 7, 17, 0, 0).unwrap()
}

#[tokio::test]
async fn scenario_s1_clean_buy_opens_a_long_position() {
    let personality = personality();
    let now = trading_noon();
    let trader = Trader::new("s1-trader", personality.clone(), now);
    let mut portfolio = Portfolio::new(trader.id, 100_000 * 1_000_000, BrokerProfile::paper_default());
    let mut txns = Vec::new();

    let candles: Vec<Candle> = (0..20)
        .map(|_| Candle { open_micros: 100_000_000, high_micros: 101_000_000, low_micros: 99_000_000, close_micros: 100_000_000, volume: 1_000.0 })
        .collect();
    let price_feed = FakePriceFeed::new()
        .with_candles("AAPL", candles)
        .with_quotes("AAPL", vec![aitr_signals::Quote { price_micros: 100_000_000 }]);

    // GIVEN: ml/rl/sentiment agree up, technical dissents down.
    let sources: Vec<Arc<dyn SignalSource>> = vec![
        Arc::new(FakeSignalSource::new(SourceKind::Ml, vec![Some(Verdict::new(0.8, 0.9, Direction::Up, "s1"))])),
        Arc::new(FakeSignalSource::new(SourceKind::Rl, vec![Some(Verdict::new(0.75, 0.85, Direction::Up, "s1"))])),
        Arc::new(FakeSignalSource::new(SourceKind::Sentiment, vec![Some(Verdict::new(0.7, 0.8, Direction::Up, "s1"))])),
        Arc::new(FakeSignalSource::new(SourceKind::Technical, vec![Some(Verdict::new(0.4, 0.6, Direction::Down, "s1"))])),
    ];

    let risk_cfg = risk_cfg(&personality);
    let risk_state = RiskState::new(now, aitr_portfolio::equity_micros(&portfolio));
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

    // THEN: weighted score matches §4.2's worked example (0.25*(0.8+0.75+0.7+0.4) = 0.6625).
    let Reasoning::Fused { weighted_score, agreement, .. } = &decision.reasoning else {
        panic!("expected fused reasoning, got {:?}", decision.reasoning);
    };
    assert!((weighted_score - 0.6625).abs() < 1e-9);
    assert_eq!(*agreement, aitr_schemas::Agreement::Majority);

    assert_eq!(decision.decision_type, DecisionType::Buy);
    assert!(decision.executed);
    assert!(decision.resulting_position_id.is_some());
    assert!(decision.rejected_by.is_none());

    let position = &portfolio.positions[&decision.resulting_position_id.unwrap()];
    assert!(position.quantity > 0.0);
    assert_eq!(position.stop_loss_micros, Some(95_000_000));
    assert_eq!(position.take_profit_micros, Some(110_000_000));
    // paper broker profile carries no fees, so cash debited exactly by margin.
    assert_eq!(portfolio.cash_micros, 100_000 * 1_000_000 - position.margin_used_micros);
    assert_eq!(txns.len(), 1);
}
