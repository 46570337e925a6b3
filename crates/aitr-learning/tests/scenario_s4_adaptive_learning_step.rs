//! §8 scenario S4: 40 resolved decisions with known per-source accuracy
//! (ml 30/40, rl 20/40, sentiment 15/40, technical 25/40) should shift
//! equal starting weights toward the more accurate sources, each by at most
//! `maxWeightChange`, renormalized back to 1.

use std::collections::BTreeMap;

use chrono::Utc;

use aitr_learning::{run_learning_step, LearningOutcome};
use aitr_schemas::{
    Agreement, CapitalConfig, Decision, DecisionId, DecisionOutcome, DecisionType, Direction,
    LearningConfig, MarketContext, Personality, PortfolioId, PortfolioSnapshot, Reasoning,
    RiskConfig, RiskTolerance, ScheduleConfig, SentimentConfig, SignalsConfig, SizingMethod,
    SourceKind, TraderId, TradingConfig, Verdict, WatchlistConfig,
};

fn personality(weights: BTreeMap<SourceKind, f64>) -> Personality {
    Personality {
        capital: CapitalConfig { initial_budget_micros: 100_000_000_000, max_position_percent: 0.25, reserve_cash_percent: 0.10 },
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
            min_trades_before_adjust: 10,
            accuracy_window_days: 30,
            max_weight_change: 0.05,
            correct_if_loss_above_micros: -100_000_000,
        },
    }
}

/// Builds the `i`th of 40 decisions. Every decision is a correct `Buy`
/// (`weighted_score` > 0.5), so a source's hit count equals its count of
/// `Up` verdicts across the 40 — which the `ups` closure controls per
/// source to land exactly on the scenario's target accuracy fractions.
fn decision(i: usize, ups: &BTreeMap<SourceKind, usize>) -> Decision {
    let mut per_source = BTreeMap::new();
    for source in SourceKind::ALL {
        let direction = if i < ups[&source] { Direction::Up } else { Direction::Down };
        per_source.insert(source, Verdict::new(0.8, 0.8, direction, "s4"));
    }
    Decision {
        id: DecisionId::new(),
        trader_id: TraderId::new(),
        portfolio_id: PortfolioId::new(),
        symbol: "AAPL".to_string(),
        symbols_analyzed: vec!["AAPL".to_string()],
        decision_type: DecisionType::Buy,
        confidence: 0.8,
        reasoning: Reasoning::Fused { per_source, weighted_score: 0.8, agreement: Agreement::Full },
        market_context: MarketContext { symbol: "AAPL".to_string(), price_micros: 100_000_000, day_change_pct: 0.0, volatility: 0.1, volume: 0.0 },
        portfolio_snapshot: PortfolioSnapshot { cash_micros: 0, equity_micros: 0, open_position_count: 0, margin_used_micros: 0, daily_pnl_micros: 0 },
        rejected_by: None,
        executed: true,
        resulting_position_id: None,
        resulting_order_id: None,
        execution_error: None,
        summary: "s4".to_string(),
        outcome: Some(DecisionOutcome { pnl_micros: 1, pnl_pct: 0.01, holding_days: 1, was_correct: true }),
        created_at: Utc::now(),
    }
}

#[test]
fn scenario_s4_weights_shift_toward_more_accurate_sources() {
    let mut weights = BTreeMap::new();
    for source in SourceKind::ALL {
        weights.insert(source, 0.25);
    }
    let personality = personality(weights);

    let ups: BTreeMap<SourceKind, usize> = [
        (SourceKind::Ml, 30),
        (SourceKind::Rl, 20),
        (SourceKind::Sentiment, 15),
        (SourceKind::Technical, 25),
    ]
    .into_iter()
    .collect();

    let decisions: Vec<Decision> = (0..40).map(|i| decision(i, &ups)).collect();

    let outcome = run_learning_step(TraderId::new(), &personality, &decisions, Utc::now());
    let history = match outcome {
        LearningOutcome::Adjusted(history) => history,
        LearningOutcome::Skipped { reason } => panic!("expected an adjustment, got skipped({reason})"),
    };

    // Accuracy snapshot matches the scenario's scripted fractions exactly.
    assert!((history.accuracy_snapshot[&SourceKind::Ml] - 0.75).abs() < 1e-9);
    assert!((history.accuracy_snapshot[&SourceKind::Rl] - 0.50).abs() < 1e-9);
    assert!((history.accuracy_snapshot[&SourceKind::Sentiment] - 0.375).abs() < 1e-9);
    assert!((history.accuracy_snapshot[&SourceKind::Technical] - 0.625).abs() < 1e-9);

    // ml (most accurate) moved up, sentiment (least accurate) moved down.
    assert!(history.new_weights[&SourceKind::Ml] > history.old_weights[&SourceKind::Ml]);
    assert!(history.new_weights[&SourceKind::Sentiment] < history.old_weights[&SourceKind::Sentiment]);

    let sum: f64 = history.new_weights.values().sum();
    assert!((sum - 1.0).abs() < 1e-9);
    for w in history.new_weights.values() {
        assert!((0.05..=0.5).contains(w), "weight {w} escaped the [0.05, 0.5] clamp");
    }
}
