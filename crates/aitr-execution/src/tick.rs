use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};

use aitr_config::calendar::TradingCalendar;
use aitr_learning::compute_outcome;
use aitr_portfolio::{
    close_position, equity_micros, open_position, size_fixed, size_kelly, size_volatility_scaled,
    symbol_exposure_micros, total_exposure_micros, OpenIntent, SizingInput, SizingResult,
};
use aitr_risk::{evaluate as evaluate_risk, RiskGateConfig, RiskInput, RiskState};
use aitr_schemas::{
    CloseReason, Decision, DecisionId, DecisionOutcome, DecisionType, MarketContext,
    Portfolio, PortfolioSnapshot, ProductType, Reasoning, Side, SizingMethod, SourceKind,
    Trader, Transaction, Verdict,
};
use aitr_signals::{
    fuse, Candle, FusionOutcome, FusionResult, PriceFeed, ProposedAction, SignalSource,
};

/// Everything one `evaluate_symbol` call needs. Grouped into one struct
/// (rather than a dozen loose parameters) because several fields are
/// mutable borrows that must outlive the `.await` points inside the
/// function body.
pub struct SymbolTickParams<'a> {
    pub symbol: &'a str,
    pub symbols_analyzed: &'a [String],
    pub trader: &'a Trader,
    pub portfolio: &'a mut Portfolio,
    pub txns: &'a mut Vec<Transaction>,
    pub sources: &'a [Arc<dyn SignalSource>],
    pub price_feed: &'a dyn PriceFeed,
    pub risk_cfg: &'a RiskGateConfig,
    pub risk_state: &'a RiskState,
    pub calendar: &'a TradingCalendar,
    pub now: DateTime<Utc>,
    pub source_timeout: StdDuration,
    pub candle_lookback: usize,
}

/// Runs the full §4.6 step-3 pipeline for one symbol and returns the
/// resulting [`Decision`]. Never propagates a ledger or price-feed error
/// out of the tick; per §4.6/§7, those become `executed=false` /
/// `Skip`-with-detail decisions instead, so one bad symbol can't derail the
/// rest of the watchlist.
pub async fn evaluate_symbol(params: SymbolTickParams<'_>) -> Decision {
    let SymbolTickParams {
        symbol,
        symbols_analyzed,
        trader,
        portfolio,
        txns,
        sources,
        price_feed,
        risk_cfg,
        risk_state,
        calendar,
        now,
        source_timeout,
        candle_lookback,
    } = params;

    let snapshot_before = portfolio_snapshot(portfolio);

    let candles = match tokio::time::timeout(source_timeout, price_feed.get_candles(symbol, candle_lookback)).await
    {
        Ok(Ok(candles)) => candles,
        Ok(Err(e)) => return skip_decision(symbol, symbols_analyzed, trader, snapshot_before, now, format!("price feed: {e}")),
        Err(_) => return skip_decision(symbol, symbols_analyzed, trader, snapshot_before, now, "price feed timed out".to_string()),
    };
    let quote = match tokio::time::timeout(source_timeout, price_feed.get_quote(symbol)).await {
        Ok(Ok(quote)) => quote,
        Ok(Err(e)) => return skip_decision(symbol, symbols_analyzed, trader, snapshot_before, now, format!("price feed: {e}")),
        Err(_) => return skip_decision(symbol, symbols_analyzed, trader, snapshot_before, now, "price feed timed out".to_string()),
    };

    let window = aitr_signals::PriceWindow { symbol: symbol.to_string(), candles: candles.clone(), quote };

    let mut verdicts: BTreeMap<SourceKind, Verdict> = BTreeMap::new();
    for source in sources {
        if !source.available() {
            continue;
        }
        let fut = source.evaluate(&window, &snapshot_before);
        if let Ok(Some(verdict)) = tokio::time::timeout(source_timeout, fut).await {
            verdicts.insert(source.kind(), verdict);
        }
    }

    let market_context = MarketContext {
        symbol: symbol.to_string(),
        price_micros: quote.price_micros,
        day_change_pct: window.day_change_pct(),
        volatility: realized_volatility(&candles),
        volume: window.latest_volume(),
    };

    let fusion = match fuse(&verdicts, &trader.personality.signals.weights, trader.personality.trading.min_confidence) {
        FusionOutcome::Fused(result) => result,
        FusionOutcome::InsufficientSignals { absent_weight_mass } => {
            return Decision {
                id: DecisionId::new(),
                trader_id: trader.id,
                portfolio_id: portfolio.id,
                symbol: symbol.to_string(),
                symbols_analyzed: symbols_analyzed.to_vec(),
                decision_type: DecisionType::Skip,
                confidence: 0.0,
                reasoning: Reasoning::Forced {
                    detail: format!("insufficient signal coverage: {absent_weight_mass:.2} weight absent"),
                },
                market_context,
                portfolio_snapshot: snapshot_before,
                rejected_by: None,
                executed: false,
                resulting_position_id: None,
                resulting_order_id: None,
                execution_error: None,
                summary: "skipped: too many sources unavailable".to_string(),
                outcome: None,
                created_at: now,
            };
        }
    };

    let existing_position_id = portfolio.position_for_symbol(symbol).map(|p| p.id);
    let existing_side = portfolio.position_for_symbol(symbol).map(|p| p.side);

    let is_close = match existing_side {
        Some(Side::Long) => matches!(fusion.proposed, ProposedAction::SellOrShort),
        Some(Side::Short) => matches!(fusion.proposed, ProposedAction::Buy),
        None => false,
    };

    if is_close {
        let position_id = existing_position_id.unwrap();
        let risk_input = close_risk_input(portfolio, &fusion, now);
        if let Err(rejection) = evaluate_risk(risk_cfg, risk_state, calendar, &risk_input) {
            return rejected_decision(symbol, symbols_analyzed, trader, portfolio, &fusion, market_context, snapshot_before, rejection, now);
        }
        return match close_position(portfolio, position_id, quote.price_micros, CloseReason::User, now, txns) {
            Ok(pnl_micros) => {
                let snapshot_after = portfolio_snapshot(portfolio);
                let closed = &portfolio.positions[&position_id];
                let holding_days = (now - closed.opened_at).num_days();
                let outcome = compute_outcome(
                    DecisionType::Close,
                    pnl_micros,
                    closed.margin_used_micros,
                    holding_days,
                    trader.personality.learning.correct_if_loss_above_micros,
                );
                Decision {
                    id: DecisionId::new(),
                    trader_id: trader.id,
                    portfolio_id: portfolio.id,
                    symbol: symbol.to_string(),
                    symbols_analyzed: symbols_analyzed.to_vec(),
                    decision_type: DecisionType::Close,
                    confidence: fusion.weighted_confidence,
                    reasoning: fused_reasoning(&fusion),
                    market_context,
                    portfolio_snapshot: snapshot_after,
                    rejected_by: None,
                    executed: true,
                    resulting_position_id: Some(position_id),
                    resulting_order_id: None,
                    execution_error: None,
                    summary: format!("closed {symbol} for {pnl_micros} micros realized"),
                    outcome: Some(outcome),
                    created_at: now,
                }
            }
            Err(e) => Decision {
                id: DecisionId::new(),
                trader_id: trader.id,
                portfolio_id: portfolio.id,
                symbol: symbol.to_string(),
                symbols_analyzed: symbols_analyzed.to_vec(),
                decision_type: DecisionType::Close,
                confidence: fusion.weighted_confidence,
                reasoning: fused_reasoning(&fusion),
                market_context,
                portfolio_snapshot: snapshot_before,
                rejected_by: None,
                executed: false,
                resulting_position_id: Some(position_id),
                resulting_order_id: None,
                execution_error: Some(e.to_string()),
                summary: format!("close attempt failed for {symbol}"),
                outcome: None,
                created_at: now,
            },
        };
    }

    // Already holding the symbol in the same direction the fused signal
    // still favors (or the symbol has no actionable signal): nothing to do.
    if existing_position_id.is_some() || matches!(fusion.proposed, ProposedAction::Hold) {
        return hold_decision(symbol, symbols_analyzed, trader, portfolio, &fusion, market_context, snapshot_before, now);
    }

    let product = trader.personality.product_for_symbol(symbol);
    let side = match fusion.proposed {
        ProposedAction::Buy => Side::Long,
        ProposedAction::SellOrShort => {
            if !product.supports_short() {
                return hold_decision(symbol, symbols_analyzed, trader, portfolio, &fusion, market_context, snapshot_before, now);
            }
            Side::Short
        }
        ProposedAction::Hold => unreachable!("handled above"),
    };

    let sizing_input = SizingInput {
        side,
        product,
        price_micros: quote.price_micros,
        weighted_confidence: fusion.weighted_confidence,
        initial_budget_micros: trader.personality.capital.initial_budget_micros,
        max_position_percent: trader.personality.capital.max_position_percent,
        stop_loss_pct: trader.personality.risk.stop_loss_pct,
        take_profit_pct: trader.personality.risk.take_profit_pct,
        risk_tolerance: trader.personality.risk.tolerance,
        realized_vol: market_context.volatility,
        target_vol: 0.15,
    };

    let sizing = match trader.personality.trading.sizing_method {
        SizingMethod::Fixed => size_fixed(&sizing_input),
        SizingMethod::Kelly => size_kelly(&sizing_input, 1.0),
        SizingMethod::VolatilityScaled => size_volatility_scaled(&sizing_input),
    };
    let sizing: SizingResult = match sizing {
        Ok(s) => s,
        Err(e) => return hold_decision_with_detail(symbol, symbols_analyzed, trader, portfolio, &fusion, market_context, snapshot_before, now, format!("sizing failed: {e}")),
    };

    let risk_input = open_risk_input(portfolio, trader, &fusion, &sizing, symbol, now);
    if let Err(rejection) = evaluate_risk(risk_cfg, risk_state, calendar, &risk_input) {
        return rejected_decision(symbol, symbols_analyzed, trader, portfolio, &fusion, market_context, snapshot_before, rejection, now);
    }

    let decision_type = if side == Side::Long { DecisionType::Buy } else { DecisionType::Short };
    let intent = OpenIntent {
        symbol: symbol.to_string(),
        product_type: product,
        side,
        quantity: sizing.quantity,
        price_micros: quote.price_micros,
        leverage: 1.0,
        stop_loss_micros: Some(sizing.stop_loss_micros),
        take_profit_micros: Some(sizing.take_profit_micros),
        knockout_level_micros: None,
        expiry_date: None,
        warrant: None,
    };

    match open_position(portfolio, intent, now, txns) {
        Ok(position_id) => {
            let snapshot_after = portfolio_snapshot(portfolio);
            Decision {
                id: DecisionId::new(),
                trader_id: trader.id,
                portfolio_id: portfolio.id,
                symbol: symbol.to_string(),
                symbols_analyzed: symbols_analyzed.to_vec(),
                decision_type,
                confidence: fusion.weighted_confidence,
                reasoning: fused_reasoning(&fusion),
                market_context,
                portfolio_snapshot: snapshot_after,
                rejected_by: None,
                executed: true,
                resulting_position_id: Some(position_id),
                resulting_order_id: None,
                execution_error: None,
                summary: format!("opened {symbol} {} units", sizing.quantity),
                outcome: None,
                created_at: now,
            }
        }
        Err(e) => Decision {
            id: DecisionId::new(),
            trader_id: trader.id,
            portfolio_id: portfolio.id,
            symbol: symbol.to_string(),
            symbols_analyzed: symbols_analyzed.to_vec(),
            decision_type,
            confidence: fusion.weighted_confidence,
            reasoning: fused_reasoning(&fusion),
            market_context,
            portfolio_snapshot: snapshot_before,
            rejected_by: None,
            executed: false,
            resulting_position_id: None,
            resulting_order_id: None,
            execution_error: Some(e.to_string()),
            summary: format!("ledger rejected open for {symbol}"),
            outcome: None,
            created_at: now,
        },
    }
}

fn portfolio_snapshot(portfolio: &Portfolio) -> PortfolioSnapshot {
    PortfolioSnapshot {
        cash_micros: portfolio.cash_micros,
        equity_micros: equity_micros(portfolio),
        open_position_count: portfolio.open_positions().count() as u32,
        margin_used_micros: portfolio.margin_used_total_micros(),
        daily_pnl_micros: 0,
    }
}

fn fused_reasoning(fusion: &FusionResult) -> Reasoning {
    Reasoning::Fused {
        per_source: fusion.per_source.clone(),
        weighted_score: fusion.weighted_score,
        agreement: fusion.agreement,
    }
}

fn hold_decision(
    symbol: &str,
    symbols_analyzed: &[String],
    trader: &Trader,
    portfolio: &Portfolio,
    fusion: &FusionResult,
    market_context: MarketContext,
    snapshot: PortfolioSnapshot,
    now: DateTime<Utc>,
) -> Decision {
    hold_decision_with_detail(symbol, symbols_analyzed, trader, portfolio, fusion, market_context, snapshot, now, "no actionable signal".to_string())
}

fn hold_decision_with_detail(
    symbol: &str,
    symbols_analyzed: &[String],
    trader: &Trader,
    portfolio: &Portfolio,
    fusion: &FusionResult,
    market_context: MarketContext,
    snapshot: PortfolioSnapshot,
    now: DateTime<Utc>,
    detail: String,
) -> Decision {
    Decision {
        id: DecisionId::new(),
        trader_id: trader.id,
        portfolio_id: portfolio.id,
        symbol: symbol.to_string(),
        symbols_analyzed: symbols_analyzed.to_vec(),
        decision_type: DecisionType::Hold,
        confidence: fusion.weighted_confidence,
        reasoning: fused_reasoning(fusion),
        market_context,
        portfolio_snapshot: snapshot,
        rejected_by: None,
        executed: false,
        resulting_position_id: None,
        resulting_order_id: None,
        execution_error: None,
        summary: detail,
        outcome: None,
        created_at: now,
    }
}

fn rejected_decision(
    symbol: &str,
    symbols_analyzed: &[String],
    trader: &Trader,
    portfolio: &Portfolio,
    fusion: &FusionResult,
    market_context: MarketContext,
    snapshot: PortfolioSnapshot,
    rejection: aitr_schemas::RiskRejection,
    now: DateTime<Utc>,
) -> Decision {
    Decision {
        id: DecisionId::new(),
        trader_id: trader.id,
        portfolio_id: portfolio.id,
        symbol: symbol.to_string(),
        symbols_analyzed: symbols_analyzed.to_vec(),
        decision_type: DecisionType::Skip,
        confidence: fusion.weighted_confidence,
        reasoning: Reasoning::Rejected { stage: rejection, detail: rejection.to_string() },
        market_context,
        portfolio_snapshot: snapshot,
        rejected_by: Some(rejection),
        executed: false,
        resulting_position_id: None,
        resulting_order_id: None,
        execution_error: None,
        summary: format!("rejected by risk gate: {rejection}"),
        outcome: None,
        created_at: now,
    }
}

fn skip_decision(
    symbol: &str,
    symbols_analyzed: &[String],
    trader: &Trader,
    snapshot: PortfolioSnapshot,
    now: DateTime<Utc>,
    detail: String,
) -> Decision {
    Decision {
        id: DecisionId::new(),
        trader_id: trader.id,
        portfolio_id: trader.portfolio_id.unwrap_or_default(),
        symbol: symbol.to_string(),
        symbols_analyzed: symbols_analyzed.to_vec(),
        decision_type: DecisionType::Skip,
        confidence: 0.0,
        reasoning: Reasoning::Forced { detail: detail.clone() },
        market_context: MarketContext {
            symbol: symbol.to_string(),
            price_micros: 0,
            day_change_pct: 0.0,
            volatility: 0.0,
            volume: 0.0,
        },
        portfolio_snapshot: snapshot,
        rejected_by: None,
        executed: false,
        resulting_position_id: None,
        resulting_order_id: None,
        execution_error: Some(detail),
        summary: "skipped: price feed unavailable".to_string(),
        outcome: None,
        created_at: now,
    }
}

fn close_risk_input(portfolio: &Portfolio, fusion: &FusionResult, now: DateTime<Utc>) -> RiskInput {
    RiskInput {
        now,
        is_close: true,
        weighted_confidence: fusion.weighted_confidence,
        agreement_fraction: fusion.agreement.as_fraction(),
        equity_micros: equity_micros(portfolio),
        cash_after_trade_micros: portfolio.cash_micros,
        initial_budget_micros: portfolio.initial_capital_micros,
        open_position_count: portfolio.open_positions().count() as u32,
        existing_symbol_exposure_micros: 0,
        candidate_notional_micros: 0,
        total_exposure_after_trade_micros: total_exposure_micros(portfolio),
    }
}

fn open_risk_input(
    portfolio: &Portfolio,
    trader: &Trader,
    fusion: &FusionResult,
    sizing: &SizingResult,
    symbol: &str,
    now: DateTime<Utc>,
) -> RiskInput {
    let leverage = 1.0_f64;
    let margin_micros = (sizing.notional_micros as f64 / leverage) as i64;
    let product = trader.personality.product_for_symbol(symbol);
    let commission = aitr_portfolio::fees::commission_micros(&portfolio.broker_profile, product, sizing.notional_micros);
    let spread = aitr_portfolio::fees::spread_cost_micros(&portfolio.broker_profile, sizing.notional_micros);
    let cash_after_trade_micros = portfolio.cash_micros - margin_micros - commission - spread;

    RiskInput {
        now,
        is_close: false,
        weighted_confidence: fusion.weighted_confidence,
        agreement_fraction: fusion.agreement.as_fraction(),
        equity_micros: equity_micros(portfolio),
        cash_after_trade_micros,
        initial_budget_micros: portfolio.initial_capital_micros,
        open_position_count: portfolio.open_positions().count() as u32,
        existing_symbol_exposure_micros: symbol_exposure_micros(portfolio, symbol),
        candidate_notional_micros: sizing.notional_micros,
        total_exposure_after_trade_micros: total_exposure_micros(portfolio) + sizing.notional_micros,
    }
}

/// Population standard deviation of simple close-to-close returns over the
/// window, a crude realized-volatility proxy for the `VolatilityScaled`
/// sizer and the `MarketContext.volatility` field. Not a pricing model.
fn realized_volatility(candles: &[Candle]) -> f64 {
    if candles.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = candles
        .windows(2)
        .filter(|w| w[0].close_micros != 0)
        .map(|w| (w[1].close_micros - w[0].close_micros) as f64 / w[0].close_micros as f64)
        .collect();
    if returns.is_empty() {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    variance.sqrt()
}
