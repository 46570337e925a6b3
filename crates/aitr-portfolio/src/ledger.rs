//! PortfolioLedger (§4.5): the single mutator of cash, positions, orders,
//! and transactions for one [`Portfolio`]. Every operation either fully
//! applies or leaves the portfolio untouched — grounded on
//! `mqk-portfolio::ledger::Ledger`'s invariant-checked append-only style,
//! adapted to the position-granularity (not fill/lot) data model §3 uses.

use chrono::{DateTime, Utc};

use aitr_schemas::{
    BrokerProfile, CloseReason, OptionType, Portfolio, Position, PositionId, ProductType, Side,
    Transaction, TransactionId, TransactionKind, WarrantTerms,
};

use crate::fees::{commission_micros, overnight_fee_micros, spread_cost_micros, warrant_theta_decay_micros};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerError {
    InsufficientCash { needed_micros: i64, available_micros: i64 },
    UnknownPosition(PositionId),
    PositionAlreadyClosed(PositionId),
    NonPositiveQuantity,
    NonPositivePrice,
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientCash { needed_micros, available_micros } => write!(
                f,
                "insufficient cash: need {needed_micros} micros, have {available_micros}"
            ),
            Self::UnknownPosition(id) => write!(f, "unknown position {id:?}"),
            Self::PositionAlreadyClosed(id) => write!(f, "position {id:?} already closed"),
            Self::NonPositiveQuantity => write!(f, "quantity must be > 0"),
            Self::NonPositivePrice => write!(f, "price must be > 0"),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Everything needed to open one position (§4.5 `openPosition`).
#[derive(Clone, Debug, PartialEq)]
pub struct OpenIntent {
    pub symbol: String,
    pub product_type: ProductType,
    pub side: Side,
    pub quantity: f64,
    pub price_micros: i64,
    pub leverage: f64,
    pub stop_loss_micros: Option<i64>,
    pub take_profit_micros: Option<i64>,
    pub knockout_level_micros: Option<i64>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub warrant: Option<WarrantTerms>,
}

/// Opens a position against `portfolio`, debiting cash by margin plus
/// commission and spread cost, and appending a [`Transaction`] to `txns`.
/// All-or-nothing: on any error `portfolio` and `txns` are left untouched.
pub fn open_position(
    portfolio: &mut Portfolio,
    intent: OpenIntent,
    now: DateTime<Utc>,
    txns: &mut Vec<Transaction>,
) -> Result<PositionId, LedgerError> {
    if intent.quantity <= 0.0 {
        return Err(LedgerError::NonPositiveQuantity);
    }
    if intent.price_micros <= 0 {
        return Err(LedgerError::NonPositivePrice);
    }

    let notional_micros = (intent.quantity * intent.price_micros as f64) as i64;
    let leverage = if intent.leverage <= 0.0 { 1.0 } else { intent.leverage };
    let margin_micros = (notional_micros as f64 / leverage) as i64;
    let commission = commission_micros(&portfolio.broker_profile, intent.product_type, notional_micros);
    let spread = spread_cost_micros(&portfolio.broker_profile, notional_micros);
    let total_fees_micros = commission + spread;
    let total_debit_micros = margin_micros + total_fees_micros;

    if portfolio.cash_micros < total_debit_micros {
        return Err(LedgerError::InsufficientCash {
            needed_micros: total_debit_micros,
            available_micros: portfolio.cash_micros,
        });
    }

    let position = Position {
        id: PositionId::new(),
        portfolio_id: portfolio.id,
        symbol: intent.symbol,
        product_type: intent.product_type,
        side: intent.side,
        quantity: intent.quantity,
        entry_price_micros: intent.price_micros,
        current_price_micros: intent.price_micros,
        leverage,
        margin_used_micros: margin_micros,
        stop_loss_micros: intent.stop_loss_micros,
        take_profit_micros: intent.take_profit_micros,
        knockout_level_micros: intent.knockout_level_micros,
        expiry_date: intent.expiry_date,
        warrant: intent.warrant,
        cumulative_fees_micros: total_fees_micros,
        opened_at: now,
        closed_at: None,
        close_reason: None,
        realized_pnl_micros: None,
    };
    let position_id = position.id;

    portfolio.cash_micros -= total_debit_micros;
    portfolio.positions.insert(position_id, position);

    txns.push(new_transaction(
        portfolio,
        Some(position_id),
        TransactionKind::OpenPosition,
        -total_debit_micros,
        total_fees_micros,
        now,
    ));

    Ok(position_id)
}

/// Closes an open position at `price_micros`, crediting cash by margin
/// released plus realized P&L minus closing fees (§4.5 `closePosition`).
pub fn close_position(
    portfolio: &mut Portfolio,
    position_id: PositionId,
    price_micros: i64,
    reason: CloseReason,
    now: DateTime<Utc>,
    txns: &mut Vec<Transaction>,
) -> Result<i64, LedgerError> {
    if price_micros <= 0 {
        return Err(LedgerError::NonPositivePrice);
    }
    let position = portfolio
        .positions
        .get(&position_id)
        .ok_or(LedgerError::UnknownPosition(position_id))?;
    if !position.is_open() {
        return Err(LedgerError::PositionAlreadyClosed(position_id));
    }

    let notional_at_close_micros = (position.quantity * price_micros as f64) as i64;
    let gross_pnl_micros = match position.side {
        Side::Long => (price_micros - position.entry_price_micros) as f64 * position.quantity,
        Side::Short => (position.entry_price_micros - price_micros) as f64 * position.quantity,
    } as i64;
    let closing_commission =
        commission_micros(&portfolio.broker_profile, position.product_type, notional_at_close_micros);
    let closing_spread = spread_cost_micros(&portfolio.broker_profile, notional_at_close_micros);
    let closing_fees_micros = closing_commission + closing_spread;
    let realized_pnl_micros = gross_pnl_micros - closing_fees_micros;

    apply_close(portfolio, position_id, price_micros, realized_pnl_micros, closing_fees_micros, reason, now, txns)
}

/// Closes a knocked-out position at intrinsic value 0 (§GLOSSARY
/// "Knockout": "closes at zero value if underlying crosses a level"; §4.5
/// fee table: "knockout auto-close at 0"). The whole margin stake is lost
/// and nothing is credited back — the realized loss is exactly
/// `-margin_used`, not `(quote - entry) * quantity`, since the crossing
/// quote is only the trigger, not the settlement value. `quote_price_micros`
/// is recorded as the position's final `current_price_micros` for display
/// only; it plays no part in the P&L.
fn close_knockout(
    portfolio: &mut Portfolio,
    position_id: PositionId,
    quote_price_micros: i64,
    now: DateTime<Utc>,
    txns: &mut Vec<Transaction>,
) -> Result<i64, LedgerError> {
    let margin_used_micros = portfolio
        .positions
        .get(&position_id)
        .ok_or(LedgerError::UnknownPosition(position_id))?
        .margin_used_micros;
    let realized_pnl_micros = -margin_used_micros;

    apply_close(portfolio, position_id, quote_price_micros, realized_pnl_micros, 0, CloseReason::Knockout, now, txns)
}

/// Shared close mechanics: credits `margin_used + realized_pnl` back to
/// cash, marks the position closed, and appends the closing transaction.
/// Pulled out of `close_position` so `close_knockout` and
/// `close_at_intrinsic` can supply a `realized_pnl_micros` computed their
/// own way while still sharing the bookkeeping.
fn apply_close(
    portfolio: &mut Portfolio,
    position_id: PositionId,
    display_price_micros: i64,
    realized_pnl_micros: i64,
    closing_fees_micros: i64,
    reason: CloseReason,
    now: DateTime<Utc>,
    txns: &mut Vec<Transaction>,
) -> Result<i64, LedgerError> {
    let position = portfolio
        .positions
        .get(&position_id)
        .ok_or(LedgerError::UnknownPosition(position_id))?;
    if !position.is_open() {
        return Err(LedgerError::PositionAlreadyClosed(position_id));
    }
    let margin_released_micros = position.margin_used_micros;
    let credit_micros = margin_released_micros + realized_pnl_micros;

    let position = portfolio.positions.get_mut(&position_id).unwrap();
    position.current_price_micros = display_price_micros;
    position.closed_at = Some(now);
    position.close_reason = Some(reason);
    position.realized_pnl_micros = Some(realized_pnl_micros);
    position.cumulative_fees_micros += closing_fees_micros;

    portfolio.cash_micros += credit_micros;

    txns.push(new_transaction(
        portfolio,
        Some(position_id),
        TransactionKind::ClosePosition,
        credit_micros,
        closing_fees_micros,
        now,
    ));

    Ok(realized_pnl_micros)
}

/// What auto-closed a position during mark-to-market, if anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoCloseTrigger {
    StopLoss,
    TakeProfit,
    Knockout,
    MarginCall,
}

impl From<AutoCloseTrigger> for CloseReason {
    fn from(t: AutoCloseTrigger) -> Self {
        match t {
            AutoCloseTrigger::StopLoss => CloseReason::StopLoss,
            AutoCloseTrigger::TakeProfit => CloseReason::TakeProfit,
            AutoCloseTrigger::Knockout => CloseReason::Knockout,
            AutoCloseTrigger::MarginCall => CloseReason::MarginCall,
        }
    }
}

/// Marks every open position to `quotes` and auto-closes any that crossed
/// a protective level (§4.5 `markToMarket`). Runs deterministically before
/// any new opening within a tick (§4.6 step 3, §5 ordering guarantee).
/// Returns the positions that were auto-closed and why.
pub fn mark_to_market(
    portfolio: &mut Portfolio,
    quotes: &std::collections::BTreeMap<String, i64>,
    now: DateTime<Utc>,
    txns: &mut Vec<Transaction>,
) -> Vec<(PositionId, AutoCloseTrigger, i64)> {
    let open_ids: Vec<PositionId> = portfolio.open_positions().map(|p| p.id).collect();
    let mut closed = Vec::new();

    for id in open_ids {
        let Some(price_micros) = portfolio
            .positions
            .get(&id)
            .and_then(|p| quotes.get(&p.symbol))
            .copied()
        else {
            continue;
        };

        let trigger = {
            let position = portfolio.positions.get_mut(&id).unwrap();
            position.current_price_micros = price_micros;
            detect_trigger(position, price_micros)
        };

        if let Some(trigger) = trigger {
            let result = match trigger {
                AutoCloseTrigger::Knockout => close_knockout(portfolio, id, price_micros, now, txns),
                _ => close_position(portfolio, id, price_micros, trigger.into(), now, txns),
            };
            if let Ok(pnl) = result {
                closed.push((id, trigger, pnl));
            }
        }
    }

    closed
}

fn detect_trigger(position: &Position, price_micros: i64) -> Option<AutoCloseTrigger> {
    if position.product_type == ProductType::Knockout {
        if let Some(level) = position.knockout_level_micros {
            let crossed = match position.side {
                Side::Long => price_micros <= level,
                Side::Short => price_micros >= level,
            };
            if crossed {
                return Some(AutoCloseTrigger::Knockout);
            }
        }
    }

    if let Some(stop) = position.stop_loss_micros {
        let hit = match position.side {
            Side::Long => price_micros <= stop,
            Side::Short => price_micros >= stop,
        };
        if hit {
            return Some(AutoCloseTrigger::StopLoss);
        }
    }

    if let Some(target) = position.take_profit_micros {
        let hit = match position.side {
            Side::Long => price_micros >= target,
            Side::Short => price_micros <= target,
        };
        if hit {
            return Some(AutoCloseTrigger::TakeProfit);
        }
    }

    let unrealized_micros = match position.side {
        Side::Long => (price_micros - position.entry_price_micros) as f64 * position.quantity,
        Side::Short => (position.entry_price_micros - price_micros) as f64 * position.quantity,
    };
    if unrealized_micros < 0.0 {
        let loss_fraction = unrealized_micros.abs() / position.margin_used_micros.max(1) as f64;
        if loss_fraction >= 1.0 {
            return Some(AutoCloseTrigger::MarginCall);
        }
    }

    None
}

/// Once-per-trading-day carry charge for CFD/factor positions, and theta
/// decay for warrants (§4.5 `applyOvernightFees`).
pub fn apply_overnight_fees(portfolio: &mut Portfolio, now: DateTime<Utc>, txns: &mut Vec<Transaction>) {
    let broker = portfolio.broker_profile.clone();
    let ids: Vec<PositionId> = portfolio.open_positions().map(|p| p.id).collect();

    for id in ids {
        let position = portfolio.positions.get_mut(&id).unwrap();
        let fee_micros = match position.product_type {
            ProductType::Cfd | ProductType::Factor => {
                let notional_micros = (position.quantity * position.current_price_micros as f64) as i64;
                overnight_fee_micros(&broker, position.product_type, position.side, notional_micros)
            }
            ProductType::Warrant => {
                let days_to_expiry = position
                    .expiry_date
                    .map(|exp| (exp - now).num_days())
                    .unwrap_or(0);
                let implied_vol = position.warrant.as_ref().map(|w| w.implied_vol).unwrap_or(0.0);
                // time value proxy: current price above intrinsic-free baseline.
                warrant_theta_decay_micros(position.current_price_micros, days_to_expiry, implied_vol)
            }
            ProductType::Stock | ProductType::Knockout => 0,
        };
        if fee_micros <= 0 {
            continue;
        }
        position.cumulative_fees_micros += fee_micros;
        let kind = if position.product_type == ProductType::Warrant {
            TransactionKind::ThetaDecay
        } else {
            TransactionKind::OvernightFee
        };
        portfolio.cash_micros -= fee_micros;
        txns.push(new_transaction(portfolio, Some(id), kind, -fee_micros, fee_micros, now));
    }
}

/// Closes expired warrants/knockouts at intrinsic value (0 if worthless)
/// (§4.5 `settleExpired`).
pub fn settle_expired(
    portfolio: &mut Portfolio,
    now: DateTime<Utc>,
    txns: &mut Vec<Transaction>,
) -> Vec<PositionId> {
    let expired_ids: Vec<PositionId> = portfolio
        .open_positions()
        .filter(|p| matches!(p.product_type, ProductType::Warrant | ProductType::Knockout))
        .filter(|p| p.expiry_date.is_some_and(|exp| exp <= now))
        .map(|p| p.id)
        .collect();

    let mut settled = Vec::new();
    for id in expired_ids {
        let intrinsic_micros = {
            let position = portfolio.positions.get(&id).unwrap();
            intrinsic_value_micros(position)
        };
        if close_at_intrinsic(portfolio, id, intrinsic_micros, now, txns).is_ok() {
            settled.push(id);
        }
    }
    settled
}

/// Closes an expired warrant/knockout at its intrinsic value, which may be
/// exactly 0 for a worthless expiry (§4.5 `settleExpired`, §8 scenario S6).
/// Bypasses `close_position`'s `price_micros > 0` guard — a settlement
/// value is not a market quote, and 0 is the whole point of "worthless".
fn close_at_intrinsic(
    portfolio: &mut Portfolio,
    position_id: PositionId,
    intrinsic_micros: i64,
    now: DateTime<Utc>,
    txns: &mut Vec<Transaction>,
) -> Result<i64, LedgerError> {
    let position = portfolio
        .positions
        .get(&position_id)
        .ok_or(LedgerError::UnknownPosition(position_id))?;
    let notional_micros = (position.quantity * intrinsic_micros as f64) as i64;
    let gross_pnl_micros = match position.side {
        Side::Long => (intrinsic_micros - position.entry_price_micros) as f64 * position.quantity,
        Side::Short => (position.entry_price_micros - intrinsic_micros) as f64 * position.quantity,
    } as i64;
    let closing_commission =
        commission_micros(&portfolio.broker_profile, position.product_type, notional_micros);
    let closing_spread = spread_cost_micros(&portfolio.broker_profile, notional_micros);
    let closing_fees_micros = closing_commission + closing_spread;
    let realized_pnl_micros = gross_pnl_micros - closing_fees_micros;

    apply_close(portfolio, position_id, intrinsic_micros, realized_pnl_micros, closing_fees_micros, CloseReason::Expiry, now, txns)
}

fn intrinsic_value_micros(position: &Position) -> i64 {
    let Some(warrant) = &position.warrant else {
        return position.current_price_micros;
    };
    let diff = match warrant.option_type {
        OptionType::Call => position.current_price_micros - warrant.strike_micros,
        OptionType::Put => warrant.strike_micros - position.current_price_micros,
    };
    diff.max(0)
}

fn new_transaction(
    portfolio: &Portfolio,
    position_id: Option<PositionId>,
    kind: TransactionKind,
    amount_micros: i64,
    fee_micros: i64,
    at: DateTime<Utc>,
) -> Transaction {
    Transaction {
        id: TransactionId::new(),
        portfolio_id: portfolio.id,
        position_id,
        kind,
        amount_micros,
        fee_micros,
        at,
    }
}

pub fn broker_profile_default() -> BrokerProfile {
    BrokerProfile::paper_default()
}
