use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OrderId, PortfolioId, PositionId, TraderId, TransactionId};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    Stock,
    Cfd,
    Knockout,
    Factor,
    Warrant,
}

impl ProductType {
    /// Stocks cannot be shorted in this model; leveraged products can.
    pub fn supports_short(self) -> bool {
        !matches!(self, ProductType::Stock)
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stock" => Some(ProductType::Stock),
            "cfd" => Some(ProductType::Cfd),
            "knockout" => Some(ProductType::Knockout),
            "factor" => Some(ProductType::Factor),
            "warrant" => Some(ProductType::Warrant),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    User,
    StopLoss,
    TakeProfit,
    Knockout,
    MarginCall,
    Expiry,
    Reset,
}

/// Warrant-specific greeks/terms, present only for `ProductType::Warrant`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WarrantTerms {
    pub strike_micros: i64,
    pub option_type: OptionType,
    pub ratio: f64,
    pub implied_vol: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub portfolio_id: PortfolioId,
    pub symbol: String,
    pub product_type: ProductType,
    pub side: Side,
    pub quantity: f64,
    pub entry_price_micros: i64,
    pub current_price_micros: i64,
    pub leverage: f64,
    pub margin_used_micros: i64,
    pub stop_loss_micros: Option<i64>,
    pub take_profit_micros: Option<i64>,
    pub knockout_level_micros: Option<i64>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub warrant: Option<WarrantTerms>,
    pub cumulative_fees_micros: i64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
    pub realized_pnl_micros: Option<i64>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// Signed notional at the current mark, in micros. `quantity` is a
    /// plain unit count (shares, contracts); `current_price_micros` is
    /// already dollars·1e6, so the product is notional·1e6 directly.
    pub fn notional_micros(&self) -> i64 {
        let qty = self.quantity as i128;
        let px = self.current_price_micros as i128;
        let signed = match self.side {
            Side::Long => qty,
            Side::Short => -qty,
        };
        (signed * px) as i64
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
    Short,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub portfolio_id: PortfolioId,
    pub symbol: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: f64,
    pub limit_price_micros: Option<i64>,
    pub status: OrderStatus,
    pub reserved_cash_micros: i64,
    pub created_at: DateTime<Utc>,
}

/// Reason tag attached to every cash/ledger movement, for `DailyReport`
/// aggregation (SPEC_FULL §4.5 supplement).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TransactionKind {
    OpenPosition,
    ClosePosition,
    OvernightFee,
    ThetaDecay,
    Commission,
    Spread,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub portfolio_id: PortfolioId,
    pub position_id: Option<PositionId>,
    pub kind: TransactionKind,
    pub amount_micros: i64,
    pub fee_micros: i64,
    pub at: DateTime<Utc>,
}

/// Per-trader broker profile: commission formula, spread, overnight rates,
/// leverage caps (§GLOSSARY "Broker profile").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrokerProfile {
    pub id: String,
    pub flat_fee_micros: i64,
    pub percent_commission: f64,
    pub min_commission_micros: i64,
    pub max_commission_micros: i64,
    pub spread_pct: f64,
    pub cfd_overnight_long_rate: f64,
    pub cfd_overnight_short_rate: f64,
    pub margin_liquidation_level: f64,
    pub max_leverage: f64,
}

impl BrokerProfile {
    /// A broker with zero fees/spread, used by default for paper trading.
    pub fn paper_default() -> Self {
        Self {
            id: "paper-default".to_string(),
            flat_fee_micros: 0,
            percent_commission: 0.0,
            min_commission_micros: 0,
            max_commission_micros: i64::MAX,
            spread_pct: 0.0,
            cfd_overnight_long_rate: 0.0002,
            cfd_overnight_short_rate: 0.0001,
            margin_liquidation_level: 0.8,
            max_leverage: 20.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: PortfolioId,
    pub trader_id: TraderId,
    pub broker_profile: BrokerProfile,
    pub cash_micros: i64,
    pub initial_capital_micros: i64,
    pub positions: BTreeMap<PositionId, Position>,
    pub open_orders: BTreeMap<OrderId, Order>,
}

impl Portfolio {
    pub fn new(trader_id: TraderId, initial_capital_micros: i64, broker_profile: BrokerProfile) -> Self {
        Self {
            id: PortfolioId::new(),
            trader_id,
            broker_profile,
            cash_micros: initial_capital_micros,
            initial_capital_micros,
            positions: BTreeMap::new(),
            open_orders: BTreeMap::new(),
        }
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_open())
    }

    pub fn position_for_symbol(&self, symbol: &str) -> Option<&Position> {
        self.open_positions().find(|p| p.symbol == symbol)
    }

    pub fn margin_used_total_micros(&self) -> i64 {
        self.open_positions().map(|p| p.margin_used_micros).sum()
    }
}
