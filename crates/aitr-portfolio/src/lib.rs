//! aitr-portfolio
//!
//! The PortfolioLedger (§4.5): the single transactional mutator of cash,
//! positions, orders, and transactions for one portfolio, plus the
//! PositionSizer (§4.4) and the product-aware fee model (§4.5) it depends
//! on. Pure logic only — callers pass in `now`, quotes, and broker
//! profiles; nothing here reaches out for wall clock or IO.

pub mod fees;
pub mod ledger;
pub mod metrics;
pub mod sizer;

pub use ledger::{
    apply_overnight_fees, broker_profile_default, close_position, mark_to_market, open_position,
    settle_expired, AutoCloseTrigger, LedgerError, OpenIntent,
};
pub use metrics::{equity_micros, symbol_exposure_micros, total_exposure_micros, unrealized_pnl_micros};
pub use sizer::{size_fixed, size_kelly, size_volatility_scaled, SizingError, SizingInput, SizingResult};
