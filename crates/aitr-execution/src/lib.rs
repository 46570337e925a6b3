//! aitr-execution
//!
//! The single-symbol tick pipeline (§4.6 step 3): PriceFeed → SignalSource
//! fan-out → SignalAggregator → RiskGate → PositionSizer → PortfolioLedger,
//! assembled into one persisted [`aitr_schemas::Decision`] per symbol per
//! tick. This crate is the one place in the workspace allowed to depend on
//! every pure logic crate below it (§9 Design Note: acyclic dependency
//! graph, SignalSource/PortfolioLedger as leaves); `aitr-runtime` drives it,
//! never the reverse.

mod scheduler;
mod tick;

pub use scheduler::{run_trader_tick, TickOutcome};
pub use tick::{evaluate_symbol, SymbolTickParams};
