//! aitr-risk
//!
//! The ten-stage RiskGate (§4.3): a fixed-order, short-circuit pipeline
//! over a candidate trade, plus the sticky per-trader state it consults
//! (day rollover, peak equity, loss streak). Pure logic only — no IO, no
//! wall clock beyond the `now` callers pass in.

mod engine;
mod types;

pub use engine::{evaluate, RiskGateConfig};
pub use types::{RiskInput, RiskState};
