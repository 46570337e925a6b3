//! aitr-runtime
//!
//! Drives `aitr-execution` (and the other pure logic crates) against real
//! wall-clock time, a `Store`, and a set of running traders (§4.6, §9
//! Design Note: "`aitr-runtime` drives it, never the reverse"). Owns the
//! per-trader cooperative scheduler, the sticky RiskState registry, the
//! event bus `aitr-daemon`'s SSE route relays, and the daily maintenance
//! job (overnight fees, expiry settlement, adaptive learning, daily
//! reports).

mod backfill;
mod bus;
mod counters;
mod daily;
mod engine;
mod errors;
mod maintenance;
mod worker;

pub use bus::Event;
pub use engine::Engine;
pub use errors::{EngineError, EngineResult};
