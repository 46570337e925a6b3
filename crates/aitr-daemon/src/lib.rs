//! aitr-daemon
//!
//! The HTTP+SSE front door onto an `aitr-runtime::Engine` (§6 REST surface,
//! §4.8 EventBus wire form). Deliberately thin: every handler in
//! [`routes`] just translates between HTTP and `Engine` calls; all the
//! actual scheduling/fusion/risk/ledger logic lives downstream in the pure
//! and runtime crates this binary wires together.

pub mod api_types;
pub mod routes;
