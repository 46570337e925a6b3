//! aitr-testkit
//!
//! Deterministic test doubles for the two out-of-scope external
//! collaborators (§6): `FakePriceFeed` and `FakeSignalSource`. Grounded on
//! `mqk-testkit::paper_broker`'s pattern of a scriptable, counter-driven
//! stand-in with no randomness and no network IO.

mod price_feed;
mod signal_source;

pub use price_feed::FakePriceFeed;
pub use signal_source::FakeSignalSource;
