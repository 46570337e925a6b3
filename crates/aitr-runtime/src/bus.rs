//! The engine-wide event feed, grounded on `mqk-daemon::state`'s
//! `broadcast::Sender<BusMsg>` + periodic heartbeat task, generalized from a
//! single daemon status stream to per-trader decision/state events.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use aitr_schemas::{CloseReason, DailyReport, Decision, PositionId, TraderId, TraderState, WeightHistory};

/// One entry on the SSE feed `aitr-daemon` relays to subscribers (§4.8):
/// `status_changed`, `analyzing`, `decision_made`, `trade_executed`,
/// `position_closed`, `error`, `heartbeat`.
#[derive(Clone, Debug)]
pub enum Event {
    Heartbeat { ts_millis: i64 },
    /// A symbol's pipeline (§4.6 step 3) started this tick, before any
    /// network call resolves — lets a subscriber show "analyzing AAPL"
    /// rather than going quiet for the whole tick.
    Analyzing { trader_id: TraderId, symbol: String },
    /// Recorded for every symbol considered this tick, `hold`/`skip`
    /// included (§4.6 step 4).
    Decision(Decision),
    /// Narrower than `Decision`: only the subset where a ledger mutation
    /// actually ran (`Buy`/`Sell`/`Short`/user `Close`).
    TradeExecuted(Decision),
    /// A position closed, user-initiated or auto (stop-loss, take-profit,
    /// knockout, margin call, expiry) — §8 scenario S5's "one
    /// `position_closed` event".
    PositionClosed {
        trader_id: TraderId,
        position_id: PositionId,
        symbol: String,
        reason: CloseReason,
        realized_pnl_micros: i64,
    },
    TraderStateChanged { trader_id: TraderId, state: TraderState },
    WeightsAdjusted(WeightHistory),
    DailyReport(DailyReport),
    /// §7 "Ledger failure" / "Fatal": surfaced to subscribers, never just
    /// swallowed into a `Decision`'s `execution_error`.
    Error { trader_id: TraderId, message: String },
}

pub fn new_bus(capacity: usize) -> broadcast::Sender<Event> {
    let (tx, _rx) = broadcast::channel(capacity);
    tx
}

/// Mirrors `mqk-daemon::state::spawn_heartbeat`: one background task ticking
/// on a fixed interval for as long as the engine lives.
pub fn spawn_heartbeat(bus: broadcast::Sender<Event>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts_millis = now_millis();
            let _ = bus.send(Event::Heartbeat { ts_millis });
        }
    });
}

fn now_millis() -> i64 {
    let now: DateTime<Utc> = Utc::now();
    now.timestamp_millis()
}
