//! Axum router and HTTP handlers for `aitr-daemon` (§6 REST surface).
//!
//! `build_router` is the single entry point; `main.rs` attaches middleware
//! after calling it, mirroring `mqk-daemon::routes`'s split so scenario
//! tests can exercise the bare router without a running process.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;
use uuid::Uuid;

use aitr_runtime::{Engine, EngineError, Event};
use aitr_schemas::TraderId;

use crate::api_types::{
    CreateTraderRequest, DecisionsQuery, ErrorResponse, HealthResponse, StreamQuery,
    TraderResponse, UpdatePersonalityRequest,
};

/// Builds the complete application router wired to the given engine handle.
/// Middleware (CORS, tracing) is attached by the caller, not here.
pub fn build_router(engine: Engine) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/traders", post(create_trader).get(list_traders))
        .route(
            "/v1/traders/:id",
            get(get_trader).patch(update_personality).delete(delete_trader),
        )
        .route("/v1/traders/:id/start", post(start_trader))
        .route("/v1/traders/:id/stop", post(stop_trader))
        .route("/v1/traders/:id/pause", post(pause_trader))
        .route("/v1/traders/:id/personality", get(get_personality))
        .route("/v1/traders/:id/decisions", get(list_decisions))
        .route("/v1/traders/:id/reports", get(list_reports))
        .route("/v1/traders/:id/weight-history", get(list_weight_history))
        .route("/v1/traders/:id/learn", post(trigger_learning))
        .route("/v1/stream", get(stream))
        .with_state(engine)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Maps §7's error taxonomy onto HTTP status codes: not-found collaborators
/// become 404, configuration/lifecycle misuse becomes 409/400, everything
/// else (store/ledger/calendar failures) becomes 500 — the daemon never
/// lets an `EngineError` leak past a typed status + message.
fn engine_error_response(err: EngineError) -> Response {
    let status = match &err {
        EngineError::TraderNotFound | EngineError::PortfolioNotFound => StatusCode::NOT_FOUND,
        EngineError::Personality(_) | EngineError::Calendar(_) => StatusCode::BAD_REQUEST,
        EngineError::AlreadyRunning | EngineError::NotRunning => StatusCode::CONFLICT,
        EngineError::Store(_) | EngineError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: err.to_string() })).into_response()
}

fn parse_trader_id(id: &str) -> Result<TraderId, Response> {
    Uuid::parse_str(id)
        .map(TraderId::from_uuid)
        .map_err(|_| (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: format!("bad trader id: {id}") })).into_response())
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse { ok: true, service: "aitr-daemon", version: env!("CARGO_PKG_VERSION") }),
    )
}

// ---------------------------------------------------------------------------
// Trader CRUD + lifecycle
// ---------------------------------------------------------------------------

async fn create_trader(State(engine): State<Engine>, Json(body): Json<CreateTraderRequest>) -> Response {
    match engine.create_trader(&body.name, body.personality).await {
        Ok(trader) => (StatusCode::CREATED, Json(TraderResponse { trader })).into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn list_traders(State(engine): State<Engine>) -> Response {
    match engine.list_traders().await {
        Ok(traders) => Json(traders).into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn get_trader(State(engine): State<Engine>, Path(id): Path<String>) -> Response {
    let trader_id = match parse_trader_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match engine.get_trader(trader_id).await {
        Ok(trader) => Json(TraderResponse { trader }).into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn update_personality(
    State(engine): State<Engine>,
    Path(id): Path<String>,
    Json(body): Json<UpdatePersonalityRequest>,
) -> Response {
    let trader_id = match parse_trader_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match engine.update_personality(trader_id, body.personality).await {
        Ok(trader) => Json(TraderResponse { trader }).into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn delete_trader(State(engine): State<Engine>, Path(id): Path<String>) -> Response {
    let trader_id = match parse_trader_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match engine.delete_trader(trader_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn start_trader(State(engine): State<Engine>, Path(id): Path<String>) -> Response {
    let trader_id = match parse_trader_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match engine.start_trader(trader_id).await {
        Ok(()) => {
            info!(%trader_id, "trader started");
            StatusCode::OK.into_response()
        }
        Err(e) => engine_error_response(e),
    }
}

async fn stop_trader(State(engine): State<Engine>, Path(id): Path<String>) -> Response {
    let trader_id = match parse_trader_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match engine.stop_trader(trader_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn pause_trader(State(engine): State<Engine>, Path(id): Path<String>) -> Response {
    let trader_id = match parse_trader_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match engine.pause_trader(trader_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn get_personality(State(engine): State<Engine>, Path(id): Path<String>) -> Response {
    let trader_id = match parse_trader_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match engine.get_trader(trader_id).await {
        Ok(trader) => Json(trader.personality).into_response(),
        Err(e) => engine_error_response(e),
    }
}

// ---------------------------------------------------------------------------
// Decisions / reports / learning
// ---------------------------------------------------------------------------

async fn list_decisions(
    State(engine): State<Engine>,
    Path(id): Path<String>,
    Query(q): Query<DecisionsQuery>,
) -> Response {
    let trader_id = match parse_trader_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let until = q.until.unwrap_or_else(Utc::now);
    let since = q.since.unwrap_or(until - ChronoDuration::days(30));
    match engine.list_decisions(trader_id, since, until).await {
        Ok(decisions) => Json(decisions).into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn list_reports(State(engine): State<Engine>, Path(id): Path<String>) -> Response {
    let trader_id = match parse_trader_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match engine.list_daily_reports(trader_id).await {
        Ok(reports) => Json(reports).into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn list_weight_history(State(engine): State<Engine>, Path(id): Path<String>) -> Response {
    let trader_id = match parse_trader_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match engine.list_weight_history(trader_id).await {
        Ok(history) => Json(history).into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn trigger_learning(State(engine): State<Engine>, Path(id): Path<String>) -> Response {
    let trader_id = match parse_trader_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match engine.trigger_learning(trader_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => engine_error_response(e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream (SSE, §4.8 / §6 wire form)
// ---------------------------------------------------------------------------

async fn stream(State(engine): State<Engine>, Query(q): Query<StreamQuery>) -> Response {
    let mut headers = HeaderMap::new();
    // §6: no proxy buffering, chunked transfer, 2s retry hint.
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));

    let filter: Option<Vec<TraderId>> = q.trader_ids.as_ref().map(|s| {
        s.split(',')
            .filter_map(|p| Uuid::parse_str(p.trim()).ok())
            .map(TraderId::from_uuid)
            .collect()
    });

    let rx = engine.subscribe();
    let events = broadcast_to_sse(rx, filter);

    (headers, Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(5))))
        .into_response()
}

/// §6: heartbeat frames pad to >=512 bytes, the initial frame to >=2KB, to
/// force an intermediate proxy to flush rather than buffer the stream.
fn padding(min_bytes: usize) -> String {
    ":".to_string() + &"p".repeat(min_bytes)
}

fn event_matches_filter(event: &Event, filter: &Option<Vec<TraderId>>) -> bool {
    let Some(ids) = filter else { return true };
    match event {
        Event::Heartbeat { .. } => true,
        Event::Analyzing { trader_id, .. } => ids.contains(trader_id),
        Event::Decision(d) => ids.contains(&d.trader_id),
        Event::TradeExecuted(d) => ids.contains(&d.trader_id),
        Event::PositionClosed { trader_id, .. } => ids.contains(trader_id),
        Event::TraderStateChanged { trader_id, .. } => ids.contains(trader_id),
        Event::WeightsAdjusted(w) => ids.contains(&w.trader_id),
        Event::DailyReport(r) => ids.contains(&r.trader_id),
        Event::Error { trader_id, .. } => ids.contains(trader_id),
    }
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<Event>,
    filter: Option<Vec<TraderId>>,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    let mut first = true;
    BroadcastStream::new(rx).filter_map(move |msg| {
        let filter = filter.clone();
        let is_first = first;
        first = false;
        async move {
            match msg {
                Ok(event) => {
                    if !event_matches_filter(&event, &filter) {
                        return None;
                    }
                    let event_name = match &event {
                        Event::Heartbeat { .. } => "heartbeat",
                        Event::Analyzing { .. } => "analyzing",
                        Event::Decision(_) => "decision_made",
                        Event::TradeExecuted(_) => "trade_executed",
                        Event::PositionClosed { .. } => "position_closed",
                        Event::TraderStateChanged { .. } => "status_changed",
                        Event::WeightsAdjusted(_) => "weights_adjusted",
                        Event::DailyReport(_) => "daily_report",
                        Event::Error { .. } => "error",
                    };
                    let data = serde_json::to_string(&SseEnvelope::from(&event)).ok()?;
                    let mut sse = SseEvent::default().event(event_name).data(data);
                    let pad = if is_first { 2048 } else if matches!(event, Event::Heartbeat { .. }) { 512 } else { 0 };
                    if pad > 0 {
                        sse = sse.comment(padding(pad));
                    }
                    Some(Ok(sse))
                }
                // Subscriber fell too far behind the broadcast buffer
                // (§4.8 bounded back-pressure window) or the bus closed.
                Err(_) => None,
            }
        }
    })
}

/// Wire shape for an SSE frame's JSON payload (§6): `{traderId, type, data,
/// timestamp}`, flattening the richer internal `Event` enum onto that
/// four-field envelope.
#[derive(serde::Serialize)]
struct SseEnvelope {
    #[serde(rename = "traderId")]
    trader_id: Option<TraderId>,
    #[serde(rename = "type")]
    kind: &'static str,
    data: serde_json::Value,
    timestamp: i64,
}

impl From<&Event> for SseEnvelope {
    fn from(event: &Event) -> Self {
        let now_millis = Utc::now().timestamp_millis();
        match event {
            Event::Heartbeat { ts_millis } => SseEnvelope {
                trader_id: None,
                kind: "heartbeat",
                data: serde_json::Value::Null,
                timestamp: *ts_millis,
            },
            Event::Analyzing { trader_id, symbol } => SseEnvelope {
                trader_id: Some(*trader_id),
                kind: "analyzing",
                data: serde_json::json!({ "symbol": symbol }),
                timestamp: now_millis,
            },
            Event::Decision(d) => SseEnvelope {
                trader_id: Some(d.trader_id),
                kind: "decision_made",
                data: serde_json::to_value(d).unwrap_or(serde_json::Value::Null),
                timestamp: now_millis,
            },
            Event::TradeExecuted(d) => SseEnvelope {
                trader_id: Some(d.trader_id),
                kind: "trade_executed",
                data: serde_json::to_value(d).unwrap_or(serde_json::Value::Null),
                timestamp: now_millis,
            },
            Event::PositionClosed { trader_id, position_id, symbol, reason, realized_pnl_micros } => SseEnvelope {
                trader_id: Some(*trader_id),
                kind: "position_closed",
                data: serde_json::json!({
                    "positionId": position_id,
                    "symbol": symbol,
                    "reason": reason,
                    "realizedPnlMicros": realized_pnl_micros,
                }),
                timestamp: now_millis,
            },
            Event::TraderStateChanged { trader_id, state } => SseEnvelope {
                trader_id: Some(*trader_id),
                kind: "status_changed",
                data: serde_json::to_value(state).unwrap_or(serde_json::Value::Null),
                timestamp: now_millis,
            },
            Event::WeightsAdjusted(w) => SseEnvelope {
                trader_id: Some(w.trader_id),
                kind: "weights_adjusted",
                data: serde_json::to_value(w).unwrap_or(serde_json::Value::Null),
                timestamp: now_millis,
            },
            Event::DailyReport(r) => SseEnvelope {
                trader_id: Some(r.trader_id),
                kind: "daily_report",
                data: serde_json::to_value(r).unwrap_or(serde_json::Value::Null),
                timestamp: now_millis,
            },
            Event::Error { trader_id, message } => SseEnvelope {
                trader_id: Some(*trader_id),
                kind: "error",
                data: serde_json::json!({ "message": message }),
                timestamp: now_millis,
            },
        }
    }
}
