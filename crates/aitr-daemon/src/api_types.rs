//! Request/response DTOs for the `aitr-daemon` REST surface (§6). Kept
//! separate from `aitr_schemas` types where the wire shape differs from the
//! in-memory one (e.g. trader creation only needs a name + personality, not
//! the full `Trader` record), mirroring `mqk-daemon::api_types`'s split.

use serde::{Deserialize, Serialize};

use aitr_schemas::{Personality, Trader};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct CreateTraderRequest {
    pub name: String,
    pub personality: Personality,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePersonalityRequest {
    pub personality: Personality,
}

#[derive(Debug, Serialize)]
pub struct TraderResponse {
    #[serde(flatten)]
    pub trader: Trader,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Query params for `GET /v1/traders/:id/decisions` (§6 range-read).
/// Both ends default to the trailer of a trader's configured learning
/// accuracy window ending now, so a bare request returns something useful.
#[derive(Debug, Deserialize)]
pub struct DecisionsQuery {
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub until: Option<chrono::DateTime<chrono::Utc>>,
}

/// Query params for `GET /v1/stream` (§4.8 per-subscriber filter).
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Comma-separated trader ids; absent means "no filter, all traders".
    #[serde(rename = "traderIds")]
    pub trader_ids: Option<String>,
}
