use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{TraderId, WeightHistoryId};
use crate::signal::SourceKind;

/// One recorded adjustment from the adaptive learning loop (§4.7).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightHistory {
    pub id: WeightHistoryId,
    pub trader_id: TraderId,
    pub old_weights: BTreeMap<SourceKind, f64>,
    pub new_weights: BTreeMap<SourceKind, f64>,
    /// Rolling accuracy per source over the configured window, as observed
    /// at adjustment time.
    pub accuracy_snapshot: BTreeMap<SourceKind, f64>,
    pub reason: String,
    pub at: DateTime<Utc>,
}
