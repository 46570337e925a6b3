use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::signal::SourceKind;

/// The full set of per-trader configuration knobs that parameterize signal
/// fusion, risk, scheduling, and learning (§3, §GLOSSARY).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub capital: CapitalConfig,
    pub risk: RiskConfig,
    pub signals: SignalsConfig,
    pub trading: TradingConfig,
    pub schedule: ScheduleConfig,
    pub watchlist: WatchlistConfig,
    pub sentiment: SentimentConfig,
    pub learning: LearningConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapitalConfig {
    pub initial_budget_micros: i64,
    pub max_position_percent: f64,
    pub reserve_cash_percent: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub tolerance: RiskTolerance,
    pub max_drawdown_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// §4.3 check 5, default 5%.
    pub daily_loss_pct: f64,
    /// §4.3 check 10, default 80%.
    pub total_exposure_pct: f64,
    /// §4.3 check 4, default 3 consecutive losses.
    pub loss_cooldown_trigger: u32,
    /// §4.3 check 4, default 30 minutes.
    pub cooldown_minutes: i64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTolerance {
    Conservative,
    Moderate,
    Aggressive,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalsConfig {
    /// Must sum to 1 across the full configured source set (§4.2 precondition).
    pub weights: BTreeMap<SourceKind, f64>,
    pub min_agreement: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    pub min_confidence: f64,
    pub max_open_positions: u32,
    pub diversification: bool,
    pub sizing_method: SizingMethod,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizingMethod {
    Fixed,
    Kelly,
    VolatilityScaled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub check_interval_minutes: i64,
    pub trading_hours_only: bool,
    /// IANA timezone name, e.g. "America/New_York".
    pub timezone: String,
    /// 0=Sunday .. 6=Saturday, per `chrono::Weekday::num_days_from_sunday`.
    pub trading_days: Vec<u8>,
    /// "HH:MM" local time.
    pub trading_start: String,
    /// "HH:MM" local time.
    pub trading_end: String,
    pub avoid_open_min: i64,
    pub avoid_close_min: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WatchlistConfig {
    pub symbols: Vec<String>,
    pub use_full_watchlist: bool,
    /// Per-symbol product type, as a loose string (`"stock"`, `"cfd"`,
    /// `"knockout"`, `"factor"`, `"warrant"`). Symbols absent from this map
    /// default to `stock`. Validated by [`Personality::validate`] against
    /// [`crate::ProductType::from_str_loose`].
    #[serde(default)]
    pub product_types: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SentimentConfig {
    pub enabled: bool,
    pub min_score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    pub enabled: bool,
    pub update_weights: bool,
    pub min_trades_before_adjust: u32,
    pub accuracy_window_days: i64,
    pub max_weight_change: f64,
    /// Open question resolution (§9): configurable small-loss-is-correct
    /// threshold, in micros (negative = a loss). Default -100_000_000 ($100),
    /// matching the original hard-coded constant.
    pub correct_if_loss_above_micros: i64,
}

impl Personality {
    /// Validates the static invariants §3/§4.2 require before a trader may
    /// start: weights sum to 1, time strings parse, watchlist non-empty
    /// unless `use_full_watchlist`.
    pub fn validate(&self) -> Result<(), PersonalityError> {
        let sum: f64 = self.signals.weights.values().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(PersonalityError::WeightsDoNotSumToOne(sum));
        }
        for (k, v) in &self.signals.weights {
            if !(0.0..=1.0).contains(v) {
                return Err(PersonalityError::WeightOutOfRange(*k, *v));
            }
        }
        parse_hhmm(&self.schedule.trading_start)
            .ok_or_else(|| PersonalityError::BadTimeFormat(self.schedule.trading_start.clone()))?;
        parse_hhmm(&self.schedule.trading_end)
            .ok_or_else(|| PersonalityError::BadTimeFormat(self.schedule.trading_end.clone()))?;
        if self.schedule.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(PersonalityError::UnknownTimezone(self.schedule.timezone.clone()));
        }
        if !self.watchlist.use_full_watchlist && self.watchlist.symbols.is_empty() {
            return Err(PersonalityError::EmptyWatchlist);
        }
        for product in self.watchlist.product_types.values() {
            if crate::ProductType::from_str_loose(product).is_none() {
                return Err(PersonalityError::UnknownProduct(product.clone()));
            }
        }
        Ok(())
    }

    /// Resolves the product type configured for `symbol`, defaulting to
    /// `Stock` when the watchlist doesn't name one (§4.1/§4.5: most paper
    /// traders only ever hold plain equities).
    pub fn product_for_symbol(&self, symbol: &str) -> crate::ProductType {
        self.watchlist
            .product_types
            .get(symbol)
            .and_then(|s| crate::ProductType::from_str_loose(s))
            .unwrap_or(crate::ProductType::Stock)
    }
}

/// Parses "HH:MM" into (hour, minute). Returns `None` on any malformed input.
pub fn parse_hhmm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some((h, m))
}

#[derive(Clone, Debug, PartialEq)]
pub enum PersonalityError {
    WeightsDoNotSumToOne(f64),
    WeightOutOfRange(SourceKind, f64),
    BadTimeFormat(String),
    UnknownTimezone(String),
    EmptyWatchlist,
    UnknownProduct(String),
}

impl std::fmt::Display for PersonalityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WeightsDoNotSumToOne(sum) => {
                write!(f, "personality.signals.weights must sum to 1, got {sum}")
            }
            Self::WeightOutOfRange(k, v) => write!(f, "weight for {k} out of [0,1]: {v}"),
            Self::BadTimeFormat(s) => write!(f, "bad HH:MM time: {s}"),
            Self::UnknownTimezone(s) => write!(f, "unknown IANA timezone: {s}"),
            Self::EmptyWatchlist => write!(f, "watchlist is empty and use_full_watchlist is false"),
            Self::UnknownProduct(s) => write!(f, "unknown product type: {s}"),
        }
    }
}

impl std::error::Error for PersonalityError {}
