//! PositionSizer (§4.4): given a trade intent, personality, and a realized
//! volatility estimate, computes quantity and protective stop/take-profit
//! levels. Three pure sizing methods, selected by
//! `personality.trading.sizing_method`.

use aitr_schemas::{ProductType, RiskTolerance, Side};

/// `RiskTolerance` has no explicit fractional-Kelly knob in `Personality`;
/// tolerance maps to the fraction of the full Kelly stake taken, a design
/// decision recorded in DESIGN.md (Conservative quarter-Kelly, Moderate
/// half-Kelly, Aggressive full Kelly).
fn kelly_fraction(tolerance: RiskTolerance) -> f64 {
    match tolerance {
        RiskTolerance::Conservative => 0.25,
        RiskTolerance::Moderate => 0.5,
        RiskTolerance::Aggressive => 1.0,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SizingInput {
    pub side: Side,
    pub product: ProductType,
    pub price_micros: i64,
    pub weighted_confidence: f64,
    pub initial_budget_micros: i64,
    pub max_position_percent: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub risk_tolerance: RiskTolerance,
    /// Annualized or windowed realized volatility, used only by
    /// `VolatilityScaled`. Ignored by the other two methods.
    pub realized_vol: f64,
    /// Target volatility the `VolatilityScaled` method scales toward.
    pub target_vol: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SizingResult {
    pub quantity: f64,
    pub notional_micros: i64,
    pub stop_loss_micros: i64,
    pub take_profit_micros: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizingError {
    /// Rounding/clamping drove quantity to zero (§8 boundary: `size_too_small`).
    SizeTooSmall,
    NonPositivePrice,
}

impl std::fmt::Display for SizingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SizeTooSmall => write!(f, "sized quantity rounded to zero"),
            Self::NonPositivePrice => write!(f, "price must be > 0"),
        }
    }
}

impl std::error::Error for SizingError {}

pub fn size_fixed(input: &SizingInput) -> Result<SizingResult, SizingError> {
    let notional_micros = (input.max_position_percent
        * input.initial_budget_micros as f64
        * input.weighted_confidence) as i64;
    finish(input, notional_micros)
}

pub fn size_kelly(input: &SizingInput, kelly_scale: f64) -> Result<SizingResult, SizingError> {
    let p = input.weighted_confidence;
    let b = input.take_profit_pct / input.stop_loss_pct;
    let f = (kelly_fraction(input.risk_tolerance) * kelly_scale * (p * b - (1.0 - p)) / b)
        .clamp(0.0, input.max_position_percent);
    let notional_micros = (f * input.initial_budget_micros as f64) as i64;
    finish(input, notional_micros)
}

pub fn size_volatility_scaled(input: &SizingInput) -> Result<SizingResult, SizingError> {
    let baseline_micros =
        (input.max_position_percent * input.initial_budget_micros as f64) as i64;
    let scale = if input.realized_vol > 0.0 {
        (input.target_vol / input.realized_vol).min(1.0)
    } else {
        1.0
    };
    let notional_micros = (baseline_micros as f64 * scale) as i64;
    finish(input, notional_micros)
}

fn finish(input: &SizingInput, notional_micros: i64) -> Result<SizingResult, SizingError> {
    if input.price_micros <= 0 {
        return Err(SizingError::NonPositivePrice);
    }
    let raw_quantity = notional_micros as f64 / input.price_micros as f64;
    let quantity = if input.product == ProductType::Stock {
        raw_quantity.floor()
    } else {
        raw_quantity
    };
    if quantity <= 0.0 {
        return Err(SizingError::SizeTooSmall);
    }
    let actual_notional_micros = (quantity * input.price_micros as f64) as i64;

    let stop_loss_micros = match input.side {
        Side::Long => (input.price_micros as f64 * (1.0 - input.stop_loss_pct)) as i64,
        Side::Short => (input.price_micros as f64 * (1.0 + input.stop_loss_pct)) as i64,
    };
    let take_profit_micros = match input.side {
        Side::Long => (input.price_micros as f64 * (1.0 + input.take_profit_pct)) as i64,
        Side::Short => (input.price_micros as f64 * (1.0 - input.take_profit_pct)) as i64,
    };

    Ok(SizingResult {
        quantity,
        notional_micros: actual_notional_micros,
        stop_loss_micros,
        take_profit_micros,
    })
}
