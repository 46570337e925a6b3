use aitr_config::CalendarError;
use aitr_portfolio::LedgerError;
use aitr_schemas::PersonalityError;
use aitr_store::StoreError;

/// Errors the engine's public lifecycle operations (`start_trader`,
/// `pause_trader`, manual learning triggers, ...) can return. Per-symbol
/// pipeline failures never surface here — `aitr-execution` already turns
/// those into `Skip`/rejected `Decision`s (§4.6/§7); this enum only covers
/// failures the engine itself can't route around.
#[derive(Debug)]
pub enum EngineError {
    Store(StoreError),
    Personality(PersonalityError),
    Calendar(CalendarError),
    Ledger(LedgerError),
    TraderNotFound,
    PortfolioNotFound,
    AlreadyRunning,
    NotRunning,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Personality(e) => write!(f, "invalid personality: {e}"),
            Self::Calendar(e) => write!(f, "invalid trading calendar: {e}"),
            Self::Ledger(e) => write!(f, "ledger error: {e}"),
            Self::TraderNotFound => write!(f, "trader not found"),
            Self::PortfolioNotFound => write!(f, "portfolio not found"),
            Self::AlreadyRunning => write!(f, "trader is already running"),
            Self::NotRunning => write!(f, "trader is not running"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<PersonalityError> for EngineError {
    fn from(e: PersonalityError) -> Self {
        Self::Personality(e)
    }
}

impl From<CalendarError> for EngineError {
    fn from(e: CalendarError) -> Self {
        Self::Calendar(e)
    }
}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        Self::Ledger(e)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
