use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use aitr_schemas::{PortfolioSnapshot, SourceKind, Verdict};
use aitr_signals::{PriceWindow, SignalSource};

/// Deterministic, scripted [`SignalSource`] stand-in (§6: sources are
/// out-of-scope external collaborators). Each `evaluate` call consumes one
/// entry from the script, sticking on the last entry once exhausted. A
/// scripted `None` models a source returning "unavailable" for one tick
/// without flipping [`SignalSource::available`] for the whole run.
pub struct FakeSignalSource {
    kind: SourceKind,
    script: Mutex<VecDeque<Option<Verdict>>>,
    available: bool,
}

impl FakeSignalSource {
    pub fn new(kind: SourceKind, script: Vec<Option<Verdict>>) -> Self {
        Self { kind, script: Mutex::new(script.into()), available: true }
    }

    /// A source whose `available()` probe fails outright (distinct from a
    /// source that's reachable but returns `None` for a tick).
    pub fn unavailable(kind: SourceKind) -> Self {
        Self { kind, script: Mutex::new(VecDeque::new()), available: false }
    }
}

#[async_trait]
impl SignalSource for FakeSignalSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn evaluate(&self, _window: &PriceWindow, _portfolio: &PortfolioSnapshot) -> Option<Verdict> {
        let mut script = self.script.lock().await;
        if script.len() > 1 {
            script.pop_front().flatten()
        } else {
            script.front().cloned().flatten()
        }
    }

    fn available(&self) -> bool {
        self.available
    }
}
