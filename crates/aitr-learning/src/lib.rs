//! aitr-learning
//!
//! The off-hours adaptive weight loop (§4.7): per-source accuracy over a
//! trailing window, a bounded step toward the accuracy-implied target
//! weight, and the outcome-correctness policy that decides what "accuracy"
//! even means for a given decision. Grounded on `mqk-promotion::evaluator`'s
//! shape: small pure functions over historical records returning an
//! explicit report/decision value, generalized from backtest-promotion
//! metrics to per-source signal accuracy.

mod evaluator;
mod outcome;

pub use evaluator::{run_learning_step, LearningOutcome};
pub use outcome::compute_outcome;
