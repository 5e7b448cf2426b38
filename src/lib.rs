//! Parallel evaluation of arithmetic equations on simulated compute
//! units.
//!
//! An equation travels `lex` → `parse` → `eval`: the text is normalized
//! and validated, then recursively split at the operator applied last;
//! both sides evaluate concurrently, and every operator application
//! claims one unit from a shared [`pool::UnitPool`], waits that
//! operator's configured latency, and frees the unit again. Progress and
//! the final result are written through an injected
//! [`store::EquationStore`].

pub mod eval;
pub mod lex;
pub mod parse;
pub mod pool;
pub mod store;

mod proptests;

pub use eval::{EvalConfig, EvalError, Evaluator};
pub use lex::{Op, is_valid, is_valid_range, normalize, validate};
pub use parse::split_point;
pub use pool::{LatencyTable, UnitId, UnitPool, UnitView};
pub use store::{Equation, EquationId, EquationStatus, EquationStore, MemoryStore};
