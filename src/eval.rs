use std::sync::Arc;
use std::thread;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::lex::{Op, normalize};
use crate::parse::split_point;
use crate::pool::{LatencyTable, UnitPool};
use crate::store::{EquationId, EquationStatus, EquationStore};

/// Errors that can end an evaluation.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum EvalError {
    /// A leaf did not parse as a finite number: text the validator never
    /// approved, or a literal beyond the range of an `f64`.
    #[error("invalid number '{literal}'")]
    #[diagnostic(help("run the expression through validation before submitting it"))]
    ParseNumber { literal: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("unknown equation id {id}")]
    UnknownEquation { id: EquationId },
}

/// Tunables for the evaluation loop.
#[derive(Debug, Clone, Copy)]
pub struct EvalConfig {
    /// How long to wait between attempts to claim a compute unit.
    pub retry_interval: Duration,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig { retry_interval: Duration::from_millis(5) }
    }
}

/// The concurrent divide-and-conquer evaluator.
///
/// Every binary operation becomes a fork/join node: both operands
/// evaluate in parallel, then the node claims a compute unit, waits the
/// operator's configured latency, applies the operation, and frees the
/// unit. Nodes of all in-flight equations compete for the same pool, and
/// a node that finds the pool exhausted retries on a fixed interval until
/// a unit frees up.
pub struct Evaluator {
    store: Arc<dyn EquationStore>,
    pool: Arc<UnitPool>,
    latencies: Arc<LatencyTable>,
    config: EvalConfig,
}

impl Evaluator {
    pub fn new(
        store: Arc<dyn EquationStore>,
        pool: Arc<UnitPool>,
        latencies: Arc<LatencyTable>,
    ) -> Self {
        Self::with_config(store, pool, latencies, EvalConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn EquationStore>,
        pool: Arc<UnitPool>,
        latencies: Arc<LatencyTable>,
        config: EvalConfig,
    ) -> Self {
        Evaluator { store, pool, latencies, config }
    }

    /// Evaluates a stored equation end to end: marks it Computing, runs
    /// the recursion, and writes exactly one terminal status carrying the
    /// result or the error that stopped it.
    pub fn evaluate(&self, id: EquationId) -> Result<f64, EvalError> {
        let Some(text) = self.store.text(id) else {
            return Err(EvalError::UnknownEquation { id });
        };
        self.store.set_status(id, EquationStatus::Computing);
        let outcome = self.eval_node(&text, Some(id));
        match &outcome {
            Ok(value) => self.store.set_status(id, EquationStatus::Computed(*value)),
            Err(err) => self.store.set_status(id, EquationStatus::Error(err.to_string())),
        }
        outcome
    }

    /// Evaluates a bare expression that lives in no store. Pool admission
    /// still applies; the units it holds carry no owner.
    pub fn eval_expression(&self, expr: &str) -> Result<f64, EvalError> {
        self.eval_node(expr, None)
    }

    fn eval_node(&self, expr: &str, owner: Option<EquationId>) -> Result<f64, EvalError> {
        let expr = normalize(expr);
        let Some((at, op)) = split_point(&expr) else {
            // The float parser rounds overflow to infinity instead of
            // failing; only a finite value counts as a number here.
            return match expr.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(value),
                _ => Err(EvalError::ParseNumber { literal: expr.into_owned() }),
            };
        };
        let (left, right) = (&expr[..at], &expr[at + 1..]);
        let (lhs, rhs) = rayon::join(
            || self.eval_node(left, owner),
            || self.eval_node(right, owner),
        );
        // Either branch failing fails this node; the join means a still
        // running sibling is always waited out, never leaked.
        let (lhs, rhs) = (lhs?, rhs?);
        self.apply(op, lhs, rhs, owner)
    }

    /// One operator application on one compute unit: claim, charge the
    /// configured latency, combine, release.
    fn apply(
        &self,
        op: Op,
        lhs: f64,
        rhs: f64,
        owner: Option<EquationId>,
    ) -> Result<f64, EvalError> {
        let unit = loop {
            if let Some(unit) = self.pool.try_acquire(owner) {
                break unit;
            }
            thread::sleep(self.config.retry_interval);
        };
        if op == Op::Slash && rhs == 0.0 {
            self.pool.release(unit);
            return Err(EvalError::DivisionByZero);
        }
        thread::sleep(self.latencies.get(op));
        let value = op.apply(lhs, rhs);
        self.pool.release(unit);
        Ok(value)
    }
}
