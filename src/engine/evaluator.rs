use nalgebra::Point3;
use thiserror::Error;

use crate::core::molecule::Molecule;

/// The result of a physical evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// Total energy (kJ/mol for the bundled engines).
    pub energy: f64,
    /// Gradient norm at the returned geometry, when the engine reports one.
    pub gradient_norm: Option<f64>,
    /// Relaxed Cartesian coordinates in input atom order.
    /// `None` means the engine did not move the atoms.
    pub relaxed: Option<Vec<Point3<f64>>>,
}

impl EvaluationResult {
    /// Single-point result: energy only, geometry unchanged.
    pub fn single_point(energy: f64) -> Self {
        Self {
            energy,
            gradient_norm: None,
            relaxed: None,
        }
    }
}

/// Failure of a single evaluation. The driver discards the candidate and
/// keeps searching; none of these end a run.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{engine} exited with error: {message}")]
    Process { engine: String, message: String },

    #[error("{0}: SCF/geometry optimisation did not converge")]
    NotConverged(String),

    #[error("could not parse engine output: {0}")]
    Parse(String),

    #[error("engine returned {found} atoms, expected {expected}")]
    AtomCountMismatch { expected: usize, found: usize },

    #[error("engine returned non-finite energy {0}")]
    NonFiniteEnergy(f64),
}

/// A generic interface for physics engines.
/// Implementations must be Thread-Safe (Sync).
pub trait Evaluator: Send + Sync {
    /// Relaxes (or single-points) a trial geometry and returns its energy.
    fn evaluate(&self, molecule: &Molecule) -> Result<EvaluationResult, EvalError>;

    /// Returns the name of the engine (e.g., "MOPAC").
    fn name(&self) -> &str;
}
