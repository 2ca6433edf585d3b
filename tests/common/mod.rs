#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use gamss::core::molecule::Molecule;
use gamss::core::spatial;
use gamss::engine::evaluator::{EvalError, EvaluationResult, Evaluator};
use nalgebra::{Point3, Vector3};

pub const WATER: &str = "\
3
water
O    0.0000   0.0000   0.0000
H    0.9600   0.0000   0.0000
H   -0.2400   0.9300   0.0000
";

pub const BUTANE: &str = "\
14
n-butane
C    0.0000   0.0000   0.0000
C    1.5300   0.0000   0.0000
C    2.0400   1.4400   0.0000
C    3.5700   1.4400   0.0000
H   -0.3600  -1.0200   0.0000
H   -0.3600   0.5100   0.8800
H   -0.3600   0.5100  -0.8800
H    1.8900  -0.5100   0.8800
H    1.8900  -0.5100  -0.8800
H    1.6800   1.9500   0.8800
H    1.6800   1.9500  -0.8800
H    3.9300   2.4600   0.0000
H    3.9300   0.9300   0.8800
H    3.9300   0.9300  -0.8800
";

pub fn water() -> Molecule {
    Molecule::from_xyz_str(WATER).unwrap()
}

pub fn butane() -> Molecule {
    Molecule::from_xyz_str(BUTANE).unwrap()
}

/// Pairwise 1/r repulsion: cheap, smooth and geometry dependent.
pub fn repulsion(coords: &[Point3<f64>]) -> f64 {
    let d = spatial::pdist_matrix(coords);
    let n = coords.len();
    let mut e = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            e += 1.0 / d[(i, j)];
        }
    }
    e
}

/// Single-point evaluator on the repulsion energy.
pub struct MockEvaluator;

impl Evaluator for MockEvaluator {
    fn evaluate(&self, molecule: &Molecule) -> Result<EvaluationResult, EvalError> {
        Ok(EvaluationResult::single_point(repulsion(molecule.coordinates())))
    }

    fn name(&self) -> &str {
        "Mock Evaluator"
    }
}

/// Counts calls and delegates to [`MockEvaluator`].
#[derive(Default)]
pub struct CountingEvaluator {
    pub calls: AtomicUsize,
}

impl CountingEvaluator {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Evaluator for CountingEvaluator {
    fn evaluate(&self, molecule: &Molecule) -> Result<EvaluationResult, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        MockEvaluator.evaluate(molecule)
    }

    fn name(&self) -> &str {
        "Counting Evaluator"
    }
}

/// Never produces an energy.
pub struct FailingEvaluator;

impl Evaluator for FailingEvaluator {
    fn evaluate(&self, _molecule: &Molecule) -> Result<EvaluationResult, EvalError> {
        Err(EvalError::NotConverged("stub".into()))
    }

    fn name(&self) -> &str {
        "Failing Evaluator"
    }
}

/// Same energy for every structure.
pub struct FlatEvaluator(pub f64);

impl Evaluator for FlatEvaluator {
    fn evaluate(&self, _molecule: &Molecule) -> Result<EvaluationResult, EvalError> {
        Ok(EvaluationResult::single_point(self.0))
    }

    fn name(&self) -> &str {
        "Flat Evaluator"
    }
}

/// Hands back the trial geometry rigidly moved, like an optimizer that
/// works in its own frame.
pub struct ShiftingEvaluator;

impl Evaluator for ShiftingEvaluator {
    fn evaluate(&self, molecule: &Molecule) -> Result<EvaluationResult, EvalError> {
        let shift = Vector3::new(1.0, -2.0, 3.0);
        Ok(EvaluationResult {
            energy: repulsion(molecule.coordinates()),
            gradient_norm: Some(0.0),
            relaxed: Some(molecule.coordinates().iter().map(|p| p + shift).collect()),
        })
    }

    fn name(&self) -> &str {
        "Shifting Evaluator"
    }
}

/// Returns one atom too few.
pub struct TruncatingEvaluator;

impl Evaluator for TruncatingEvaluator {
    fn evaluate(&self, molecule: &Molecule) -> Result<EvaluationResult, EvalError> {
        let xyz = molecule.coordinates();
        Ok(EvaluationResult {
            energy: 0.0,
            gradient_norm: None,
            relaxed: Some(xyz[..xyz.len() - 1].to_vec()),
        })
    }

    fn name(&self) -> &str {
        "Truncating Evaluator"
    }
}
