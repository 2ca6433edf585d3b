//! Genetic-algorithm conformer search over torsional space.
//!
//! The search keeps a fixed-size population of unique, low-energy conformers
//! of one molecule. Each iteration mutates a selected parent by rotating a few
//! dihedral angles, screens the trial geometry, hands it to an external
//! [`engine::evaluator::Evaluator`] for relaxation and energy, and offers the
//! result back to the population.

pub mod analysis;
pub mod core;
pub mod engine;
pub mod interface;
pub mod solvers;
