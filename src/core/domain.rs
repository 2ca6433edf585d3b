use std::cmp::Ordering;
use std::fmt;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::core::error::{ConfigError, MoleculeError};

// --- Chemistry Types ---

/// A chemical element as carried by every atom of a molecule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub symbol: String,
    pub atomic_number: u8,
    pub mass: f64, // amu
}

impl Default for Element {
    fn default() -> Self {
        Self {
            symbol: "X".to_string(),
            atomic_number: 0,
            mass: 0.0,
        }
    }
}

// --- The Core Entity ---

/// One evaluated candidate structure.
///
/// Created once a trial geometry has passed validation and been evaluated.
/// Apart from `visit_count`, which the population manager bumps when the
/// same structure is rediscovered, a conformer never changes after it has
/// been stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conformer {
    pub energy: f64,
    pub atoms: Vec<Element>,
    pub coordinates: Vec<Point3<f64>>, // Å, same row order as `atoms`
    pub visit_count: u32,
}

impl Conformer {
    pub fn new(
        energy: f64,
        atoms: Vec<Element>,
        coordinates: Vec<Point3<f64>>,
    ) -> Result<Self, MoleculeError> {
        if atoms.len() != coordinates.len() {
            return Err(MoleculeError::AtomCountMismatch {
                expected: atoms.len(),
                found: coordinates.len(),
            });
        }
        Ok(Self {
            energy,
            atoms,
            coordinates,
            visit_count: 0,
        })
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    /// Total order by energy; lower energy = more stable = earlier.
    pub fn cmp_energy(&self, other: &Conformer) -> Ordering {
        self.energy.total_cmp(&other.energy)
    }
}

// --- Configuration Types ---

/// How the parent of a trial structure is picked from the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    /// Always mutate the current global minimum.
    Best,
    /// Uniformly random member.
    Random,
    /// Fitness-proportionate (roulette wheel) selection.
    Roulette,
}

/// How two structures are superimposed before their RMSD is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RmsdMode {
    /// Remove translation only; coordinates are compared as stored.
    Centered,
    /// Remove translation and apply the optimal (Kabsch) rotation.
    Kabsch,
}

/// Search configuration, fixed for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    // Population
    pub pop_size: usize,
    pub max_iter: usize,
    pub max_seed_attempts: usize,

    // Mutation
    pub max_mut_tors: usize,
    pub angle_range: (f64, f64), // degrees, [lo, hi)
    pub prob_cross: f64,
    pub selection: SelectionMethod,
    pub energy_var: f64,

    // Geometry constraints (Å)
    pub dist_min: f64,
    pub dist_max: f64,

    // Acceptance window
    pub energy_min: f64,
    pub energy_max: f64,

    // Uniqueness
    pub rmsd_tol_uniq: f64,
    pub rmsd_mode: RmsdMode,
    pub prescreen_blacklist: bool,

    // Convergence (window 0 = run until max_iter)
    pub convergence_window: usize,
    pub energy_tol: f64,

    /// 0 seeds the random engine from system entropy.
    pub seed: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            pop_size: 20,
            max_iter: 200,
            max_seed_attempts: 1000,
            max_mut_tors: 2,
            angle_range: (0.0, 360.0),
            prob_cross: 0.0,
            selection: SelectionMethod::Random,
            energy_var: 1.0e-3,
            dist_min: 0.5,
            dist_max: 2.2,
            energy_min: f64::MIN,
            energy_max: f64::MAX,
            rmsd_tol_uniq: 0.2,
            rmsd_mode: RmsdMode::Centered,
            prescreen_blacklist: true,
            convergence_window: 0,
            energy_tol: 1.0e-3,
            seed: 0,
        }
    }
}

impl SearchParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pop_size == 0 {
            return Err(ConfigError::PopulationSize);
        }
        if self.max_iter == 0 {
            return Err(ConfigError::MaxIterations);
        }
        if self.max_mut_tors < 1 {
            return Err(ConfigError::MaxMutatedTorsions);
        }
        if self.max_seed_attempts == 0 {
            return Err(ConfigError::SeedAttempts);
        }
        if !(self.rmsd_tol_uniq > 0.0) {
            return Err(ConfigError::RmsdTolerance(self.rmsd_tol_uniq));
        }
        if !(self.dist_min > 0.0) {
            return Err(ConfigError::MinDistance(self.dist_min));
        }
        if !(self.dist_max > self.dist_min) {
            return Err(ConfigError::MaxDistance {
                dist_min: self.dist_min,
                dist_max: self.dist_max,
            });
        }
        if self.energy_min.is_nan() || self.energy_max.is_nan() || self.energy_max < self.energy_min {
            return Err(ConfigError::EnergyWindow {
                energy_min: self.energy_min,
                energy_max: self.energy_max,
            });
        }
        let (lo, hi) = self.angle_range;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(ConfigError::AngleRange { lo, hi });
        }
        if !(self.energy_var > 0.0) {
            return Err(ConfigError::EnergyVariance(self.energy_var));
        }
        if !(self.energy_tol >= 0.0) {
            return Err(ConfigError::EnergyTolerance(self.energy_tol));
        }
        if !(0.0..=1.0).contains(&self.prob_cross) {
            return Err(ConfigError::CrossoverProbability(self.prob_cross));
        }
        Ok(())
    }
}

impl fmt::Display for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Population size:                       {}", self.pop_size)?;
        writeln!(f, "Maximum number of iterations:          {}", self.max_iter)?;
        writeln!(f, "Maximum seeding attempts per slot:     {}", self.max_seed_attempts)?;
        writeln!(f, "Maximum number of torsional mutations: {}", self.max_mut_tors)?;
        writeln!(
            f,
            "Torsion increment range (deg):         [{}, {})",
            self.angle_range.0, self.angle_range.1
        )?;
        writeln!(f, "Probability for crossing-over:         {}", self.prob_cross)?;
        writeln!(f, "Selection method:                      {:?}", self.selection)?;
        writeln!(f, "Smallest atom-atom distance allowed:   {}", self.dist_min)?;
        writeln!(f, "Largest bond distance allowed:         {}", self.dist_max)?;
        writeln!(f, "Smallest energy allowed:               {:e}", self.energy_min)?;
        writeln!(f, "Largest energy allowed:                {:e}", self.energy_max)?;
        writeln!(f, "Geometry RMSD for unique conformers:   {}", self.rmsd_tol_uniq)?;
        writeln!(f, "RMSD superposition:                    {:?}", self.rmsd_mode)?;
        writeln!(f, "Convergence window (0 = off):          {}", self.convergence_window)?;
        writeln!(f, "Energy convergence threshold:          {}", self.energy_tol)?;
        write!(f, "Random seed (0 = entropy):             {}", self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        assert_eq!(SearchParams::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_params() {
        let bad = SearchParams { pop_size: 0, ..Default::default() };
        assert_eq!(bad.validate(), Err(ConfigError::PopulationSize));

        let bad = SearchParams { rmsd_tol_uniq: -0.1, ..Default::default() };
        assert_eq!(bad.validate(), Err(ConfigError::RmsdTolerance(-0.1)));

        let bad = SearchParams { max_mut_tors: 0, ..Default::default() };
        assert_eq!(bad.validate(), Err(ConfigError::MaxMutatedTorsions));

        let bad = SearchParams { dist_min: 1.0, dist_max: 1.0, ..Default::default() };
        assert!(matches!(bad.validate(), Err(ConfigError::MaxDistance { .. })));

        let bad = SearchParams { energy_min: 1.0, energy_max: -1.0, ..Default::default() };
        assert!(matches!(bad.validate(), Err(ConfigError::EnergyWindow { .. })));

        let bad = SearchParams { prob_cross: 1.5, ..Default::default() };
        assert_eq!(bad.validate(), Err(ConfigError::CrossoverProbability(1.5)));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let p: SearchParams =
            serde_json::from_str(r#"{ "pop_size": 5, "selection": "roulette", "rmsd_mode": "kabsch" }"#)
                .unwrap();
        assert_eq!(p.pop_size, 5);
        assert_eq!(p.selection, SelectionMethod::Roulette);
        assert_eq!(p.rmsd_mode, RmsdMode::Kabsch);
        assert_eq!(p.max_iter, SearchParams::default().max_iter);
    }

    #[test]
    fn energy_order_is_total() {
        let c = |e| Conformer::new(e, vec![Element::default()], vec![Point3::origin()]).unwrap();
        assert_eq!(c(-1.0).cmp_energy(&c(2.0)), Ordering::Less);
        assert_eq!(c(2.0).cmp_energy(&c(2.0)), Ordering::Equal);
        assert_eq!(c(f64::NAN).cmp_energy(&c(f64::MAX)), Ordering::Greater);
    }

    #[test]
    fn conformer_rejects_mismatched_rows() {
        let atoms = vec![Element::default(); 2];
        let coords = vec![Point3::origin()];
        assert!(Conformer::new(0.0, atoms, coords).is_err());
    }
}
