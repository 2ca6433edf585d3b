use thiserror::Error;

/// Rejected search configuration. Raised eagerly when a driver is built.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("bad pop_size: must be at least 1")]
    PopulationSize,

    #[error("bad max_iter: must be at least 1")]
    MaxIterations,

    #[error("bad max_mut_tors: must be at least 1")]
    MaxMutatedTorsions,

    #[error("bad max_seed_attempts: must be at least 1")]
    SeedAttempts,

    #[error("bad rmsd_tol_uniq = {0}: must be > 0")]
    RmsdTolerance(f64),

    #[error("bad dist_min = {0}: must be > 0")]
    MinDistance(f64),

    #[error("bad dist_max = {dist_max}: must exceed dist_min = {dist_min}")]
    MaxDistance { dist_min: f64, dist_max: f64 },

    #[error("bad energy window [{energy_min}, {energy_max}]")]
    EnergyWindow { energy_min: f64, energy_max: f64 },

    #[error("bad angle_range [{lo}, {hi}): need finite lo < hi")]
    AngleRange { lo: f64, hi: f64 },

    #[error("bad energy_var = {0}: must be > 0")]
    EnergyVariance(f64),

    #[error("bad energy_tol = {0}: must be >= 0")]
    EnergyTolerance(f64),

    #[error("bad prob_cross = {0}: must lie in [0, 1]")]
    CrossoverProbability(f64),
}

/// Problems building or updating the molecular model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MoleculeError {
    #[error("molecule has no atoms")]
    Empty,

    #[error("unknown element symbol '{0}'")]
    UnknownElement(String),

    #[error("expected {expected} coordinate rows, got {found}")]
    AtomCountMismatch { expected: usize, found: usize },

    #[error("non-finite coordinate for atom {0}")]
    NonFiniteCoordinate(usize),

    #[error("XYZ parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Fatal search errors. Per-candidate failures never end up here.
#[derive(Debug, Error, Clone)]
pub enum SearchError {
    #[error("invalid search configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("population is empty (seeding produced no conformers)")]
    EmptyPopulation,

    #[error(
        "seeding exhausted: {attempts} attempts failed to fill slot {} of the population",
        accepted + 1
    )]
    SeedingExhausted { accepted: usize, attempts: usize },

    #[error("molecule error: {0}")]
    Molecule(#[from] MoleculeError),
}
