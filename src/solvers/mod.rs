use crate::core::domain::Conformer;

/// Statistics for a single search iteration.
/// Used for telemetry and UI visualization.
#[derive(Debug, Clone, Default)]
pub struct GenStats {
    pub iteration: usize,
    pub best_energy: f64,
    pub avg_energy: f64,
    pub worst_energy: f64,
    pub pop_size: usize,       // Members currently held
    pub blacklist_size: usize, // Evicted + out-of-window structures
    pub evaluations: usize,    // Potential calls so far (seeding included)

    /// Fraction of search iterations whose trial entered the population.
    pub acceptance_rate: f64,
}

/// Events emitted by the search driver to the main thread.
#[derive(Debug, Clone)]
pub enum SolverEvent {
    /// Diagnostic log message.
    Log(String),

    /// Evaluations per second, measured by the worker.
    WorkerHeartbeat(f64),

    /// A completed iteration with full statistics.
    GenerationUpdate(GenStats),

    /// A conformer that beats the current global minimum.
    NewBest(Conformer),

    /// The driver reached a terminal state.
    Finished(ga::SearchState),
}

pub mod ga;
pub mod population;
