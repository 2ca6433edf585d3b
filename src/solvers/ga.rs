use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use log::{debug, info, warn};
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;

use crate::core::domain::{Conformer, SearchParams, SelectionMethod};
use crate::core::error::SearchError;
use crate::core::molecule::Molecule;
use crate::core::spatial;
use crate::engine::evaluator::{EvalError, Evaluator};
use crate::engine::operators::{crossover, Mutator};
use crate::solvers::population::{Insertion, Population};
use crate::solvers::{GenStats, SolverEvent};

/// Lifecycle of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchState {
    Uninitialized,
    Seeding,
    Searching,
    Converged,
    Exhausted,
    Cancelled,
    /// Seeding could not fill the population; the run cannot continue.
    Failed,
}

impl SearchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::Exhausted | Self::Cancelled | Self::Failed)
    }
}

/// Fate of one trial geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrialOutcome {
    Accepted,
    Displaced,
    OutsideWindow,
    DuplicateOfMember,
    DuplicateOfBlacklisted,
    /// Matched the blacklist before evaluation.
    Blacklisted,
    InvalidGeometry,
    EvaluationFailure,
}

impl From<Insertion> for TrialOutcome {
    fn from(ins: Insertion) -> Self {
        match ins {
            Insertion::Accepted { .. } => Self::Accepted,
            Insertion::Displaced => Self::Displaced,
            Insertion::OutsideWindow => Self::OutsideWindow,
            Insertion::DuplicateOfMember(_) => Self::DuplicateOfMember,
            Insertion::DuplicateOfBlacklisted(_) => Self::DuplicateOfBlacklisted,
        }
    }
}

/// One line of the search trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialRecord {
    pub phase: SearchState,
    /// 0 during seeding.
    pub iteration: usize,
    pub outcome: TrialOutcome,
    pub energy: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchCounters {
    pub trials: usize,
    pub evaluations: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub invalid_geometries: usize,
    pub evaluation_failures: usize,
    pub blacklist_hits: usize,
    /// Accepted trials of the search phase only.
    pub search_accepted: usize,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub state: SearchState,
    pub iterations: usize,
    pub global_minimum: Conformer,
    pub population: Vec<Conformer>,
    pub blacklist_size: usize,
    pub counters: SearchCounters,
    pub trace: Vec<TrialRecord>,
}

/// Genetic Algorithm Molecular Structure Search.
///
/// Owns the population, the blacklist and the random engine. All random
/// draws of an iteration happen in a fixed order: parent selection, the
/// crossover gate (and second parent plus cut point when crossing), the
/// number of torsions, the torsion sample, then one increment per torsion.
pub struct Gamss {
    evaluator: Arc<dyn Evaluator>,
    molecule: Molecule,
    params: SearchParams,
    mutator: Mutator,
    rng: ChaCha20Rng,
    population: Population,
    state: SearchState,
    iteration: usize,
    counters: SearchCounters,
    best_history: Vec<f64>,
    trace: Vec<TrialRecord>,
    failure: Option<SearchError>,
    events: Option<Sender<SolverEvent>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Gamss {
    pub fn new(
        molecule: Molecule,
        evaluator: Arc<dyn Evaluator>,
        params: SearchParams,
    ) -> Result<Self, SearchError> {
        params.validate()?;

        let rng = if params.seed == 0 {
            ChaCha20Rng::from_entropy()
        } else {
            ChaCha20Rng::seed_from_u64(params.seed)
        };
        let mutator = Mutator::new()
            .max_torsions(params.max_mut_tors)
            .angle_range(params.angle_range.0, params.angle_range.1);

        Ok(Self {
            evaluator,
            molecule,
            population: Population::new(&params),
            params,
            mutator,
            rng,
            state: SearchState::Uninitialized,
            iteration: 0,
            counters: SearchCounters::default(),
            best_history: Vec::new(),
            trace: Vec::new(),
            failure: None,
            events: None,
            cancel: None,
        })
    }

    /// Streams progress to a dashboard or log sink.
    pub fn with_events(mut self, tx: Sender<SolverEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Checked between trials; setting it ends the run as `Cancelled`.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn counters(&self) -> &SearchCounters {
        &self.counters
    }

    pub fn trace(&self) -> &[TrialRecord] {
        &self.trace
    }

    pub fn global_minimum(&self) -> Result<&Conformer, SearchError> {
        self.population.global_minimum()
    }

    /// Fills the population with `pop_size` mutated, valid, evaluated and
    /// mutually distinct conformers of the input molecule.
    ///
    /// A seeding failure is final: every later call to `seed_population`,
    /// `step` or `solve` returns the same error.
    pub fn seed_population(&mut self) -> Result<(), SearchError> {
        match self.state {
            SearchState::Uninitialized => {}
            SearchState::Failed => {
                return Err(self.failure.clone().unwrap_or(SearchError::EmptyPopulation));
            }
            _ => return Ok(()),
        }
        self.state = SearchState::Seeding;
        self.note(format!(
            "Seeding {} conformers of '{}' ({} atoms, {} torsions) with {}",
            self.params.pop_size,
            self.molecule.title(),
            self.molecule.num_atoms(),
            self.molecule.rotatable_torsions().len(),
            self.evaluator.name()
        ));

        while !self.population.is_full() {
            let mut attempts = 0;
            loop {
                if self.is_cancelled() {
                    self.state = SearchState::Cancelled;
                    self.note("Search cancelled during seeding".to_string());
                    return Ok(());
                }
                if attempts >= self.params.max_seed_attempts {
                    let accepted = self.population.len();
                    warn!("seeding exhausted after {} attempts at slot {}", attempts, accepted + 1);
                    self.emit(SolverEvent::Log(format!(
                        "CRITICAL: seeding exhausted after {} attempts ({} conformers)",
                        attempts, accepted
                    )));
                    let err = SearchError::SeedingExhausted { accepted, attempts };
                    self.state = SearchState::Failed;
                    self.failure = Some(err.clone());
                    return Err(err);
                }
                attempts += 1;

                let trial = self.mutator.apply(&self.molecule, &mut self.rng);
                if self.run_trial(trial, SearchState::Seeding) == TrialOutcome::Accepted {
                    break;
                }
            }
        }

        let best = self.population.global_minimum()?.energy;
        self.best_history.push(best);
        self.state = SearchState::Searching;
        self.note(format!("Seeding complete. Lowest energy {:.6}", best));
        Ok(())
    }

    /// Runs one search iteration (seeding first if needed) and returns the
    /// state afterwards.
    pub fn step(&mut self) -> Result<SearchState, SearchError> {
        if matches!(self.state, SearchState::Uninitialized | SearchState::Failed) {
            self.seed_population()?;
        }
        if self.state != SearchState::Searching {
            return Ok(self.state);
        }
        if self.is_cancelled() {
            self.state = SearchState::Cancelled;
            self.note(format!("Search cancelled at iteration {}", self.iteration));
            return Ok(self.state);
        }

        let started = Instant::now();
        self.iteration += 1;

        let parent = self.breed()?;
        let trial = self.mutator.apply(&parent, &mut self.rng);
        let evaluations_before = self.counters.evaluations;
        let outcome = self.run_trial(trial, SearchState::Searching);
        debug!("iteration {}: {:?}", self.iteration, outcome);

        let best = self.population.global_minimum()?.energy;
        self.best_history.push(best);
        self.emit(SolverEvent::GenerationUpdate(self.stats()));

        let elapsed = started.elapsed().as_secs_f64();
        if self.counters.evaluations > evaluations_before && elapsed > 0.0 {
            self.emit(SolverEvent::WorkerHeartbeat(1.0 / elapsed));
        }

        if self.has_converged() {
            self.state = SearchState::Converged;
            self.note(format!(
                "Converged at iteration {}: no improvement above {} in {} iterations",
                self.iteration, self.params.energy_tol, self.params.convergence_window
            ));
        } else if self.iteration >= self.params.max_iter {
            self.state = SearchState::Exhausted;
            self.note(format!("Reached max_iter = {}", self.params.max_iter));
        }
        Ok(self.state)
    }

    /// Seeds, searches until a terminal state and reports.
    pub fn solve(&mut self) -> Result<SearchReport, SearchError> {
        let result = self.run_to_completion();
        self.emit(SolverEvent::Finished(self.state));
        result
    }

    fn run_to_completion(&mut self) -> Result<SearchReport, SearchError> {
        self.seed_population()?;
        while !self.state.is_terminal() {
            self.step()?;
        }

        let global_minimum = self.population.global_minimum()?.clone();
        info!(
            "GAMSS finished ({:?}) after {} iterations, {} evaluations. Global minimum {:.6}",
            self.state, self.iteration, self.counters.evaluations, global_minimum.energy
        );

        Ok(SearchReport {
            state: self.state,
            iterations: self.iteration,
            global_minimum,
            population: self.population.members().to_vec(),
            blacklist_size: self.population.blacklist().len(),
            counters: self.counters.clone(),
            trace: self.trace.clone(),
        })
    }

    pub fn stats(&self) -> GenStats {
        let members = self.population.members();
        GenStats {
            iteration: self.iteration,
            best_energy: members.first().map_or(0.0, |c| c.energy),
            avg_energy: self.population.mean_energy().unwrap_or(0.0),
            worst_energy: members.last().map_or(0.0, |c| c.energy),
            pop_size: members.len(),
            blacklist_size: self.population.blacklist().len(),
            evaluations: self.counters.evaluations,
            acceptance_rate: self.search_acceptance_rate(),
        }
    }

    // --- Helpers ---

    // Screens, evaluates and offers one trial geometry.
    fn run_trial(&mut self, trial: Molecule, phase: SearchState) -> TrialOutcome {
        self.counters.trials += 1;
        let (outcome, energy) = self.judge(&trial);

        match outcome {
            TrialOutcome::Accepted => {
                self.counters.accepted += 1;
                if phase == SearchState::Searching {
                    self.counters.search_accepted += 1;
                }
            }
            TrialOutcome::DuplicateOfMember | TrialOutcome::DuplicateOfBlacklisted => {
                self.counters.duplicates += 1
            }
            TrialOutcome::InvalidGeometry => self.counters.invalid_geometries += 1,
            TrialOutcome::EvaluationFailure => self.counters.evaluation_failures += 1,
            TrialOutcome::Blacklisted => self.counters.blacklist_hits += 1,
            TrialOutcome::Displaced | TrialOutcome::OutsideWindow => {}
        }

        self.trace.push(TrialRecord {
            phase,
            iteration: self.iteration,
            outcome,
            energy,
        });
        outcome
    }

    fn judge(&mut self, trial: &Molecule) -> (TrialOutcome, Option<f64>) {
        let p = &self.params;
        if !spatial::geom_sensible(trial.coordinates(), p.dist_min, p.dist_max) {
            return (TrialOutcome::InvalidGeometry, None);
        }
        if p.prescreen_blacklist && self.population.is_blacklisted(trial.coordinates()).is_some() {
            return (TrialOutcome::Blacklisted, None);
        }

        self.counters.evaluations += 1;
        let conformer = match self.evaluate(trial) {
            Ok(c) => c,
            Err(e) => {
                warn!("{} evaluation failed: {}", self.evaluator.name(), e);
                self.emit(SolverEvent::Log(format!("Evaluation failed: {}", e)));
                return (TrialOutcome::EvaluationFailure, None);
            }
        };

        let energy = conformer.energy;
        let previous_best = self.population.global_minimum().map(|c| c.energy).ok();
        let insertion = self.population.try_insert(conformer);

        if let Insertion::Accepted { rank: 0, .. } = insertion {
            if let Ok(best) = self.population.global_minimum() {
                let best = best.clone();
                info!("New global minimum {:.6} (was {:?})", best.energy, previous_best);
                self.emit(SolverEvent::NewBest(best));
            }
        }
        (insertion.into(), Some(energy))
    }

    fn evaluate(&self, trial: &Molecule) -> Result<Conformer, EvalError> {
        let result = self.evaluator.evaluate(trial)?;
        if !result.energy.is_finite() {
            return Err(EvalError::NonFiniteEnergy(result.energy));
        }

        let coordinates = match result.relaxed {
            Some(relaxed) => {
                let mut relaxed_mol = trial.clone();
                relaxed_mol.set_coordinates(&relaxed).map_err(|_| EvalError::AtomCountMismatch {
                    expected: trial.num_atoms(),
                    found: relaxed.len(),
                })?;
                relaxed_mol.coordinates().to_vec()
            }
            None => trial.coordinates().to_vec(),
        };

        Conformer::new(result.energy, trial.atoms().to_vec(), coordinates).map_err(|_| {
            EvalError::AtomCountMismatch {
                expected: trial.num_atoms(),
                found: trial.coordinates().len(),
            }
        })
    }

    // Parent selection plus optional crossover.
    fn breed(&mut self) -> Result<Molecule, SearchError> {
        let idx = self.select_parent()?;
        let mut parent = self.as_molecule(idx)?;

        if self.params.prob_cross > 0.0 && self.rng.gen::<f64>() < self.params.prob_cross {
            let other = self.rng.gen_range(0..self.population.len());
            let mate = self.as_molecule(other)?;
            if let Some(child) = crossover(&parent, &mate, &mut self.rng) {
                parent = child;
            }
        }
        Ok(parent)
    }

    fn select_parent(&mut self) -> Result<usize, SearchError> {
        let n = self.population.len();
        if n == 0 {
            return Err(SearchError::EmptyPopulation);
        }

        let idx = match self.params.selection {
            SelectionMethod::Best => 0,
            SelectionMethod::Random => self.rng.gen_range(0..n),
            SelectionMethod::Roulette => {
                let fitness = self.population.fitness(self.params.energy_var);
                let total: f64 = fitness.iter().sum();
                let target = self.rng.gen::<f64>() * total;
                let mut acc = 0.0;
                fitness
                    .iter()
                    .position(|f| {
                        acc += f;
                        acc > target
                    })
                    .unwrap_or(0)
            }
        };
        Ok(idx)
    }

    fn as_molecule(&self, idx: usize) -> Result<Molecule, SearchError> {
        let member = self
            .population
            .members()
            .get(idx)
            .ok_or(SearchError::EmptyPopulation)?;
        let mut m = self.molecule.clone();
        m.set_coordinates(&member.coordinates)?;
        Ok(m)
    }

    fn has_converged(&self) -> bool {
        let window = self.params.convergence_window;
        let n = self.best_history.len();
        if window == 0 || n <= window {
            return false;
        }
        let before = self.best_history[n - 1 - window];
        let now = self.best_history[n - 1];
        before - now < self.params.energy_tol
    }

    fn search_acceptance_rate(&self) -> f64 {
        if self.iteration == 0 {
            return 0.0;
        }
        self.counters.search_accepted as f64 / self.iteration as f64
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
    }

    fn note(&self, msg: String) {
        info!("{}", msg);
        self.emit(SolverEvent::Log(msg));
    }

    fn emit(&self, event: SolverEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
