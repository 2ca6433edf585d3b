use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, TryRecvError};
use ratatui::widgets::TableState;

use crate::core::domain::{Conformer, SearchParams};
use crate::solvers::ga::SearchState;
use crate::solvers::{GenStats, SolverEvent};

// --- Constants ---
const HISTORY_CAPACITY: usize = 1000;
const LOG_CAPACITY: usize = 200;
const HOF_CAPACITY: usize = 50;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Dashboard,
    HallOfFame,
    StructureViewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Starting,
    Running,
    Stopping,
    Finished,
}

// --- Telemetry ---

#[derive(Debug, Clone)]
pub struct Telemetry {
    // (iteration, value) series for the charts
    pub best_energy_history: VecDeque<(f64, f64)>,
    pub avg_energy_history: VecDeque<(f64, f64)>,
    pub acceptance_history: VecDeque<(f64, f64)>, // percent
    pub blacklist_history: VecDeque<(f64, f64)>,

    pub global_min_energy: f64,
    pub global_max_energy: f64,
    pub last: GenStats,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            best_energy_history: VecDeque::with_capacity(HISTORY_CAPACITY),
            avg_energy_history: VecDeque::with_capacity(HISTORY_CAPACITY),
            acceptance_history: VecDeque::with_capacity(HISTORY_CAPACITY),
            blacklist_history: VecDeque::with_capacity(HISTORY_CAPACITY),
            global_min_energy: f64::MAX,
            global_max_energy: f64::MIN,
            last: GenStats::default(),
        }
    }

    pub fn ingest(&mut self, stats: &GenStats) {
        if self.best_energy_history.len() >= HISTORY_CAPACITY {
            self.best_energy_history.pop_front();
            self.avg_energy_history.pop_front();
            self.acceptance_history.pop_front();
            self.blacklist_history.pop_front();
        }

        self.global_min_energy = self.global_min_energy.min(stats.best_energy);
        self.global_max_energy = self.global_max_energy.max(stats.avg_energy);

        // zero-height charts render nothing
        if (self.global_max_energy - self.global_min_energy).abs() < 1e-6 {
            self.global_max_energy += 1.0;
            self.global_min_energy -= 1.0;
        }

        let x = stats.iteration as f64;
        self.best_energy_history.push_back((x, stats.best_energy));
        self.avg_energy_history.push_back((x, stats.avg_energy));
        self.acceptance_history.push_back((x, stats.acceptance_rate * 100.0));
        self.blacklist_history.push_back((x, stats.blacklist_size as f64));
        self.last = stats.clone();
    }
}

/// Visualization State for 3D Viewer
#[derive(Debug, Clone)]
pub struct Viewport {
    pub azimuth: f64,
    pub elevation: f64,
    pub zoom: f64,
    pub auto_rotate: bool,
    pub last_tick: Instant,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new()
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self {
            azimuth: 0.0,
            elevation: 0.3,
            zoom: 1.0,
            auto_rotate: true,
            last_tick: Instant::now(),
        }
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        if self.auto_rotate {
            let dt = now.duration_since(self.last_tick).as_secs_f64();
            self.azimuth += 0.5 * dt; // rad/s
        }
        self.last_tick = now;
    }
}

// --- The Master State ---

pub struct AppState {
    // System
    pub should_quit: bool,
    pub mode: AppMode,
    pub params: SearchParams,
    pub molecule_title: String,

    // Worker
    pub rx: Option<Receiver<SolverEvent>>,
    pub worker_status: WorkerStatus,
    pub final_state: Option<SearchState>,
    cancel: Arc<AtomicBool>,

    // Search Data
    pub total_iterations: usize,
    pub start_time: Instant,
    pub current_best: Option<Conformer>,
    pub hall_of_fame: Vec<Conformer>,
    pub active_conformer: Option<Conformer>,

    // Analytics
    pub telemetry: Telemetry,
    pub logs: VecDeque<String>,
    pub evals_per_second: f64,

    // UI Elements
    pub hof_state: TableState,
    pub viewport: Viewport,
}

impl AppState {
    pub fn new(params: SearchParams, molecule_title: &str, cancel: Arc<AtomicBool>) -> Self {
        let mut hof_state = TableState::default();
        hof_state.select(Some(0));

        Self {
            should_quit: false,
            mode: AppMode::Dashboard,
            params,
            molecule_title: molecule_title.to_string(),
            rx: None,
            worker_status: WorkerStatus::Idle,
            final_state: None,
            cancel,
            total_iterations: 0,
            start_time: Instant::now(),
            current_best: None,
            hall_of_fame: Vec::with_capacity(HOF_CAPACITY),
            active_conformer: None,
            telemetry: Telemetry::new(),
            logs: VecDeque::with_capacity(LOG_CAPACITY),
            evals_per_second: 0.0,
            hof_state,
            viewport: Viewport::new(),
        }
    }

    pub fn set_channel(&mut self, rx: Receiver<SolverEvent>) {
        self.rx = Some(rx);
        self.worker_status = WorkerStatus::Starting;
        self.start_time = Instant::now();
    }

    pub fn tick(&mut self) {
        self.viewport.tick();

        if let Some(rx) = self.rx.clone() {
            for _ in 0..100 {
                match rx.try_recv() {
                    Ok(evt) => self.handle_event(evt),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        if self.worker_status != WorkerStatus::Finished {
                            self.worker_status = WorkerStatus::Finished;
                            self.log("Worker disconnected.");
                        }
                        self.rx = None;
                        break;
                    }
                }
            }
        }
    }

    pub fn handle_event(&mut self, event: SolverEvent) {
        match event {
            SolverEvent::Log(msg) => self.log(msg),

            SolverEvent::WorkerHeartbeat(rate) => {
                if rate > 0.0 {
                    self.evals_per_second = rate;
                }
            }

            SolverEvent::GenerationUpdate(stats) => {
                if self.worker_status == WorkerStatus::Starting {
                    self.worker_status = WorkerStatus::Running;
                }
                self.total_iterations = stats.iteration;
                self.telemetry.ingest(&stats);
            }

            SolverEvent::NewBest(conformer) => self.handle_new_best(conformer),

            SolverEvent::Finished(state) => {
                self.worker_status = WorkerStatus::Finished;
                self.final_state = Some(state);
                self.log(format!("Search finished: {:?}", state));
            }
        }
    }

    fn handle_new_best(&mut self, conformer: Conformer) {
        let e_new = conformer.energy;
        let is_global = self.current_best.as_ref().map_or(true, |c| e_new < c.energy);

        if is_global {
            self.current_best = Some(conformer.clone());
            self.log(format!(">>> New global minimum: {:.5} kJ/mol", e_new));
        }

        let pos = self.hall_of_fame.partition_point(|c| c.cmp_energy(&conformer).is_le());
        self.hall_of_fame.insert(pos, conformer.clone());
        self.hall_of_fame.truncate(HOF_CAPACITY);

        self.active_conformer = Some(conformer);
    }

    /// Logs a message to the internal buffer.
    pub fn log(&mut self, msg: impl Into<String>) {
        if self.logs.len() >= LOG_CAPACITY {
            self.logs.pop_front();
        }
        self.logs.push_back(msg.into());
    }

    // --- Input Handling ---

    pub fn on_key(&mut self, key: char) {
        match key {
            'q' => {
                self.request_stop();
                self.should_quit = true;
            }
            '1' => self.mode = AppMode::Dashboard,
            '2' => self.mode = AppMode::HallOfFame,
            '3' => self.mode = AppMode::StructureViewer,
            'c' => self.request_stop(),
            'a' => self.viewport.auto_rotate = !self.viewport.auto_rotate,
            'r' => self.viewport.azimuth = 0.0,
            '+' => self.viewport.zoom = (self.viewport.zoom * 1.2).min(10.0),
            '-' => self.viewport.zoom = (self.viewport.zoom / 1.2).max(0.1),
            'j' => self.select_next_hof(),
            'k' => self.select_prev_hof(),
            _ => {}
        }
    }

    /// Asks the worker to stop after the current trial.
    pub fn request_stop(&mut self) {
        if matches!(self.worker_status, WorkerStatus::Starting | WorkerStatus::Running) {
            self.cancel.store(true, Ordering::Relaxed);
            self.worker_status = WorkerStatus::Stopping;
            self.log("Stop requested.");
        }
    }

    fn select_next_hof(&mut self) {
        if self.hall_of_fame.is_empty() {
            return;
        }
        let i = match self.hof_state.selected() {
            Some(i) if i + 1 < self.hall_of_fame.len() => i + 1,
            _ => 0,
        };
        self.hof_state.select(Some(i));
        self.active_conformer = Some(self.hall_of_fame[i].clone());
    }

    fn select_prev_hof(&mut self) {
        if self.hall_of_fame.is_empty() {
            return;
        }
        let i = match self.hof_state.selected() {
            Some(0) | None => self.hall_of_fame.len() - 1,
            Some(i) => (i - 1).min(self.hall_of_fame.len() - 1),
        };
        self.hof_state.select(Some(i));
        self.active_conformer = Some(self.hall_of_fame[i].clone());
    }
}
