use std::env;
use std::fs;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use serde::Serialize;

use gamss::core::domain::SearchParams;
use gamss::core::molecule::{format_xyz, Molecule};
use gamss::engine::evaluator::Evaluator;
use gamss::engine::external::mopac::MopacEvaluator;
use gamss::interface::state::AppState;
use gamss::interface::ui;
use gamss::solvers::ga::{Gamss, SearchReport};
use gamss::solvers::SolverEvent;

// --- CLI Definitions ---

#[derive(Parser, Debug)]
#[command(author, version, about = "GAMSS: Genetic Algorithm Molecular Structure Search", long_about = None)]
struct Args {
    /// Input geometry in XYZ format
    #[arg(short = 'x', long)]
    xyz: PathBuf,

    /// Search parameters as JSON (missing fields take defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// MOPAC executable
    #[arg(long, default_value = "MOPAC2016.exe")]
    mopac: String,

    /// MOPAC keyword line
    #[arg(short, long, default_value = MopacEvaluator::DEFAULT_KEYWORDS)]
    keywords: String,

    /// Scratch directory for MOPAC jobs
    #[arg(short, long, default_value = "gamss_work")]
    workdir: PathBuf,

    /// Random seed (0 = system entropy); overrides the config file
    #[arg(short, long)]
    seed: Option<u64>,

    /// Population size; overrides the config file
    #[arg(short, long)]
    pop_size: Option<usize>,

    /// Maximum number of search iterations; overrides the config file
    #[arg(short, long)]
    max_iter: Option<usize>,

    /// Plain console output instead of the dashboard
    #[arg(long)]
    headless: bool,

    /// Write the final report as JSON
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Write every trial as CSV
    #[arg(short, long)]
    trace: Option<PathBuf>,
}

// --- Terminal Guard (RAII) ---

struct TuiContext {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TuiContext {
    fn new() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
            .context("Failed to setup terminal alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend).context("Failed to create terminal backend")?;
        Ok(Self { terminal })
    }
}

impl Drop for TuiContext {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture);
        let _ = self.terminal.show_cursor();
    }
}

// --- Initialization Helpers ---

fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // restore the terminal before printing the panic
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic_info);
    }));
}

fn load_molecule(path: &Path) -> Result<Molecule> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Molecule::from_xyz_str(&text).with_context(|| format!("Invalid XYZ file {}", path.display()))
}

fn load_params(args: &Args) -> Result<SearchParams> {
    let mut params = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => SearchParams::default(),
    };

    if let Some(seed) = args.seed {
        params.seed = seed;
    }
    if let Some(n) = args.pop_size {
        params.pop_size = n;
    }
    if let Some(n) = args.max_iter {
        params.max_iter = n;
    }
    params.validate().context("Invalid search parameters")?;
    Ok(params)
}

fn check_dependencies(executable: &str) -> Result<()> {
    let exe = Path::new(executable);
    let found = if exe.components().count() > 1 {
        exe.is_file()
    } else {
        env::var_os("PATH")
            .map(|paths| env::split_paths(&paths).any(|dir| dir.join(exe).is_file()))
            .unwrap_or(false)
    };
    if !found {
        bail!(
            "Dependency Check Failed: '{}' not found.\n\
             GAMSS requires MOPAC to perform energy evaluations.\n\
             Install MOPAC, add it to PATH or pass --mopac <path>.",
            executable
        );
    }
    Ok(())
}

/// Console logger for headless runs; `RUST_LOG` wins over the `info` default.
fn headless_logger(env: env_logger::Env) -> env_logger::Builder {
    let mut builder = env_logger::Builder::from_env(env.default_filter_or("info"));
    builder.target(env_logger::Target::Stderr).format_timestamp_millis();
    builder
}

// --- Output ---

#[derive(Serialize)]
struct RunReport<'a> {
    generated: String,
    molecule: &'a str,
    evaluator: &'a str,
    params: &'a SearchParams,
    #[serde(flatten)]
    search: &'a SearchReport,
}

fn write_outputs(args: &Args, molecule: &Molecule, params: &SearchParams, report: &SearchReport) -> Result<()> {
    if let Some(path) = &args.report {
        let run = RunReport {
            generated: chrono::Local::now().to_rfc3339(),
            molecule: molecule.title(),
            evaluator: "MOPAC",
            params,
            search: report,
        };
        let json = serde_json::to_string_pretty(&run).context("Failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if let Some(path) = &args.trace {
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        for record in &report.trace {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
    }
    Ok(())
}

fn print_summary(molecule: &Molecule, report: &SearchReport) {
    println!("Genetic Algorithm Molecular Structure Search (GAMSS)");
    println!("{}", "=".repeat(52));
    println!("Final state:  {:?}", report.state);
    println!("Iterations:   {}", report.iterations);
    println!("Evaluations:  {}", report.counters.evaluations);
    println!("Blacklisted:  {}", report.blacklist_size);
    println!();
    for (i, c) in report.population.iter().enumerate() {
        println!("Conformer: {}  Energy: {:12.6}  Visits: {}", i + 1, c.energy, c.visit_count);
    }
    println!();
    let title = format!("{} E = {:.6} kJ/mol", molecule.title(), report.global_minimum.energy);
    print!(
        "{}",
        format_xyz(&title, &report.global_minimum.atoms, &report.global_minimum.coordinates)
    );
}

// --- Main ---

fn main() -> Result<()> {
    let args = Args::parse();

    let molecule = load_molecule(&args.xyz)?;
    let params = load_params(&args)?;
    check_dependencies(&args.mopac)?;

    if args.headless {
        headless_logger(env_logger::Env::default()).init();
        println!("{}\n", params);
    }

    let evaluator: Arc<dyn Evaluator> =
        Arc::new(MopacEvaluator::new(&args.mopac, &args.keywords, &args.workdir));

    // Spawn Solver Thread
    let (tx, rx) = unbounded();
    let cancel = Arc::new(AtomicBool::new(false));

    let worker = {
        let molecule = molecule.clone();
        let params = params.clone();
        let cancel = cancel.clone();
        thread::Builder::new()
            .name("Solver-Worker".to_string())
            .spawn(move || {
                let mut gamss = Gamss::new(molecule, evaluator, params)?
                    .with_events(tx)
                    .with_cancel_flag(cancel);
                gamss.solve()
            })?
    };

    if args.headless {
        // the logger already prints driver messages
        for event in rx.iter() {
            if let SolverEvent::GenerationUpdate(stats) = event {
                log::debug!(
                    "iter {:>5}  best {:>14.6}  mean {:>14.6}  pop {:>3}  blacklist {:>5}",
                    stats.iteration,
                    stats.best_energy,
                    stats.avg_energy,
                    stats.pop_size,
                    stats.blacklist_size
                );
            }
        }
    } else {
        setup_panic_hook();
        run_dashboard(&params, &molecule, rx, cancel)?;
    }

    let report = worker
        .join()
        .map_err(|_| anyhow!("Solver thread panicked"))?
        .context("Search failed")?;

    write_outputs(&args, &molecule, &params, &report)?;
    print_summary(&molecule, &report);
    Ok(())
}

fn run_dashboard(
    params: &SearchParams,
    molecule: &Molecule,
    rx: crossbeam_channel::Receiver<SolverEvent>,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let mut tui = TuiContext::new().context("Failed to initialize TUI")?;
    let mut app = AppState::new(params.clone(), molecule.title(), cancel);
    app.set_channel(rx);

    let tick_rate = Duration::from_millis(50); // 20 FPS
    let mut last_tick = Instant::now();

    while !app.should_quit {
        tui.terminal.draw(|f| ui::draw(f, &mut app))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == event::KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char(c) => app.on_key(c),
                        KeyCode::Esc => app.on_key('q'),
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::LevelFilter;

    #[test]
    fn headless_logger_defaults_to_info() {
        let env = env_logger::Env::new().filter("GAMSS_TEST_UNSET_FILTER");
        assert_eq!(headless_logger(env).build().filter(), LevelFilter::Info);
    }

    #[test]
    fn headless_logger_honours_filter_variable() {
        env::set_var("GAMSS_TEST_LOG_FILTER", "debug");
        let env = env_logger::Env::new().filter("GAMSS_TEST_LOG_FILTER");
        assert_eq!(headless_logger(env).build().filter(), LevelFilter::Debug);
    }
}
