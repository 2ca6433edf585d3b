use nalgebra::{Rotation3, Vector3};
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Circle, Line as CanvasLine},
        Block, BorderType, Borders, Cell, Gauge, List, ListItem, Paragraph, Row, Sparkline, Table,
        Tabs, Wrap,
    },
};

use crate::core::domain::Conformer;
use crate::core::spatial;
use crate::interface::state::{AppMode, AppState, WorkerStatus};
use crate::solvers::ga::SearchState;

// --- Color Palette ---
const COL_BG: Color = Color::Reset;
const COL_FG: Color = Color::White;
const COL_HIGHLIGHT: Color = Color::Yellow;
const COL_ACCENT: Color = Color::Cyan;
const COL_BOND: Color = Color::DarkGray;
const COL_SUCCESS: Color = Color::Green;
const COL_FAIL: Color = Color::Red;
const COL_HEADER: Color = Color::Magenta;
const COL_RATE: Color = Color::LightGreen;

const BOND_CUTOFF_SQ: f64 = 1.75 * 1.75; // Å², drawing only

pub fn draw(f: &mut Frame, app: &mut AppState) {
    if f.area().width < 40 || f.area().height < 10 {
        let p = Paragraph::new("Terminal too small.")
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(p, f.area());
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(1)])
        .split(f.area());

    draw_header(f, app, chunks[0]);

    match app.mode {
        AppMode::Dashboard => draw_dashboard(f, app, chunks[1]),
        AppMode::HallOfFame => draw_hall_of_fame(f, app, chunks[1]),
        AppMode::StructureViewer => draw_fullscreen_viewer(f, app, chunks[1]),
    }

    draw_footer(f, app, chunks[2]);
}

fn draw_header(f: &mut Frame, app: &AppState, area: Rect) {
    let titles = vec![" 1:Dash ", " 2:Minima ", " 3:Viewer "];
    let idx = match app.mode {
        AppMode::Dashboard => 0,
        AppMode::HallOfFame => 1,
        AppMode::StructureViewer => 2,
    };

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::BOTTOM)
                .title(format!(" GAMSS: {} ", app.molecule_title)),
        )
        .select(idx)
        .highlight_style(Style::default().fg(COL_HIGHLIGHT).add_modifier(Modifier::BOLD));

    f.render_widget(tabs, area);
}

fn draw_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let status_str = match app.worker_status {
        WorkerStatus::Running => "RUNNING".to_string(),
        WorkerStatus::Idle => "IDLE".to_string(),
        WorkerStatus::Starting => "SEEDING".to_string(),
        WorkerStatus::Stopping => "STOPPING".to_string(),
        WorkerStatus::Finished => match app.final_state {
            Some(s) => format!("{:?}", s).to_uppercase(),
            None => "DONE".to_string(),
        },
    };

    let color = match app.worker_status {
        WorkerStatus::Running => COL_SUCCESS,
        WorkerStatus::Stopping => COL_HIGHLIGHT,
        WorkerStatus::Finished if matches!(app.final_state, None | Some(SearchState::Failed)) => COL_FAIL,
        _ => COL_FG,
    };

    let best_val = app.current_best.as_ref().map_or(0.0, |c| c.energy);

    let text = Line::from(vec![
        Span::styled(
            format!(" STATUS: {:<10}", status_str),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(format!("Evals/s: {:<6.2}", app.evals_per_second)),
        Span::raw(" | "),
        Span::styled(format!("Best: {:.4} kJ/mol", best_val), Style::default().fg(COL_ACCENT)),
        Span::raw(" | [Q]uit [C]ancel [A]uto-rot [+/-]Zoom"),
    ]);

    let p = Paragraph::new(text).style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(p, area);
}

fn draw_dashboard(f: &mut Frame, app: &AppState, area: Rect) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let left_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(cols[0]);

    if let Some(conformer) = &app.active_conformer {
        draw_conformer_3d(f, app, left_rows[0], conformer, " Current Minimum ");
    } else {
        f.render_widget(
            Block::default().title(" Waiting for Data... ").borders(Borders::ALL),
            left_rows[0],
        );
    }

    draw_energy_charts(f, app, left_rows[1]);

    let right_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Length(4),
            Constraint::Min(8),
        ])
        .split(cols[1]);

    draw_logs(f, app, right_rows[0]);
    draw_gauges(f, app, right_rows[1]);
    draw_config(f, app, right_rows[2]);
}

fn atom_color(symbol: &str) -> Color {
    match symbol {
        "H" => Color::White,
        "C" => Color::Gray,
        "N" => Color::LightBlue,
        "O" => Color::LightRed,
        "S" => Color::Yellow,
        "F" | "Cl" => Color::LightGreen,
        "Br" | "I" => Color::Magenta,
        _ => Color::LightCyan,
    }
}

fn draw_conformer_3d(f: &mut Frame, app: &AppState, area: Rect, conformer: &Conformer, title: &str) {
    let block = Block::default()
        .title(format!("{}({:.4}) ", title, conformer.energy))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded);

    let inner_area = block.inner(area);
    f.render_widget(block, area);

    if inner_area.width < 1 || inner_area.height < 1 || conformer.atoms.is_empty() {
        return;
    }

    let center = spatial::centroid(&conformer.coordinates);
    let rot_y = Rotation3::from_axis_angle(&Vector3::y_axis(), app.viewport.azimuth);
    let rot_x = Rotation3::from_axis_angle(&Vector3::x_axis(), app.viewport.elevation);

    // (x, y, z, color, radius) after rotation about the centroid
    let mut render_atoms: Vec<(f64, f64, f64, Color, f64)> = conformer
        .atoms
        .iter()
        .zip(&conformer.coordinates)
        .map(|(atom, p)| {
            let v = rot_x * rot_y * (p.coords - center);
            let radius = if atom.symbol == "H" { 0.25 } else { 0.4 };
            (v.x, v.y, v.z, atom_color(&atom.symbol), radius)
        })
        .collect();

    if render_atoms.iter().any(|(x, y, z, _, _)| !(x.is_finite() && y.is_finite() && z.is_finite())) {
        f.render_widget(
            Paragraph::new("Error: non-finite coordinates").style(Style::default().fg(COL_FAIL)),
            inner_area,
        );
        return;
    }

    let max_coord = render_atoms
        .iter()
        .flat_map(|(x, y, _, _, _)| [x.abs(), y.abs()])
        .fold(0.0, f64::max)
        .max(1.0);
    let bound = max_coord * 1.2;
    let zoom = app.viewport.zoom;

    render_atoms.sort_by(|a, b| a.2.total_cmp(&b.2));

    let canvas = Canvas::default()
        .background_color(COL_BG)
        .x_bounds([-bound, bound])
        .y_bounds([-bound, bound])
        .paint(|ctx| {
            for i in 0..render_atoms.len() {
                for j in (i + 1)..render_atoms.len() {
                    let a = &render_atoms[i];
                    let b = &render_atoms[j];
                    let d2 = (a.0 - b.0).powi(2) + (a.1 - b.1).powi(2) + (a.2 - b.2).powi(2);
                    if d2 < BOND_CUTOFF_SQ {
                        ctx.draw(&CanvasLine {
                            x1: a.0 * zoom,
                            y1: a.1 * zoom,
                            x2: b.0 * zoom,
                            y2: b.1 * zoom,
                            color: COL_BOND,
                        });
                    }
                }
            }
            for (x, y, z, col, size) in &render_atoms {
                let perspective = (1.0 + z * 0.05).clamp(0.5, 1.5);
                ctx.draw(&Circle {
                    x: *x * zoom,
                    y: *y * zoom,
                    radius: *size * zoom * perspective,
                    color: *col,
                });
            }
        });

    f.render_widget(canvas, inner_area);

    let rot_status = if app.viewport.auto_rotate { "Auto-Rot: ON" } else { "Auto-Rot: OFF" };
    let overlay = Paragraph::new(rot_status)
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC));
    let overlay_area = Rect {
        x: inner_area.x + inner_area.width.saturating_sub(14),
        y: inner_area.y,
        width: 14.min(inner_area.width),
        height: 1,
    };
    f.render_widget(overlay, overlay_area);
}

fn sparkline_data(series: impl DoubleEndedIterator<Item = f64>, width: usize, min: f64, range: f64) -> Vec<u64> {
    let mut data: Vec<u64> = series
        .rev()
        .take(width)
        .map(|v| (((v - min) / range).clamp(0.0, 1.0) * 10.0) as u64)
        .collect();
    data.reverse();
    data
}

fn draw_energy_charts(f: &mut Frame, app: &AppState, area: Rect) {
    let block = Block::default().title(" Search Progress ").borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(inner);

    let width = inner.width as usize;
    let t = &app.telemetry;

    if !t.best_energy_history.is_empty() {
        let min = t.global_min_energy;
        let range = (t.global_max_energy - min).max(1e-6);
        let data = sparkline_data(t.avg_energy_history.iter().map(|(_, e)| *e), width, min, range);

        let spark = Sparkline::default()
            .block(Block::default().title(format!(
                "Mean Population Energy (best {:.4})",
                t.last.best_energy
            )))
            .style(Style::default().fg(COL_ACCENT))
            .data(&data);
        f.render_widget(spark, chunks[0]);
    }

    if !t.acceptance_history.is_empty() {
        let data = sparkline_data(t.acceptance_history.iter().map(|(_, r)| *r), width, 0.0, 100.0);
        let spark = Sparkline::default()
            .block(Block::default().title("Acceptance Rate"))
            .style(Style::default().fg(COL_RATE))
            .data(&data);
        f.render_widget(spark, chunks[1]);
    }
}

fn draw_logs(f: &mut Frame, app: &AppState, area: Rect) {
    let block = Block::default().title(" Search Log ").borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let items: Vec<ListItem> = app
        .logs
        .iter()
        .rev()
        .map(|line| {
            let style = if line.contains("CRITICAL") || line.contains("failed") {
                Style::default().fg(COL_FAIL)
            } else if line.contains(">>>") {
                Style::default().fg(COL_SUCCESS)
            } else {
                Style::default().fg(Color::Gray)
            };

            ListItem::new(Line::from(vec![
                Span::styled(">", Style::default().fg(Color::DarkGray)),
                Span::raw(" "),
                Span::raw(line.as_str()),
            ]))
            .style(style)
        })
        .collect();

    f.render_widget(List::new(items), inner);
}

fn draw_gauges(f: &mut Frame, app: &AppState, area: Rect) {
    let block = Block::default().title(" Progress ").borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1); 2])
        .split(inner);

    let max_iter = app.params.max_iter.max(1);
    let iter_ratio = app.total_iterations as f64 / max_iter as f64;
    let g_iter = Gauge::default()
        .gauge_style(Style::default().fg(COL_ACCENT).bg(Color::DarkGray))
        .ratio(iter_ratio.clamp(0.0, 1.0))
        .label(format!("Iteration {}/{}", app.total_iterations, max_iter));
    f.render_widget(g_iter, layout[0]);

    let last = &app.telemetry.last;
    let fill = last.pop_size as f64 / app.params.pop_size.max(1) as f64;
    let g_pop = Gauge::default()
        .gauge_style(Style::default().fg(COL_RATE).bg(Color::DarkGray))
        .ratio(fill.clamp(0.0, 1.0))
        .label(format!(
            "Population {}/{}  blacklist {}",
            last.pop_size, app.params.pop_size, last.blacklist_size
        ));
    f.render_widget(g_pop, layout[1]);
}

fn draw_config(f: &mut Frame, app: &AppState, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Search Parameters ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let p = &app.params;
    let kv = |k: &str, v: String| -> Line {
        Line::from(vec![
            Span::styled(format!("{:<14}", k), Style::default().fg(COL_ACCENT)),
            Span::raw(v),
        ])
    };

    let text = vec![
        kv("Selection:", format!("{:?}", p.selection)),
        kv("Max torsions:", p.max_mut_tors.to_string()),
        kv("Crossover:", format!("{:.2}", p.prob_cross)),
        kv("Distances:", format!("[{:.2}, {:.2}] Å", p.dist_min, p.dist_max)),
        kv("RMSD tol:", format!("{:.3} Å ({:?})", p.rmsd_tol_uniq, p.rmsd_mode)),
        kv("Evaluations:", app.telemetry.last.evaluations.to_string()),
        kv("Seed:", p.seed.to_string()),
    ];

    f.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }), inner);
}

fn draw_hall_of_fame(f: &mut Frame, app: &mut AppState, area: Rect) {
    if app.hall_of_fame.is_empty() {
        f.render_widget(
            Paragraph::new("Waiting for successful evaluations...")
                .block(Block::default().borders(Borders::ALL).title(" Global Minima "))
                .alignment(Alignment::Center),
            area,
        );
        return;
    }

    let header_cells = ["Rank", "Energy (kJ/mol)", "ΔE", "Visits", "Atoms"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(COL_HEADER)));
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let e0 = app.hall_of_fame[0].energy;
    let rows = app.hall_of_fame.iter().enumerate().map(|(i, c)| {
        Row::new(vec![
            Cell::from(format!("#{}", i + 1)),
            Cell::from(format!("{:.5}", c.energy)),
            Cell::from(format!("{:.4}", c.energy - e0)),
            Cell::from(c.visit_count.to_string()),
            Cell::from(c.num_atoms().to_string()),
        ])
        .height(1)
    });

    let t = Table::new(
        rows,
        &[
            Constraint::Length(6),
            Constraint::Length(18),
            Constraint::Length(12),
            Constraint::Length(8),
            Constraint::Min(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Global Minima ({}) ", app.hall_of_fame.len())),
    )
    .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    f.render_stateful_widget(t, area, &mut app.hof_state);
}

fn draw_fullscreen_viewer(f: &mut Frame, app: &AppState, area: Rect) {
    if let Some(conformer) = &app.active_conformer {
        draw_conformer_3d(f, app, area, conformer, " Structure Viewer ");
    } else {
        let p = Paragraph::new("No structure selected.\nGo to Minima and select a structure.")
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(p, area);
    }
}
