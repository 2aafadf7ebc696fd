//! Terminal User Interface for pdu-watch.
//!
//! This module provides a real-time dashboard using `ratatui` that displays:
//!
//! - Status bar with node, replay time and progress
//! - Condition table coloured by state
//! - Voltage and load charts with threshold lines
//! - Daily statistics and recent notifications
//!
//! # Controls
//!
//! - `q` or `Esc`: Quit

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, BorderType, Borders, Chart, Dataset, GraphType, List, ListItem, Paragraph},
    Frame, Terminal,
};
use tracing::{debug, info};

use crate::app::App;
use crate::condition::{Condition, ConditionState};
use crate::error::Result;
use crate::notify::minutes_seconds;

/// One charted point per replayed sample.
#[derive(Clone, Copy)]
struct Point {
    max_voltage: f64,
    max_current: f64,
}

/// Run the TUI event loop.
///
/// Replays one sample per `interval` until the source is exhausted, the
/// user presses `q` or `Esc`, or the `running` flag is cleared. The
/// dashboard stays open after the replay ends.
pub fn run(mut app: App, running: Arc<AtomicBool>, interval: Duration) -> Result<()> {
    enable_raw_mode()?;
    if let Err(e) = std::io::stdout().execute(EnterAlternateScreen) {
        let _ = disable_raw_mode();
        return Err(e.into());
    }

    let result = run_tui_loop(&mut app, &running, interval);

    // Always clean up terminal state
    let _ = disable_raw_mode();
    let _ = std::io::stdout().execute(LeaveAlternateScreen);

    result.and(app.shutdown())
}

/// Inner TUI loop, separated to ensure cleanup happens on any exit path.
fn run_tui_loop(app: &mut App, running: &Arc<AtomicBool>, interval: Duration) -> Result<()> {
    let backend = CrosstermBackend::new(std::io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let history_size = app.config.history_size.max(2);
    let mut history = VecDeque::with_capacity(history_size);
    let mut last_step = Instant::now();

    while running.load(Ordering::Relaxed) {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => {
                            running.store(false, Ordering::Relaxed);
                        }
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            running.store(false, Ordering::Relaxed);
                        }
                        _ => {}
                    }
                }
            }
        }

        if !app.is_finished() && last_step.elapsed() >= interval {
            if app.step()? {
                push_point(&mut history, app, history_size);
            }
            last_step = Instant::now();
        }

        terminal.draw(|f| draw_ui(f, app, &history))?;
    }

    Ok(())
}

fn push_point(history: &mut VecDeque<Point>, app: &App, max_size: usize) {
    let Some(sample) = app.last_sample.as_ref() else {
        return;
    };
    let max3 = |p: Option<[f64; 3]>| p.map(|p| p.into_iter().fold(0.0, f64::max)).unwrap_or(0.0);
    if history.len() >= max_size {
        history.pop_front();
    }
    history.push_back(Point {
        max_voltage: max3(sample.voltages()),
        max_current: max3(sample.currents()),
    });
}

/// Main UI drawing function.
fn draw_ui(f: &mut Frame, app: &App, history: &VecDeque<Point>) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // Status bar
            Constraint::Min(12),    // Conditions + charts
            Constraint::Length(10), // Daily stats + notifications
        ])
        .split(f.area());

    draw_status_bar(f, app, main_chunks[0]);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(38), Constraint::Min(20)])
        .split(main_chunks[1]);
    draw_conditions(f, app, middle[0]);
    draw_charts(f, app, history, middle[1]);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(44), Constraint::Min(20)])
        .split(main_chunks[2]);
    draw_daily(f, app, bottom[0]);
    draw_notifications(f, app, bottom[1]);
}

/// Draw the top status bar.
fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let time = app
        .last_sample
        .as_ref()
        .and_then(|s| app.local_time(s.timestamp))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "waiting for samples".to_string());
    let state = if !app.registry.is_active() {
        "stopped"
    } else if app.is_finished() {
        "replay done"
    } else {
        "replaying"
    };
    let text = format!(
        " ⚡ pdu-watch | {} | {} | {} | Samples: {} | Rollovers: {} | [q]uit",
        app.config.node_name, time, state, app.samples_seen, app.rollovers
    );

    let status = Paragraph::new(text)
        .style(Style::default().fg(Color::White).bg(Color::DarkGray))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title("Status"),
        );
    f.render_widget(status, area);
}

fn state_style(state: ConditionState) -> Style {
    match state {
        ConditionState::Failure => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ConditionState::Warning => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        ConditionState::Normal => Style::default().fg(Color::Green),
    }
}

/// Draw the condition table, worst state first.
fn draw_conditions(f: &mut Frame, app: &App, area: Rect) {
    let mut rows: Vec<_> = Condition::ALL
        .iter()
        .map(|&c| (c, app.registry.state(c)))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let items: Vec<ListItem> = rows
        .into_iter()
        .map(|(c, state)| {
            ListItem::new(format!(
                "{:<25}{:>8} {:>2}/{:<2}",
                c.name(),
                state.label(),
                app.registry.daily_warnings(c),
                app.registry.daily_failures(c)
            ))
            .style(state_style(state))
        })
        .collect();

    let worst = Condition::ALL
        .iter()
        .map(|&c| app.registry.state(c))
        .max()
        .unwrap_or_default();
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title("Conditions (W/F today)")
            .border_style(state_style(worst)),
    );
    f.render_widget(list, area);
}

fn draw_charts(f: &mut Frame, app: &App, history: &VecDeque<Point>, area: Rect) {
    if history.is_empty() {
        let loading = Paragraph::new("Waiting for data...").block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title("Charts"),
        );
        f.render_widget(loading, area);
        return;
    }

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)])
        .split(area);
    let t = app.registry.thresholds();

    draw_line_chart(
        f,
        history,
        rows[0],
        "Max phase V",
        |p| p.max_voltage,
        ChartConfig {
            color: Color::Cyan,
            state: app.registry.state(Condition::Overvoltage),
            warning: Some(t.overvoltage_warning),
            failure: Some(t.overvoltage_failure),
        },
    );
    draw_line_chart(
        f,
        history,
        rows[1],
        "Max phase A",
        |p| p.max_current,
        ChartConfig {
            color: Color::Magenta,
            state: app.registry.state(Condition::Overload),
            warning: Some(t.overload_warning),
            failure: Some(t.overload_failure),
        },
    );
}

/// Chart configuration including thresholds and styling.
#[derive(Default)]
struct ChartConfig {
    warning: Option<f64>,
    failure: Option<f64>,
    color: Color,
    state: ConditionState,
}

/// Draw a single line chart with state highlighting and threshold lines.
fn draw_line_chart<F>(
    f: &mut Frame,
    history: &VecDeque<Point>,
    area: Rect,
    title: &str,
    value_fn: F,
    config: ChartConfig,
) where
    F: Fn(&Point) -> f64,
{
    let ChartConfig {
        warning,
        failure,
        color,
        state,
    } = config;
    let data: Vec<(f64, f64)> = history
        .iter()
        .enumerate()
        .map(|(i, p)| (i as f64, value_fn(p)))
        .collect();
    let data_len = data.len() as f64;

    let min_y = data.iter().map(|(_, y)| *y).fold(f64::INFINITY, f64::min);
    let mut max_y = data.iter().map(|(_, y)| *y).fold(f64::NEG_INFINITY, f64::max);
    for limit in [warning, failure].into_iter().flatten() {
        max_y = max_y.max(limit * 1.02);
    }
    let y_range = if (max_y - min_y).abs() < 0.001 {
        (min_y - 1.0, max_y + 1.0)
    } else {
        (min_y * 0.95, max_y)
    };

    let warning_line: Vec<(f64, f64)> = warning
        .map(|w| vec![(0.0, w), (data_len, w)])
        .unwrap_or_default();
    let failure_line: Vec<(f64, f64)> = failure
        .map(|c| vec![(0.0, c), (data_len, c)])
        .unwrap_or_default();

    let datasets = vec![
        Dataset::default()
            .name(title)
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(color))
            .data(&data),
        Dataset::default()
            .name("warn")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Yellow))
            .data(&warning_line),
        Dataset::default()
            .name("fail")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Red))
            .data(&failure_line),
    ];

    let title_style = match state {
        ConditionState::Normal => Style::default().fg(Color::White),
        other => state_style(other),
    };
    let border_color = match state {
        ConditionState::Failure => Color::Red,
        ConditionState::Warning => Color::Yellow,
        ConditionState::Normal => Color::White,
    };

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title(Span::styled(title, title_style))
                .border_style(Style::default().fg(border_color)),
        )
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, data_len]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([y_range.0, y_range.1])
                .labels(vec![
                    Span::raw(format!("{:.0}", y_range.0)),
                    Span::raw(format!("{:.0}", y_range.1)),
                ]),
        );
    f.render_widget(chart, area);
}

/// Draw today's statistics.
fn draw_daily(f: &mut Frame, app: &App, area: Rect) {
    let snap = app.aggregator.snapshot();
    let d = &snap.daily;
    let tracker = app.registry.tracker();
    let last = if tracker.in_progress() {
        "in progress".to_string()
    } else {
        let (m, s) = minutes_seconds(tracker.last_duration());
        format!("{m}m {s}s")
    };
    let day = app
        .current_day()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());

    let items = vec![
        ListItem::new(format!("Day:           {day}")),
        ListItem::new(format!("Energy today:  {:>9.2} kWh", d.energy)),
        ListItem::new(format!("Energy total:  {:>9.2} kWh", app.meter_reading())),
        ListItem::new(format!(
            "Voltage:       {:>6.1} - {:>6.1} V",
            d.voltage.min, d.voltage.max
        )),
        ListItem::new(format!(
            "Current:       {:>6.1} - {:>6.1} A",
            d.current.min, d.current.max
        )),
        ListItem::new(format!(
            "Frequency:     {:>6.2} - {:>6.2} Hz",
            d.frequency.min, d.frequency.max
        )),
        ListItem::new(format!(
            "Outages:       {:>3} ({} s), last {last}",
            d.failures[Condition::PowerFailure],
            d.power_failures_duration
        )),
    ];
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title("Today"),
    );
    f.render_widget(list, area);
}

/// Draw the most recent notifications, newest first.
fn draw_notifications(f: &mut Frame, app: &App, area: Rect) {
    let capacity = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = app
        .notifications
        .iter()
        .rev()
        .take(capacity)
        .map(|n| {
            let first_line = n.text.lines().next().unwrap_or_default();
            ListItem::new(first_line.to_string()).style(state_style(n.state))
        })
        .collect();

    let title = if app.last_summary.is_some() {
        "Notifications (daily summary in log)"
    } else {
        "Notifications"
    };
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(title),
    );
    f.render_widget(list, area);
}

/// Run in headless mode (no TUI, just logging).
pub fn run_headless(mut app: App, running: Arc<AtomicBool>, interval: Duration) -> Result<()> {
    info!(
        data_dir = %app.config.data_dir.display(),
        interval_ms = interval.as_millis() as u64,
        "headless replay"
    );

    while running.load(Ordering::Relaxed) && app.step()? {
        if let Some(sample) = app.last_sample.as_ref() {
            let active: Vec<_> = Condition::ALL
                .iter()
                .filter(|&&c| app.registry.state(c) != ConditionState::Normal)
                .map(|c| c.key())
                .collect();
            debug!(ts = sample.timestamp, ?active, "sample processed");
        }
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }

    app.shutdown()
}
