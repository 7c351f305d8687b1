use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};

use schulte::{EngineState, FinishingReason, GameSession};

use crate::{App, AppState};

const HORIZONTAL_MARGIN: u16 = 2;
const VERTICAL_MARGIN: u16 = 1;
const CELL_WIDTH: u16 = 6;
const CELL_HEIGHT: u16 = 3;

const CELL_COLORS: [Color; 6] = [
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
];

/// Columns of the square-ish grid holding `count` cells.
pub fn grid_columns(count: usize) -> usize {
    let mut cols = 1;
    while cols * cols < count {
        cols += 1;
    }
    cols
}

/// The rectangle the grid occupies when centered in `area`.
pub fn grid_rect(area: Rect, count: usize) -> Rect {
    let cols = grid_columns(count) as u16;
    let rows = count.div_ceil(cols as usize) as u16;
    let width = (cols * CELL_WIDTH).min(area.width);
    let height = (rows * CELL_HEIGHT).min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

/// Display position of the cell under terminal coordinates, if any.
pub fn cell_at(grid: Rect, count: usize, column: u16, row: u16) -> Option<usize> {
    if count == 0
        || column < grid.x
        || row < grid.y
        || column >= grid.x + grid.width
        || row >= grid.y + grid.height
    {
        return None;
    }
    let cols = grid_columns(count);
    let col = ((column - grid.x) / CELL_WIDTH) as usize;
    let line = ((row - grid.y) / CELL_HEIGHT) as usize;
    let pos = line * cols + col;
    (col < cols && pos < count).then_some(pos)
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.state {
            AppState::Playing => render_board(self, area, buf),
            AppState::Results => render_results(self, area, buf),
            AppState::Levels => render_levels(self, area, buf),
        }
    }
}

fn base_style(app: &App) -> Style {
    if app.config.dark_mode {
        Style::default().fg(Color::White)
    } else {
        Style::default().fg(Color::Black)
    }
}

fn render_board(app: &App, area: Rect, buf: &mut Buffer) {
    let bold_style = base_style(app).add_modifier(Modifier::BOLD);
    let dim_style = base_style(app).add_modifier(Modifier::DIM);
    let italic_style = base_style(app).add_modifier(Modifier::ITALIC);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1), // level info
            Constraint::Length(1), // timer
            Constraint::Min(1),    // grid
            Constraint::Length(1), // legend
        ])
        .split(area);

    let engine = &app.engine;
    let level = engine.current_level();
    let session = engine.session();

    let header = Paragraph::new(Line::from(vec![
        Span::styled(format!("Level {}", level.serial), bold_style),
        Span::styled(
            format!(
                "   goal {}   record {}   next {}",
                level.goal, level.record, session.next_number
            ),
            dim_style,
        ),
    ]))
    .alignment(Alignment::Center);
    header.render(chunks[0], buf);

    let timer_text = match engine.state() {
        EngineState::Running => engine
            .time_remaining()
            .map(|left| format!("{:.1}", left.as_secs_f64()))
            .unwrap_or_default(),
        _ => "press (s) or tap a cell to start".to_string(),
    };
    Paragraph::new(Span::styled(timer_text, dim_style))
        .alignment(Alignment::Center)
        .render(chunks[1], buf);

    let numbers = engine.numbers();
    let grid = grid_rect(chunks[2], numbers.len());
    app.grid_area.set(grid);

    let cols = grid_columns(numbers.len());
    for (pos, idx) in app.display_order().into_iter().enumerate() {
        let x = grid.x + (pos % cols) as u16 * CELL_WIDTH;
        let y = grid.y + (pos / cols) as u16 * CELL_HEIGHT;
        if x + CELL_WIDTH > grid.x + grid.width || y + CELL_HEIGHT > grid.y + grid.height {
            continue;
        }
        let cell = Rect::new(x, y, CELL_WIDTH, CELL_HEIGHT);
        let value = numbers[idx];

        let mut style = if level.color_mode {
            Style::default().fg(CELL_COLORS[value as usize % CELL_COLORS.len()])
        } else {
            base_style(app)
        };
        if app.config.hint_needed && engine.is_running() && value == session.next_number {
            style = style.fg(Color::Green).add_modifier(Modifier::BOLD);
        }
        if pos == app.cursor {
            style = style.add_modifier(Modifier::REVERSED);
        }

        let label = if app.is_winking(idx) {
            String::new()
        } else {
            value.to_string()
        };
        Paragraph::new(Span::styled(label, style))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).border_style(dim_style))
            .render(cell, buf);
    }

    let legend = if app.typed.is_empty() {
        "arrows move / (space) tap / digits+(enter) tap by number / (n)ew / (l)evels / (esc)ape"
            .to_string()
    } else {
        format!("tap number: {}_", app.typed)
    };
    Paragraph::new(Span::styled(legend, italic_style))
        .alignment(Alignment::Center)
        .render(chunks[3], buf);
}

fn reason_color(reason: Option<FinishingReason>) -> Color {
    match reason {
        Some(FinishingReason::LevelPassed) => Color::Green,
        Some(FinishingReason::Stopped) | None => Color::Gray,
        Some(FinishingReason::WrongNumberTapped) | Some(FinishingReason::TimeIsOver) => Color::Red,
    }
}

fn result_lines(session: &GameSession) -> Vec<String> {
    let mut lines = vec![
        format!(
            "{} of {} found",
            session.numbers_found, session.level.goal
        ),
        format!("record {}", session.level.record),
    ];
    if let Some(taken) = session.time_taken() {
        lines.push(format!(
            "{:.1} seconds",
            taken.num_milliseconds() as f64 / 1000.0
        ));
    }
    if session.has_new_record {
        lines.push("new record!".to_string());
    }
    lines
}

fn render_results(app: &App, area: Rect, buf: &mut Buffer) {
    let bold_style = base_style(app).add_modifier(Modifier::BOLD);
    let italic_style = base_style(app).add_modifier(Modifier::ITALIC);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(1), // reason
            Constraint::Length(5), // stats
            Constraint::Length(1), // unlock message
            Constraint::Min(1),
            Constraint::Length(1), // legend
        ])
        .split(area);

    let Some(session) = app.last_result.as_ref() else {
        return;
    };

    let title = format!(
        "Level {}: {}",
        session.level.serial,
        session
            .finishing_reason
            .map(|r| r.to_string())
            .unwrap_or_default()
    );
    Paragraph::new(Span::styled(
        title,
        bold_style.fg(reason_color(session.finishing_reason)),
    ))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    let stats: Vec<Line> = result_lines(session).into_iter().map(Line::from).collect();
    Paragraph::new(stats)
        .style(base_style(app))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(chunks[2], buf);

    if let Some(message) = &app.message {
        Paragraph::new(Span::styled(
            message.clone(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
        .alignment(Alignment::Center)
        .render(chunks[3], buf);
    }

    Paragraph::new(Span::styled(
        "(n)ew / (l)evels / (esc)ape",
        italic_style,
    ))
    .alignment(Alignment::Center)
    .render(chunks[5], buf);
}

fn render_levels(app: &App, area: Rect, buf: &mut Buffer) {
    let italic_style = base_style(app).add_modifier(Modifier::ITALIC);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    let lines: Vec<Line> = app
        .engine
        .levels()
        .iter()
        .map(|level| {
            let marker = match (level.is_available, level.is_passed) {
                (false, _) => "locked",
                (true, true) => "passed",
                (true, false) => "open",
            };
            let text = format!(
                "{:>2}  goal {:>3}  {:>4.1}s  record {:>3}  {:<6}{}",
                level.serial,
                level.goal,
                level.interval,
                level.record,
                marker,
                if level.is_selected { "  <" } else { "" }
            );
            let mut style = if level.is_available {
                base_style(app)
            } else {
                base_style(app).add_modifier(Modifier::DIM)
            };
            if level.index == app.level_cursor {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Line::from(Span::styled(text, style))
        })
        .collect();

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Levels"))
        .render(chunks[0], buf);

    Paragraph::new(Span::styled(
        "(enter) play / (b)ack",
        italic_style,
    ))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);
}
