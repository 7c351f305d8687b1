mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use itertools::Itertools;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::Rect,
    Terminal,
};
use schulte::{
    app_dirs::AppDirs,
    catalog::LevelCatalog,
    config::Config,
    history::{Analytics, HistoryDb, NoAnalytics},
    runtime::{CrosstermInputSource, InputEvent, Runner},
    store::{FileStore, KeyValueStore},
    EngineState, FinishingReason, GameEngine, GameEvent, GameSession,
};
use std::{
    cell::Cell,
    error::Error,
    fs::{self, OpenOptions},
    io::{self, stdin},
    path::PathBuf,
    sync::{
        mpsc::{self, Receiver},
        Mutex,
    },
    time::Duration,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TICK_RATE_MS: u64 = 100;
/// Ticks per beat of the wink/swap modifiers.
const BEAT_TICKS: u64 = 8;

/// schulte table puzzle: tap the numbers in ascending order before the interval runs out
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A Schulte table puzzle for the terminal. Find the numbers in ascending order, each within the level's interval, and reach the goal to unlock the next level."
)]
pub struct Cli {
    /// level to start on (must already be unlocked)
    #[clap(short = 'l', long)]
    level: Option<usize>,

    /// forget all level progress and play history
    #[clap(long)]
    reset: bool,

    /// print per-level play history and exit
    #[clap(long)]
    stats: bool,

    /// don't highlight the next number
    #[clap(long)]
    no_hint: bool,

    /// use light colors
    #[clap(long)]
    light: bool,

    /// alternative location of the progress store
    #[clap(long)]
    store: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppState {
    Playing,
    Results,
    Levels,
}

pub struct App {
    pub engine: GameEngine<Box<dyn KeyValueStore>>,
    pub events: Receiver<GameEvent>,
    pub state: AppState,
    pub config: Config,
    /// Display position under the cursor.
    pub cursor: usize,
    /// Digits typed so far for a tap by value.
    pub typed: String,
    pub ticks: u64,
    pub level_cursor: usize,
    pub last_result: Option<GameSession>,
    pub message: Option<String>,
    /// Where the grid was drawn last, for mouse hit testing.
    pub grid_area: Cell<Rect>,
}

impl App {
    pub fn new(
        engine: GameEngine<Box<dyn KeyValueStore>>,
        events: Receiver<GameEvent>,
        config: Config,
    ) -> Self {
        let level_cursor = engine.current_level().index;
        Self {
            engine,
            events,
            state: AppState::Playing,
            config,
            cursor: 0,
            typed: String::new(),
            ticks: 0,
            level_cursor,
            last_result: None,
            message: None,
            grid_area: Cell::new(Rect::default()),
        }
    }

    pub fn beat(&self) -> u64 {
        self.ticks / BEAT_TICKS
    }

    /// Pool indices in the order they are laid out on screen.
    pub fn display_order(&self) -> Vec<usize> {
        let count = self.engine.numbers().len();
        let shift = if self.engine.current_level().swap_mode && self.engine.is_running() {
            self.beat() as usize % count.max(1)
        } else {
            0
        };
        (0..count).map(|pos| (pos + shift) % count).collect()
    }

    /// Whether the cell at pool index `idx` is hidden on this beat.
    pub fn is_winking(&self, idx: usize) -> bool {
        self.engine.current_level().wink_mode
            && self.engine.is_running()
            && (idx as u64 + self.beat()) % 3 == 0
    }

    pub fn on_tick(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
        self.engine.on_tick();
        self.drain_events();
    }

    /// Tap the cell at display position `pos`.
    pub fn tap_position(&mut self, pos: usize) {
        let order = self.display_order();
        if let Some(&idx) = order.get(pos) {
            let value = self.engine.numbers()[idx];
            self.tap_value(value);
        }
    }

    /// Tap the cell holding `value`, if one is on screen.
    pub fn tap_value(&mut self, value: u32) {
        if self.state != AppState::Playing || !self.engine.numbers().contains(&value) {
            return;
        }
        match self.engine.state() {
            EngineState::Finished => return,
            EngineState::Idle => self.engine.start(),
            EngineState::Running => {}
        }
        self.engine.number_selected(value);
        self.drain_events();
    }

    pub fn submit_typed(&mut self) {
        let typed = std::mem::take(&mut self.typed);
        if let Ok(value) = typed.parse::<u32>() {
            self.tap_value(value);
        }
    }

    pub fn move_cursor(&mut self, dx: isize, dy: isize) {
        let count = self.engine.numbers().len();
        if count == 0 {
            return;
        }
        let cols = ui::grid_columns(count);
        let col = (self.cursor % cols) as isize;
        let row = (self.cursor / cols) as isize;
        let rows = count.div_ceil(cols) as isize;
        let col = (col + dx).rem_euclid(cols as isize);
        let row = (row + dy).rem_euclid(rows);
        self.cursor = ((row * cols as isize + col) as usize).min(count - 1);
    }

    pub fn click(&mut self, column: u16, row: u16) {
        if self.state != AppState::Playing {
            return;
        }
        let count = self.engine.numbers().len();
        if let Some(pos) = ui::cell_at(self.grid_area.get(), count, column, row) {
            self.cursor = pos;
            self.tap_position(pos);
        }
    }

    pub fn new_game(&mut self) {
        self.engine.new_game();
        self.state = AppState::Playing;
        self.typed.clear();
        self.message = None;
    }

    pub fn select_level(&mut self, index: usize) {
        let available = self
            .engine
            .levels()
            .get(index)
            .map(|l| l.is_available)
            .unwrap_or(false);
        if available {
            self.engine.set_current_level(index);
            self.drain_events();
            self.state = AppState::Playing;
            self.message = None;
        }
    }

    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                GameEvent::SessionFinished(session) => {
                    self.message = None;
                    self.last_result = Some(session);
                    self.typed.clear();
                    self.state = AppState::Results;
                }
                GameEvent::LevelChanged(level) => {
                    self.level_cursor = level.index;
                    self.cursor = 0;
                    if self.state == AppState::Results {
                        self.message = Some(format!("Level {} unlocked", level.serial));
                    }
                }
            }
        }
    }

    /// Stop play and persist progress and preferences before exiting.
    pub fn suspend(&mut self) {
        if let Err(err) = self.engine.suspend() {
            warn!(%err, "Progress not saved");
        }
        self.drain_events();
        let config = self.config.clone();
        if let Err(err) = config.save(self.engine.store_mut()) {
            warn!(%err, "Preferences not saved");
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging()?;

    let store: Box<dyn KeyValueStore> = match &cli.store {
        Some(path) => Box::new(FileStore::with_path(path)),
        None => Box::new(FileStore::new()),
    };

    let history = match HistoryDb::new() {
        Ok(db) => Some(db),
        Err(err) => {
            warn!(%err, "Play history unavailable");
            None
        }
    };

    if cli.stats {
        print_stats(history.as_ref());
        return Ok(());
    }

    let mut catalog = LevelCatalog::new(store);
    if cli.reset {
        catalog.reset()?;
        if let Some(db) = &history {
            db.clear()?;
        }
        info!("Progress reset");
    }

    let mut config = Config::load(catalog.store());
    if cli.no_hint {
        config.hint_needed = false;
    }
    if cli.light {
        config.dark_mode = false;
    }

    if let Some(serial) = cli.level {
        let unlocked = serial
            .checked_sub(1)
            .and_then(|index| catalog.level(index))
            .map(|l| l.is_available)
            .unwrap_or(false);
        if !unlocked {
            let mut cmd = Cli::command();
            cmd.error(
                ErrorKind::InvalidValue,
                format!("level {serial} is not unlocked yet"),
            )
            .exit();
        }
        catalog.set_current_level(serial - 1);
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let analytics: Box<dyn Analytics> = match history {
        Some(db) => Box::new(db),
        None => Box::new(NoAnalytics),
    };
    let (tx, rx) = mpsc::channel();
    let engine = GameEngine::new(catalog)
        .with_events(tx)
        .with_analytics(analytics);
    let mut app = App::new(engine, rx, config);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app);
    app.suspend();

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermInputSource::new(),
        Duration::from_millis(TICK_RATE_MS),
    );

    loop {
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;

        match runner.step() {
            InputEvent::Tick => app.on_tick(),
            InputEvent::Resize => {}
            InputEvent::Click { column, row } => app.click(column, row),
            InputEvent::Key(key) => {
                if !handle_key(app, key) {
                    return Ok(());
                }
            }
        }
    }
}

/// Returns false when the app should exit.
fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return false;
    }

    match app.state {
        AppState::Playing => match key.code {
            KeyCode::Esc => {
                if app.engine.is_running() {
                    app.engine.finish(FinishingReason::Stopped);
                    app.drain_events();
                } else {
                    return false;
                }
            }
            KeyCode::Left => app.move_cursor(-1, 0),
            KeyCode::Right => app.move_cursor(1, 0),
            KeyCode::Up => app.move_cursor(0, -1),
            KeyCode::Down => app.move_cursor(0, 1),
            KeyCode::Char(c) if c.is_ascii_digit() => {
                if app.typed.len() < 4 {
                    app.typed.push(c);
                }
            }
            KeyCode::Backspace => {
                app.typed.pop();
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                if app.typed.is_empty() {
                    app.tap_position(app.cursor);
                } else {
                    app.submit_typed();
                }
            }
            KeyCode::Char('s') => app.engine.start(),
            KeyCode::Char('n') if !app.engine.is_running() => app.new_game(),
            KeyCode::Char('l') if !app.engine.is_running() => {
                app.level_cursor = app.engine.current_level().index;
                app.state = AppState::Levels;
            }
            _ => {}
        },
        AppState::Results => match key.code {
            KeyCode::Esc => return false,
            KeyCode::Char('r') | KeyCode::Char('n') | KeyCode::Enter => app.new_game(),
            KeyCode::Char('l') => {
                app.level_cursor = app.engine.current_level().index;
                app.state = AppState::Levels;
            }
            _ => {}
        },
        AppState::Levels => match key.code {
            KeyCode::Esc | KeyCode::Char('b') | KeyCode::Backspace => {
                app.state = AppState::Playing;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                app.level_cursor = app.level_cursor.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let last = app.engine.levels().len().saturating_sub(1);
                app.level_cursor = (app.level_cursor + 1).min(last);
            }
            KeyCode::Enter | KeyCode::Char(' ') => app.select_level(app.level_cursor),
            _ => {}
        },
    }
    true
}

fn print_stats(history: Option<&HistoryDb>) {
    let Some(db) = history else {
        println!("no play history available");
        return;
    };
    match db.level_summaries() {
        Ok(summaries) if summaries.is_empty() => println!("no sessions played yet"),
        Ok(summaries) => {
            println!("level  attempts  passes  best  avg");
            let rows = summaries
                .iter()
                .map(|s| {
                    format!(
                        "{:>5}  {:>8}  {:>6}  {:>4}  {:>4.1}",
                        s.level_serial, s.attempts, s.passes, s.best_found, s.avg_found
                    )
                })
                .join("\n");
            println!("{rows}");
        }
        Err(err) => eprintln!("failed to read play history: {err}"),
    }
}

fn init_logging() -> Result<(), Box<dyn Error>> {
    let log_path = AppDirs::log_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("schulte=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(file))
        .init();

    Ok(())
}
