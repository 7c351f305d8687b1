use std::cell::Cell;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crossterm::event::{
    self, Event as CtEvent, KeyEvent, KeyEventKind, MouseButton, MouseEventKind,
};

/// Input the game loop reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyEvent),
    /// Left button pressed over a terminal cell.
    Click { column: u16, row: u16 },
    Resize,
    /// Time to poll the countdown and advance the wink/swap beat.
    Tick,
}

/// Map a raw terminal event to game input. Key releases and mouse moves,
/// drags and scrolls are dropped.
pub fn translate(event: CtEvent) -> Option<InputEvent> {
    match event {
        CtEvent::Key(key) if key.kind != KeyEventKind::Release => Some(InputEvent::Key(key)),
        CtEvent::Mouse(mouse) if mouse.kind == MouseEventKind::Down(MouseButton::Left) => {
            Some(InputEvent::Click {
                column: mouse.column,
                row: mouse.row,
            })
        }
        CtEvent::Resize(_, _) => Some(InputEvent::Resize),
        _ => None,
    }
}

/// Anything that can hand the loop the next input within a deadline.
pub trait InputSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<InputEvent, RecvTimeoutError>;
}

/// Terminal input read on a background thread.
pub struct CrosstermInputSource {
    rx: Receiver<InputEvent>,
}

impl CrosstermInputSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            while let Ok(raw) = event::read() {
                if let Some(input) = translate(raw) {
                    if tx.send(input).is_err() {
                        break;
                    }
                }
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermInputSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for CrosstermInputSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<InputEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Channel-fed input for headless runs.
impl InputSource for Receiver<InputEvent> {
    fn recv_timeout(&self, timeout: Duration) -> Result<InputEvent, RecvTimeoutError> {
        Receiver::recv_timeout(self, timeout)
    }
}

/// Interleaves input with ticks on a fixed schedule.
///
/// Ticks are due every `tick_rate` regardless of how much input arrives, so
/// a burst of taps cannot hold off the countdown. Missed ticks collapse into
/// one.
pub struct Runner<S: InputSource> {
    source: S,
    tick_rate: Duration,
    next_tick: Cell<Instant>,
}

impl<S: InputSource> Runner<S> {
    pub fn new(source: S, tick_rate: Duration) -> Self {
        Self {
            source,
            tick_rate,
            next_tick: Cell::new(Instant::now() + tick_rate),
        }
    }

    /// Next input, or `Tick` once the tick is due.
    pub fn step(&self) -> InputEvent {
        let due = self.next_tick.get();
        let now = Instant::now();
        if now >= due {
            return self.tick(due, now);
        }
        match self.source.recv_timeout(due - now) {
            Ok(input) => input,
            Err(RecvTimeoutError::Timeout) => self.tick(due, Instant::now()),
            Err(RecvTimeoutError::Disconnected) => {
                // no more input; just keep the beat
                std::thread::sleep(due.saturating_duration_since(Instant::now()));
                self.tick(due, Instant::now())
            }
        }
    }

    fn tick(&self, due: Instant, now: Instant) -> InputEvent {
        let next = due + self.tick_rate;
        self.next_tick
            .set(if next > now { next } else { now + self.tick_rate });
        InputEvent::Tick
    }
}
