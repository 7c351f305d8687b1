use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of levels in a freshly built catalog.
pub const MAX_LEVEL: usize = 10;

/// Largest pool a playable level may have.
pub const MAX_NUMBERS_COUNT: u32 = 100;

/// Longest interval a playable level may allow, in seconds.
pub const MAX_INTERVAL_SECS: f64 = 3600.0;

/// Fixed per-level tuning, keyed by serial (1-based).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelParams {
    pub numbers_count: u32,
    pub interval: f64,
    pub goal: u32,
    pub color_mode: bool,
    pub wink_mode: bool,
    pub swap_mode: bool,
    pub shuffle_mode: bool,
}

const fn params(
    numbers_count: u32,
    interval: f64,
    goal: u32,
    modes: [bool; 4],
) -> LevelParams {
    LevelParams {
        numbers_count,
        interval,
        goal,
        color_mode: modes[0],
        wink_mode: modes[1],
        swap_mode: modes[2],
        shuffle_mode: modes[3],
    }
}

//                              count  secs  goal   color  wink   swap   shuffle
const LEVEL_PARAMS: [LevelParams; MAX_LEVEL] = [
    params(25, 15.0, 20, [false, false, false, false]),
    params(25, 10.0, 30, [false, false, false, false]),
    params(25, 8.0, 35, [true, false, false, false]),
    params(25, 7.0, 40, [true, false, false, true]),
    params(25, 6.0, 45, [false, true, false, false]),
    params(25, 5.0, 50, [true, true, false, false]),
    params(25, 5.0, 55, [false, false, true, false]),
    params(25, 4.0, 60, [true, false, true, true]),
    params(25, 3.5, 70, [false, true, true, false]),
    params(25, 3.0, 99, [true, true, true, true]),
];

/// Parameters for the level with the given serial, if the table has one.
pub fn level_params(serial: usize) -> Option<LevelParams> {
    serial
        .checked_sub(1)
        .and_then(|idx| LEVEL_PARAMS.get(idx))
        .copied()
}

/// A difficulty tier: fixed pool size, goal and interval plus the player's
/// progress on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub serial: usize,
    pub index: usize,
    pub is_available: bool,
    pub is_passed: bool,
    pub is_selected: bool,
    pub record: u32,
    pub numbers_count: u32,
    /// Seconds allowed between correct taps.
    pub interval: f64,
    pub goal: u32,
    pub color_mode: bool,
    pub wink_mode: bool,
    pub swap_mode: bool,
    pub shuffle_mode: bool,
}

impl Level {
    /// Build the level at `index` from the static table. Only the first level
    /// starts unlocked and selected.
    pub fn new(index: usize) -> Option<Self> {
        let serial = index + 1;
        let p = level_params(serial)?;
        let first = index == 0;
        Some(Self {
            serial,
            index,
            is_available: first,
            is_passed: false,
            is_selected: first,
            record: 0,
            numbers_count: p.numbers_count,
            interval: p.interval,
            goal: p.goal,
            color_mode: p.color_mode,
            wink_mode: p.wink_mode,
            swap_mode: p.swap_mode,
            shuffle_mode: p.shuffle_mode,
        })
    }

    /// Whether the tuning can drive a session: a non-empty bounded pool, a
    /// positive goal and a finite interval in `(0, MAX_INTERVAL_SECS]`.
    pub fn is_playable(&self) -> bool {
        (1..=MAX_NUMBERS_COUNT).contains(&self.numbers_count)
            && self.goal >= 1
            && self.interval.is_finite()
            && self.interval > 0.0
            && self.interval <= MAX_INTERVAL_SECS
    }

    pub fn interval_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval.clamp(0.0, MAX_INTERVAL_SECS))
            .unwrap_or_default()
    }
}

/// The default catalog used on first run.
pub fn default_levels() -> Vec<Level> {
    (0..MAX_LEVEL).filter_map(Level::new).collect()
}
