use chrono::{DateTime, Local, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::level::Level;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum FinishingReason {
    #[strum(serialize = "wrong number")]
    WrongNumberTapped,
    #[strum(serialize = "time is over")]
    TimeIsOver,
    #[strum(serialize = "level passed")]
    LevelPassed,
    #[strum(serialize = "stopped")]
    Stopped,
}

/// One attempt at a level, from `start` to its finishing reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    /// Snapshot of the level being played.
    pub level: Level,
    /// Snapshot of the level that passing this one unlocks.
    pub next_level: Option<Level>,
    /// Last number found, 0 before the first correct tap.
    pub current_number: u32,
    pub next_number: u32,
    pub numbers_found: u32,
    /// Value written into the cell that was just vacated.
    pub new_number: u32,
    pub finishing_reason: Option<FinishingReason>,
    pub start_time: Option<DateTime<Local>>,
    pub finish_time: Option<DateTime<Local>>,
    pub level_passed: bool,
    pub has_new_record: bool,
}

impl GameSession {
    pub fn new(level: Level, next_level: Option<Level>) -> Self {
        Self {
            level,
            next_level,
            current_number: 0,
            next_number: 1,
            numbers_found: 0,
            new_number: 0,
            finishing_reason: None,
            start_time: None,
            finish_time: None,
            level_passed: false,
            has_new_record: false,
        }
    }

    pub fn start(&mut self) {
        self.start_time = Some(Local::now());
    }

    /// Freeze the session. Later calls keep the first reason.
    pub fn finish(&mut self, reason: FinishingReason) {
        if self.finishing_reason.is_some() {
            return;
        }
        self.finish_time = Some(Local::now());
        self.finishing_reason = Some(reason);
    }

    /// Advance past `number`, which the caller has already validated.
    pub fn record_found(&mut self, number: u32) {
        self.numbers_found += 1;
        self.next_number += 1;
        self.current_number = number;
        self.new_number = number + self.level.numbers_count;
    }

    pub fn has_started(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.finishing_reason.is_some()
    }

    pub fn time_taken(&self) -> Option<TimeDelta> {
        Some(self.finish_time? - self.start_time?)
    }

    pub fn goal_achieved(&self) -> bool {
        self.numbers_found >= self.level.goal
    }
}
