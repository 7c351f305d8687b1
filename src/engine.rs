use rand::seq::SliceRandom;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::catalog::LevelCatalog;
use crate::countdown::{Countdown, CountdownToken};
use crate::history::{Analytics, NoAnalytics};
use crate::level::Level;
use crate::session::{FinishingReason, GameSession};
use crate::store::{KeyValueStore, StoreError};

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    LevelChanged(Level),
    SessionFinished(GameSession),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Finished,
}

/// Runs one play session at a time against the catalog's current level.
pub struct GameEngine<S: KeyValueStore> {
    catalog: LevelCatalog<S>,
    numbers: Vec<u32>,
    session: GameSession,
    last_finished: Option<GameSession>,
    is_running: bool,
    countdown: Countdown,
    armed: Option<CountdownToken>,
    events: Option<Sender<GameEvent>>,
    analytics: Box<dyn Analytics>,
}

impl<S: KeyValueStore> GameEngine<S> {
    pub fn new(catalog: LevelCatalog<S>) -> Self {
        let session = GameSession::new(
            catalog.current_level().clone(),
            catalog.next_level().cloned(),
        );
        let mut engine = Self {
            catalog,
            numbers: Vec::new(),
            session,
            last_finished: None,
            is_running: false,
            countdown: Countdown::new(),
            armed: None,
            events: None,
            analytics: Box::new(NoAnalytics),
        };
        engine.new_game();
        engine
    }

    /// Deliver [`GameEvent`]s to `tx`. A dropped receiver is tolerated.
    pub fn with_events(mut self, tx: Sender<GameEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_analytics(mut self, analytics: Box<dyn Analytics>) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn levels(&self) -> &[Level] {
        self.catalog.levels()
    }

    pub fn current_level(&self) -> &Level {
        self.catalog.current_level()
    }

    pub fn next_level(&self) -> Option<&Level> {
        self.catalog.next_level()
    }

    pub fn last_level(&self) -> Option<&Level> {
        self.catalog.last_level()
    }

    pub fn numbers(&self) -> &[u32] {
        &self.numbers
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    /// The most recently finished session, kept after a level pass has
    /// already replaced `session` with a fresh one.
    pub fn last_finished(&self) -> Option<&GameSession> {
        self.last_finished.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn state(&self) -> EngineState {
        if self.is_running {
            EngineState::Running
        } else if self.session.is_finished() {
            EngineState::Finished
        } else {
            EngineState::Idle
        }
    }

    pub fn catalog(&self) -> &LevelCatalog<S> {
        &self.catalog
    }

    pub fn store_mut(&mut self) -> &mut S {
        self.catalog.store_mut()
    }

    /// Time left before the current tap times out.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.countdown.remaining(Instant::now())
    }

    /// Prepare another attempt at the current level without starting it.
    pub fn new_game(&mut self) {
        self.cancel_countdown();
        self.is_running = false;
        let count = self.catalog.current_level().numbers_count;
        self.numbers = (1..=count).collect();
        self.shuffle_numbers();
        self.session = GameSession::new(
            self.catalog.current_level().clone(),
            self.catalog.next_level().cloned(),
        );
        debug!(serial = self.session.level.serial, count, "New game prepared");
    }

    pub fn start(&mut self) {
        if self.is_running {
            return;
        }
        if self.session.is_finished() {
            self.new_game();
        }
        self.session.start();
        self.is_running = true;
        let interval = self.catalog.current_level().interval_duration();
        self.arm_countdown(interval);
        info!(serial = self.session.level.serial, "Session started");
    }

    pub fn shuffle_numbers(&mut self) {
        self.numbers.shuffle(&mut rand::thread_rng());
    }

    /// Handle a tap on the cell holding `number`.
    ///
    /// Returns true only for a correct tap that keeps the session running.
    /// A wrong number, or the goal of a level not yet passed, ends the
    /// session and returns false.
    ///
    /// # Panics
    ///
    /// When a correctly tapped number is not in the pool, which means the
    /// pool and the session have gone out of sync.
    pub fn number_selected(&mut self, number: u32) -> bool {
        if !self.is_running {
            debug!(number, "Tap ignored, no session running");
            return false;
        }
        if number != self.session.next_number {
            debug!(number, expected = self.session.next_number, "Wrong number");
            self.finish(FinishingReason::WrongNumberTapped);
            return false;
        }

        let level = self.catalog.current_level().clone();
        self.session.record_found(number);

        if number == level.goal && !level.is_passed {
            self.catalog.set_passed(level.index);
            self.session.level_passed = true;
            self.finish(FinishingReason::LevelPassed);
            return false;
        }
        if number > level.record {
            self.session.has_new_record = true;
        }
        if level.shuffle_mode {
            self.shuffle_numbers();
        }

        let slot = self
            .numbers
            .iter()
            .position(|&value| value == number)
            .unwrap_or_else(|| panic!("number {number} missing from pool {:?}", self.numbers));
        self.numbers[slot] = number + self.numbers.len() as u32;

        self.arm_countdown(level.interval_duration());
        debug!(number, slot, "Correct number");
        true
    }

    /// End the running session. Does nothing when no session is running.
    pub fn finish(&mut self, reason: FinishingReason) {
        if !self.is_running {
            return;
        }
        self.is_running = false;
        self.cancel_countdown();
        self.session.finish(reason);

        let current = self.catalog.current_level().clone();
        if reason == FinishingReason::Stopped {
            self.session.has_new_record = false;
        } else {
            self.session.has_new_record =
                self.catalog.set_record(current.index, self.session.numbers_found);
        }

        let advance_to = match (reason, self.catalog.next_level()) {
            (FinishingReason::LevelPassed, Some(next)) => Some(next.index),
            _ => None,
        };
        if reason == FinishingReason::LevelPassed {
            info!(serial = current.serial, "Level passed");
            self.analytics.level_passed(current.serial);
        }
        if let Some(next) = advance_to {
            self.catalog.set_available(next);
        }

        self.session.level = self.catalog.current_level().clone();
        self.session.next_level = self.catalog.next_level().cloned();

        info!(
            serial = current.serial,
            %reason,
            found = self.session.numbers_found,
            new_record = self.session.has_new_record,
            "Session finished"
        );
        self.analytics.session_finished(&self.session);
        self.last_finished = Some(self.session.clone());
        self.emit(GameEvent::SessionFinished(self.session.clone()));

        if let Some(next) = advance_to {
            self.set_current_level(next);
        }
    }

    /// Select another level and prepare a fresh game on it. A running
    /// session is stopped first; unknown indices are ignored.
    pub fn set_current_level(&mut self, index: usize) -> bool {
        if index >= self.catalog.levels().len() {
            return false;
        }
        self.finish(FinishingReason::Stopped);
        self.catalog.set_current_level(index);
        self.new_game();
        let level = self.catalog.current_level().clone();
        info!(serial = level.serial, "Level changed");
        self.emit(GameEvent::LevelChanged(level));
        true
    }

    /// Poll the interval countdown; call on every tick of the event loop.
    pub fn on_tick(&mut self) {
        self.on_tick_at(Instant::now());
    }

    pub fn on_tick_at(&mut self, now: Instant) {
        if let Some(token) = self.countdown.poll(now) {
            self.interval_expired(token);
        }
    }

    /// Countdown expiry. Tokens from an earlier arming, or arriving after
    /// the session already finished, are ignored.
    pub fn interval_expired(&mut self, token: CountdownToken) -> bool {
        if !self.is_running || self.armed != Some(token) {
            debug!(?token, "Stale countdown expiry ignored");
            return false;
        }
        self.armed = None;
        self.finish(FinishingReason::TimeIsOver);
        true
    }

    /// The host is about to go away: stop any session and persist progress.
    pub fn suspend(&mut self) -> Result<(), StoreError> {
        self.finish(FinishingReason::Stopped);
        self.catalog.save().inspect_err(|err| {
            warn!(%err, "Failed to save levels");
        })
    }

    /// Wipe level progress and start over from the first level.
    pub fn reset_progress(&mut self) -> Result<(), StoreError> {
        self.finish(FinishingReason::Stopped);
        self.catalog.reset()?;
        self.last_finished = None;
        self.new_game();
        self.emit(GameEvent::LevelChanged(self.catalog.current_level().clone()));
        Ok(())
    }

    fn arm_countdown(&mut self, interval: Duration) {
        let token = self.countdown.arm(interval);
        self.armed = Some(token);
        debug!(?token, ?interval, "Countdown armed");
    }

    fn cancel_countdown(&mut self) {
        self.countdown.cancel();
        self.armed = None;
    }

    fn emit(&self, event: GameEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::MAX_LEVEL;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use std::sync::mpsc;

    fn engine() -> GameEngine<MemoryStore> {
        GameEngine::new(LevelCatalog::new(MemoryStore::new()))
    }

    fn sorted(numbers: &[u32]) -> Vec<u32> {
        let mut v = numbers.to_vec();
        v.sort_unstable();
        v
    }

    fn later(engine: &GameEngine<MemoryStore>) -> Instant {
        Instant::now() + engine.current_level().interval_duration() + Duration::from_secs(1)
    }

    #[test]
    fn new_engine_is_idle_with_full_pool() {
        let e = engine();
        assert_eq!(e.state(), EngineState::Idle);
        assert!(!e.is_running());
        assert_eq!(sorted(e.numbers()), (1..=25).collect::<Vec<_>>());
        assert_eq!(e.session().next_number, 1);
    }

    #[test]
    fn new_game_reshuffles() {
        let mut e = engine();
        let first = e.numbers().to_vec();
        let mut differs = false;
        for _ in 0..5 {
            e.new_game();
            assert_eq!(sorted(e.numbers()), (1..=25).collect::<Vec<_>>());
            differs |= e.numbers() != first.as_slice();
        }
        assert!(differs);
    }

    #[test]
    fn start_arms_countdown() {
        let mut e = engine();
        e.start();
        assert_eq!(e.state(), EngineState::Running);
        assert!(e.session().has_started());
        assert!(e.time_remaining().unwrap() <= Duration::from_secs(15));
    }

    #[test]
    fn correct_tap_replaces_cell() {
        let mut e = engine();
        e.start();
        assert!(e.number_selected(1));
        assert_eq!(e.session().next_number, 2);
        assert_eq!(e.session().numbers_found, 1);
        assert_eq!(e.session().new_number, 26);
        assert!(e.numbers().contains(&26));
        assert!(!e.numbers().contains(&1));
        assert!(e.session().has_new_record);
    }

    #[test]
    fn pool_values_stay_unique() {
        let mut e = engine();
        e.start();
        for n in 1..=15 {
            assert!(e.number_selected(n));
        }
        let mut values = sorted(e.numbers());
        values.dedup();
        assert_eq!(values.len(), 25);
        assert_eq!(values, (16..=40).collect::<Vec<_>>());
    }

    #[test]
    fn tap_while_idle_is_ignored() {
        let mut e = engine();
        assert!(!e.number_selected(1));
        assert_eq!(e.state(), EngineState::Idle);
        assert!(e.session().finishing_reason.is_none());
    }

    #[test]
    fn wrong_tap_finishes() {
        let mut e = engine();
        e.start();
        e.number_selected(1);
        e.number_selected(2);
        assert!(!e.number_selected(9));
        assert_eq!(e.state(), EngineState::Finished);
        assert_eq!(
            e.session().finishing_reason,
            Some(FinishingReason::WrongNumberTapped)
        );
        assert_eq!(e.session().numbers_found, 2);
        assert_eq!(e.current_level().record, 2);
        assert!(!e.number_selected(3));
    }

    #[test]
    fn timeout_finishes_session() {
        let mut e = engine();
        e.start();
        e.number_selected(1);
        let at = later(&e);
        e.on_tick_at(at);
        assert_eq!(e.session().finishing_reason, Some(FinishingReason::TimeIsOver));
        assert_eq!(e.current_level().record, 1);
    }

    #[test]
    fn tick_before_deadline_keeps_running() {
        let mut e = engine();
        e.start();
        e.on_tick_at(Instant::now());
        assert!(e.is_running());
    }

    #[test]
    fn stale_expiry_is_noop() {
        let mut e = engine();
        e.start();
        let stale = e.armed.unwrap();
        e.number_selected(1);
        assert!(!e.interval_expired(stale));
        assert!(e.is_running());

        let current = e.armed.unwrap();
        e.finish(FinishingReason::Stopped);
        assert!(!e.interval_expired(current));
        assert_eq!(e.session().finishing_reason, Some(FinishingReason::Stopped));
    }

    #[test]
    fn stopped_does_not_touch_record() {
        let mut e = engine();
        e.start();
        for n in 1..=5 {
            e.number_selected(n);
        }
        e.finish(FinishingReason::Stopped);
        assert_eq!(e.current_level().record, 0);
        assert!(!e.session().has_new_record);
    }

    #[test]
    fn record_only_grows() {
        let mut e = engine();
        e.start();
        for n in 1..=6 {
            e.number_selected(n);
        }
        e.number_selected(100);
        assert_eq!(e.current_level().record, 6);
        assert!(e.session().has_new_record);
        assert_eq!(e.session().level.record, 6);

        e.start();
        e.number_selected(1);
        e.number_selected(5);
        assert_eq!(e.current_level().record, 6);
        assert!(!e.session().has_new_record);
    }

    #[test]
    fn passing_goal_advances_level() {
        let (tx, rx) = mpsc::channel();
        let mut e = engine().with_events(tx);
        e.start();
        for n in 1..20 {
            assert!(e.number_selected(n), "tap {n}");
        }
        assert!(!e.number_selected(20));

        let finished = e.last_finished().unwrap();
        assert_eq!(finished.finishing_reason, Some(FinishingReason::LevelPassed));
        assert!(finished.level_passed);
        assert!(finished.level.is_passed);
        assert_eq!(finished.level.record, 20);

        assert_eq!(e.current_level().serial, 2);
        assert!(e.current_level().is_available);
        assert_eq!(e.state(), EngineState::Idle);
        assert_eq!(e.session().level.serial, 2);

        let events: Vec<GameEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_matches!(&events[0], GameEvent::SessionFinished(s) if s.level_passed);
        assert_matches!(&events[1], GameEvent::LevelChanged(l) if l.serial == 2);
    }

    #[test]
    fn passed_level_keeps_going_past_goal() {
        let mut e = engine();
        e.start();
        for n in 1..=20 {
            e.number_selected(n);
        }
        e.set_current_level(0);
        e.start();
        for n in 1..=21 {
            assert!(e.number_selected(n), "tap {n}");
        }
        assert!(e.session().goal_achieved());
    }

    #[test]
    fn last_level_pass_stays_put() {
        let mut e = engine();
        e.set_current_level(MAX_LEVEL - 1);
        e.start();
        let goal = e.current_level().goal;
        for n in 1..goal {
            e.number_selected(n);
        }
        e.number_selected(goal);
        assert_eq!(e.current_level().serial, MAX_LEVEL);
        assert_eq!(e.state(), EngineState::Finished);
        assert!(e.current_level().is_passed);
    }

    #[test]
    fn shuffle_mode_keeps_pool_valid() {
        let mut e = engine();
        e.set_current_level(3);
        assert!(e.current_level().shuffle_mode);
        e.start();
        for n in 1..=30 {
            assert!(e.number_selected(n));
        }
        assert_eq!(sorted(e.numbers()), (31..=55).collect::<Vec<_>>());
    }

    #[test]
    fn level_change_stops_running_session() {
        let (tx, rx) = mpsc::channel();
        let mut e = engine().with_events(tx);
        e.start();
        e.number_selected(1);
        assert!(e.set_current_level(2));
        assert!(!e.set_current_level(MAX_LEVEL));
        assert_eq!(e.current_level().index, 2);

        let events: Vec<GameEvent> = rx.try_iter().collect();
        assert_matches!(
            &events[0],
            GameEvent::SessionFinished(s) if s.finishing_reason == Some(FinishingReason::Stopped)
        );
        assert_matches!(&events[1], GameEvent::LevelChanged(l) if l.index == 2);
    }

    #[test]
    fn dropped_listener_is_tolerated() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut e = engine().with_events(tx);
        e.start();
        e.number_selected(3);
        assert_eq!(e.state(), EngineState::Finished);
    }

    #[test]
    fn suspend_saves_progress() {
        let mut e = engine();
        e.start();
        for n in 1..=20 {
            e.number_selected(n);
        }
        e.start();
        e.suspend().unwrap();
        assert!(!e.is_running());

        let restored = LevelCatalog::new(e.catalog().store().clone());
        assert_eq!(restored.current_level().serial, 2);
        assert!(restored.level(0).unwrap().is_passed);
    }

    #[test]
    fn reset_progress_returns_to_first_level() {
        let mut e = engine();
        e.set_current_level(4);
        e.reset_progress().unwrap();
        assert_eq!(e.current_level().serial, 1);
        assert_eq!(e.state(), EngineState::Idle);
    }

    #[test]
    #[should_panic(expected = "missing from pool")]
    fn desynced_pool_is_fatal() {
        let mut e = engine();
        e.start();
        e.numbers.retain(|&n| n != 1);
        e.number_selected(1);
    }
}
