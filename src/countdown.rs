use std::time::{Duration, Instant};

/// Identifies one arming of a [`Countdown`]. Only the token of the latest
/// arming is ever honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownToken(u64);

#[derive(Debug, Clone, Copy)]
struct Armed {
    token: CountdownToken,
    deadline: Instant,
}

/// Single-shot interval timer driven by polling.
///
/// Every `arm` bumps a generation counter, so an expiry observed for an
/// earlier arming (or after `cancel`) can be recognised and dropped.
#[derive(Debug, Default)]
pub struct Countdown {
    generation: u64,
    armed: Option<Armed>,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, interval: Duration) -> CountdownToken {
        self.arm_at(Instant::now(), interval)
    }

    pub fn arm_at(&mut self, now: Instant, interval: Duration) -> CountdownToken {
        self.generation += 1;
        let token = CountdownToken(self.generation);
        self.armed = Some(Armed {
            token,
            deadline: now + interval,
        });
        token
    }

    pub fn cancel(&mut self) {
        self.generation += 1;
        self.armed = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Whether `token` belongs to the arming that is currently pending.
    pub fn is_current(&self, token: CountdownToken) -> bool {
        self.armed.is_some_and(|armed| armed.token == token)
    }

    /// Fire if the deadline has passed. Firing disarms the countdown.
    pub fn poll(&mut self, now: Instant) -> Option<CountdownToken> {
        let armed = self.armed?;
        if now < armed.deadline {
            return None;
        }
        self.armed = None;
        Some(armed.token)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.armed
            .map(|armed| armed.deadline.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_deadline() {
        let mut countdown = Countdown::new();
        let start = Instant::now();
        let token = countdown.arm_at(start, Duration::from_secs(2));

        assert_eq!(countdown.poll(start + Duration::from_secs(1)), None);
        assert_eq!(countdown.poll(start + Duration::from_secs(2)), Some(token));
        assert_eq!(countdown.poll(start + Duration::from_secs(3)), None);
        assert!(!countdown.is_armed());
    }

    #[test]
    fn rearming_invalidates_previous_token() {
        let mut countdown = Countdown::new();
        let start = Instant::now();
        let first = countdown.arm_at(start, Duration::from_secs(1));
        let second = countdown.arm_at(start, Duration::from_secs(5));

        assert_ne!(first, second);
        assert!(!countdown.is_current(first));
        assert!(countdown.is_current(second));
        assert_eq!(countdown.poll(start + Duration::from_secs(2)), None);
    }

    #[test]
    fn cancel_drops_pending_expiry() {
        let mut countdown = Countdown::new();
        let start = Instant::now();
        let token = countdown.arm_at(start, Duration::from_millis(10));
        countdown.cancel();

        assert!(!countdown.is_current(token));
        assert_eq!(countdown.poll(start + Duration::from_secs(1)), None);
        assert_eq!(countdown.remaining(start), None);
    }

    #[test]
    fn remaining_counts_down() {
        let mut countdown = Countdown::new();
        let start = Instant::now();
        countdown.arm_at(start, Duration::from_secs(10));
        assert_eq!(
            countdown.remaining(start + Duration::from_secs(4)),
            Some(Duration::from_secs(6))
        );
        assert_eq!(
            countdown.remaining(start + Duration::from_secs(40)),
            Some(Duration::ZERO)
        );
    }
}
