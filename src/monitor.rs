//! Debounced, reentrancy-guarded change monitor.
//!
//! Page mutations arrive in bursts, and the annotation pass itself mutates the
//! page. The monitor coalesces a burst into one rerun after a quiet period,
//! drops every notification that arrives while a pass is running, and keeps
//! dropping for a short cooldown after it so the pass's own writes cannot
//! schedule another pass.
//!
//! Time is passed in by the caller, which keeps the state machine free of
//! timers and lets tests replay bursts deterministically.

use std::cell::Cell;
use std::time::{Duration, Instant};

use tracing::debug;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(120);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    PendingRerun,
    Annotating,
}

/// What happened to a mutation notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// A rerun is now scheduled (or pushed back) to fire at the deadline.
    Scheduled(Instant),
    /// A pass is running; the notification is dropped.
    DroppedWhileAnnotating,
    /// The previous pass finished less than a cooldown ago.
    DroppedInCooldown,
}

/// Single-threaded monitor. Methods take `&self` so a pass may notify the
/// monitor of its own writes while it runs.
#[derive(Debug)]
pub struct ChangeMonitor {
    debounce: Duration,
    cooldown: Duration,
    state: Cell<MonitorState>,
    deadline: Cell<Option<Instant>>,
    cooldown_until: Cell<Option<Instant>>,
    runs: Cell<u64>,
}

impl Default for ChangeMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE, DEFAULT_COOLDOWN)
    }
}

impl ChangeMonitor {
    pub fn new(debounce: Duration, cooldown: Duration) -> Self {
        ChangeMonitor {
            debounce,
            cooldown,
            state: Cell::new(MonitorState::Idle),
            deadline: Cell::new(None),
            cooldown_until: Cell::new(None),
            runs: Cell::new(0),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state.get()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get()
    }

    /// Number of completed passes.
    pub fn runs(&self) -> u64 {
        self.runs.get()
    }

    pub fn on_mutation(&self, now: Instant) -> MutationOutcome {
        if self.state.get() == MonitorState::Annotating {
            return MutationOutcome::DroppedWhileAnnotating;
        }
        if let Some(until) = self.cooldown_until.get() {
            if now < until {
                return MutationOutcome::DroppedInCooldown;
            }
        }

        let deadline = now + self.debounce;
        self.deadline.set(Some(deadline));
        self.state.set(MonitorState::PendingRerun);
        MutationOutcome::Scheduled(deadline)
    }

    /// Schedule a pass as soon as possible, e.g. for the initial run.
    pub fn request_now(&self, now: Instant) {
        if self.state.get() != MonitorState::Annotating {
            self.deadline.set(Some(now));
            self.state.set(MonitorState::PendingRerun);
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.state.get() == MonitorState::PendingRerun
            && self.deadline.get().is_some_and(|deadline| now >= deadline)
    }

    /// Run `pass` if a rerun is due. Returns `None` when nothing ran.
    ///
    /// `finished_at` is asked for once the pass returns and opens the cooldown.
    pub fn run_if_due<R>(
        &self,
        now: Instant,
        pass: impl FnOnce() -> R,
        finished_at: impl FnOnce() -> Instant,
    ) -> Option<R> {
        if !self.is_due(now) {
            return None;
        }

        self.state.set(MonitorState::Annotating);
        self.deadline.set(None);
        let out = pass();

        let done = finished_at();
        self.cooldown_until.set(Some(done + self.cooldown));
        self.state.set(MonitorState::Idle);
        self.runs.set(self.runs.get() + 1);
        debug!(runs = self.runs.get(), "monitor pass finished");
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn burst_coalesces_into_one_pass() {
        let t0 = Instant::now();
        let monitor = ChangeMonitor::default();

        for offset in [0, 30, 60, 100] {
            assert!(matches!(monitor.on_mutation(t0 + ms(offset)), MutationOutcome::Scheduled(_)));
        }
        assert_eq!(monitor.state(), MonitorState::PendingRerun);
        assert_eq!(monitor.deadline(), Some(t0 + ms(220)));

        assert!(monitor.run_if_due(t0 + ms(200), || (), || t0 + ms(200)).is_none());
        assert!(monitor.run_if_due(t0 + ms(220), || (), || t0 + ms(225)).is_some());
        assert!(monitor.run_if_due(t0 + ms(400), || (), || t0 + ms(400)).is_none());
        assert_eq!(monitor.runs(), 1);
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[test]
    fn writes_during_a_pass_are_dropped() {
        let t0 = Instant::now();
        let monitor = ChangeMonitor::default();
        monitor.request_now(t0);

        let outcomes = monitor
            .run_if_due(
                t0,
                || {
                    assert_eq!(monitor.state(), MonitorState::Annotating);
                    (0..3).map(|i| monitor.on_mutation(t0 + ms(i))).collect::<Vec<_>>()
                },
                || t0 + ms(5),
            )
            .unwrap();

        assert!(outcomes.iter().all(|o| *o == MutationOutcome::DroppedWhileAnnotating));
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert_eq!(monitor.deadline(), None);
        assert!(!monitor.is_due(t0 + ms(1_000)));
    }

    #[test]
    fn cooldown_absorbs_trailing_mutations() {
        let t0 = Instant::now();
        let monitor = ChangeMonitor::new(ms(120), ms(50));
        monitor.request_now(t0);
        monitor.run_if_due(t0, || (), || t0 + ms(10));

        assert_eq!(monitor.on_mutation(t0 + ms(30)), MutationOutcome::DroppedInCooldown);
        assert_eq!(monitor.state(), MonitorState::Idle);

        assert_eq!(
            monitor.on_mutation(t0 + ms(60)),
            MutationOutcome::Scheduled(t0 + ms(180))
        );
        assert!(monitor.run_if_due(t0 + ms(180), || (), || t0 + ms(180)).is_some());
        assert_eq!(monitor.runs(), 2);
    }

    #[test]
    fn request_now_fires_immediately() {
        let t0 = Instant::now();
        let monitor = ChangeMonitor::default();
        assert!(!monitor.is_due(t0));
        monitor.request_now(t0);
        assert!(monitor.is_due(t0));
    }
}
