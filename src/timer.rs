use tokio::time::Instant;

/// The timers the driver can have armed at any moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Next keep-alive send while connected
    Heartbeat,
    /// Backoff delay before the next reconnect attempt
    Reconnect,
    /// Earliest pending-request deadline
    Sweep,
}

/// Centralized set of cancellable one-shot timers.
///
/// Every timing-dependent component arms its slot here and the driver
/// sleeps until the earliest armed deadline. Cancelling a slot is a pure
/// state change; a cancelled timer can never fire. `take_due` disarms and
/// returns the slots whose deadline has passed, so each armed timer fires
/// at most once.
#[derive(Debug, Default)]
pub(crate) struct TimerSet {
    heartbeat: Option<Instant>,
    reconnect: Option<Instant>,
    sweep: Option<Instant>,
}

impl TimerSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) a timer slot.
    pub(crate) fn arm(&mut self, kind: TimerKind, at: Instant) {
        *self.slot(kind) = Some(at);
    }

    /// Arm a slot, or cancel it when no deadline is given.
    pub(crate) fn set(&mut self, kind: TimerKind, at: Option<Instant>) {
        *self.slot(kind) = at;
    }

    /// Cancel a timer slot. No-op if the slot is not armed.
    pub(crate) fn cancel(&mut self, kind: TimerKind) {
        *self.slot(kind) = None;
    }

    /// Cancel every armed timer.
    pub(crate) fn clear(&mut self) {
        self.heartbeat = None;
        self.reconnect = None;
        self.sweep = None;
    }

    /// Earliest armed deadline, if any.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        [self.heartbeat, self.reconnect, self.sweep]
            .into_iter()
            .flatten()
            .min()
    }

    /// Disarm and return every slot whose deadline has passed.
    pub(crate) fn take_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due = Vec::new();
        for kind in [TimerKind::Heartbeat, TimerKind::Reconnect, TimerKind::Sweep] {
            let slot = self.slot(kind);
            if slot.is_some_and(|at| at <= now) {
                *slot = None;
                due.push(kind);
            }
        }
        due
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<Instant> {
        match kind {
            TimerKind::Heartbeat => &mut self.heartbeat,
            TimerKind::Reconnect => &mut self.reconnect,
            TimerKind::Sweep => &mut self.sweep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_next_deadline_picks_earliest() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        assert!(timers.next_deadline().is_none());

        timers.arm(TimerKind::Heartbeat, now + Duration::from_secs(30));
        timers.arm(TimerKind::Sweep, now + Duration::from_secs(10));
        assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_due_disarms() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::Heartbeat, now);
        timers.arm(TimerKind::Reconnect, now + Duration::from_secs(5));

        let due = timers.take_due(now);
        assert_eq!(due, vec![TimerKind::Heartbeat]);
        assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(5)));

        // The same firing is never reported twice
        assert!(timers.take_due(now).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::Reconnect, now);
        timers.cancel(TimerKind::Reconnect);

        assert!(timers.take_due(now + Duration::from_secs(60)).is_empty());
        assert!(timers.next_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_everything() {
        let now = Instant::now();
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::Heartbeat, now);
        timers.arm(TimerKind::Reconnect, now);
        timers.arm(TimerKind::Sweep, now);

        timers.clear();
        assert!(timers.next_deadline().is_none());
    }
}
