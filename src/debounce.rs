//! Coalescing scheduler for bursty event streams.
//!
//! One pending slot per stream: queueing again replaces both the value and
//! the timer, so only the last call within a quiet interval takes effect.

/// Whether a call queued at `queued_at_ms` has waited out `interval_ms`.
pub const fn is_due(queued_at_ms: u64, now_ms: u64, interval_ms: u64) -> bool {
    now_ms.saturating_sub(queued_at_ms) >= interval_ms
}

#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay_ms: u64,
    pending: Option<(T, u64)>,
}

impl<T> Debouncer<T> {
    pub const fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            pending: None,
        }
    }

    pub const fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    /// Replace whatever is pending and restart the timer at `now_ms`.
    pub fn queue(&mut self, value: T, now_ms: u64) {
        self.pending = Some((value, now_ms));
    }

    /// Take the pending value once its quiet interval has elapsed.
    pub fn take_ready(&mut self, now_ms: u64) -> Option<T> {
        let (_, queued_at) = self.pending.as_ref()?;
        if is_due(*queued_at, now_ms, self.delay_ms) {
            self.pending.take().map(|(value, _)| value)
        } else {
            None
        }
    }

    /// Earliest time at which [`Self::take_ready`] will yield.
    pub fn due_at(&self) -> Option<u64> {
        self.pending
            .as_ref()
            .map(|(_, queued_at)| queued_at.saturating_add(self.delay_ms))
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
