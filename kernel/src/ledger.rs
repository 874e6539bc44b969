// Consecutive-failure accounting that survives restarts
//
// The count is persisted on its own key so a failing boot never
// rewrites the settings record. Each failure below `max` buys a timed
// restart using the next delay of the schedule; the failure after that
// resets the count and asks for a long sleep instead.

/// Restart delays in seconds, indexed by the failure count before the
/// failure being handled.
pub const RETRY_DELAYS_SECS: [u32; 5] = [10, 30, 60, 120, 300];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    Empty,
    /// Delays must never shrink as the count grows.
    Decreasing { index: usize },
    /// The count is persisted as one byte.
    TooLong,
}

impl core::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty retry schedule"),
            Self::Decreasing { index } => write!(f, "retry delay {} is shorter than the one before", index),
            Self::TooLong => write!(f, "retry schedule longer than 255"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    /// `attempt` is 1-based; the persisted count is now `attempt`.
    Restart { attempt: u8, max: u8, delay_secs: u32 },
    /// Budget exhausted; the count was reset to zero.
    ExtendedSleep,
}

pub struct RetryLedger {
    count: u8,
    delays: &'static [u32],
}

// an invalid stock schedule fails the build
const STOCK: RetryLedger = match RetryLedger::new(&RETRY_DELAYS_SECS, 0) {
    Ok(ledger) => ledger,
    Err(_) => panic!("stock retry schedule is invalid"),
};

impl RetryLedger {
    pub const fn new(delays: &'static [u32], persisted: u8) -> Result<Self, ScheduleError> {
        if delays.is_empty() {
            return Err(ScheduleError::Empty);
        }
        if delays.len() > u8::MAX as usize {
            return Err(ScheduleError::TooLong);
        }
        let mut i = 1;
        while i < delays.len() {
            if delays[i] < delays[i - 1] {
                return Err(ScheduleError::Decreasing { index: i });
            }
            i += 1;
        }
        let max = delays.len() as u8;
        Ok(Self {
            count: if persisted > max { max } else { persisted },
            delays,
        })
    }

    /// Ledger over the stock schedule.
    pub fn with_default_schedule(persisted: u8) -> Self {
        let mut ledger = STOCK;
        ledger.count = persisted.min(ledger.max());
        ledger
    }

    #[inline]
    pub fn count(&self) -> u8 {
        self.count
    }

    #[inline]
    pub fn max(&self) -> u8 {
        self.delays.len() as u8
    }

    /// Records one failure. The caller persists `count()` afterwards.
    pub fn on_failure(&mut self) -> FailureOutcome {
        if self.count < self.max() {
            let delay_secs = self.delays[self.count as usize];
            self.count += 1;
            FailureOutcome::Restart {
                attempt: self.count,
                max: self.max(),
                delay_secs,
            }
        } else {
            self.count = 0;
            FailureOutcome::ExtendedSleep
        }
    }

    /// Returns whether the count changed (and needs persisting).
    pub fn on_success(&mut self) -> bool {
        let changed = self.count != 0;
        self.count = 0;
        changed
    }
}
