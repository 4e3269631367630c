//! Deadlines shared between setters and blocked readers
//!
//! A [`Deadline`] is a mutex-guarded absolute instant. Readers take a
//! snapshot per wait iteration, so they always see either the old or the new
//! value.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// How long a blocked operation may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// The deadline has already passed
    Expired,
    /// Wait at most this long
    For(Duration),
    /// No deadline is set
    Forever,
}

impl Wait {
    /// Compute the wait for `deadline` as seen at `now`
    pub fn until(deadline: Option<Instant>, now: Instant) -> Self {
        match deadline {
            None => Wait::Forever,
            Some(at) if at <= now => Wait::Expired,
            Some(at) => Wait::For(at - now),
        }
    }

    /// Clamp to `slice`, so a blocking call returns at least that often
    ///
    /// Returns `None` once the deadline has expired.
    pub fn bounded(self, slice: Duration) -> Option<Duration> {
        match self {
            Wait::Expired => None,
            Wait::For(d) => Some(d.min(slice)),
            Wait::Forever => Some(slice),
        }
    }

    /// Timeout argument for `poll(2)`: milliseconds rounded up, `-1` for none
    pub fn poll_millis(self) -> i32 {
        match self {
            Wait::Expired => 0,
            Wait::Forever => -1,
            Wait::For(d) => {
                let ms = d.as_nanos().div_ceil(1_000_000);
                i32::try_from(ms).unwrap_or(i32::MAX)
            }
        }
    }
}

/// An absolute deadline, `None` meaning no deadline
#[derive(Debug, Default)]
pub struct Deadline {
    at: Mutex<Option<Instant>>,
}

impl Deadline {
    /// A deadline that is not set
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the deadline
    pub fn set(&self, at: Option<Instant>) {
        *self.at.lock() = at;
    }

    /// Current deadline
    pub fn get(&self) -> Option<Instant> {
        *self.at.lock()
    }

    /// Remaining wait as seen now
    pub fn wait(&self) -> Wait {
        Wait::until(self.get(), Instant::now())
    }
}
