//! Timeouts for the wait primitives.
//!
//! DRMAA2 expresses timeouts as seconds with two sentinels:
//! [`INFINITE_TIME`] (`-1`) and [`ZERO_TIME`] (`0`). [`Timeout`] is the typed
//! form; [`Deadline`] is what a wait loop works against.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{DrmaaError, DrmaaResult};

/// Wait without a deadline.
pub const INFINITE_TIME: i64 = -1;
/// Check once and return immediately.
pub const ZERO_TIME: i64 = 0;

/// How long a wait primitive may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeout {
    /// No deadline.
    Infinite,
    /// A single non-blocking check.
    Zero,
    /// Block for at most this long.
    After(Duration),
}

impl Timeout {
    pub const INFINITE: Timeout = Timeout::Infinite;
    pub const ZERO: Timeout = Timeout::Zero;

    /// Parse the DRMAA2 seconds convention.
    pub fn from_secs(secs: i64) -> DrmaaResult<Self> {
        match secs {
            INFINITE_TIME => Ok(Timeout::Infinite),
            ZERO_TIME => Ok(Timeout::Zero),
            s if s > 0 => Ok(Timeout::After(Duration::from_secs(s.unsigned_abs()))),
            s => Err(DrmaaError::InvalidArgument(format!(
                "timeout {s} is neither positive nor a sentinel"
            ))),
        }
    }

    /// Absolute deadline, measured from now.
    pub fn deadline(self) -> Deadline {
        match self {
            Timeout::Infinite => Deadline::Never,
            Timeout::Zero => Deadline::Immediate,
            Timeout::After(d) if d.is_zero() => Deadline::Immediate,
            // Past the end of the clock is as good as never.
            Timeout::After(d) => Instant::now()
                .checked_add(d)
                .map_or(Deadline::Never, Deadline::At),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() { Timeout::Zero } else { Timeout::After(d) }
    }
}

impl TryFrom<i64> for Timeout {
    type Error = DrmaaError;

    fn try_from(secs: i64) -> DrmaaResult<Self> {
        Timeout::from_secs(secs)
    }
}

/// Absolute end of a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Never,
    Immediate,
    At(Instant),
}

impl Deadline {
    /// How long the next sleep may last, capped by `poll`. `None` once the
    /// deadline has passed.
    pub fn next_nap(self, poll: Duration) -> Option<Duration> {
        match self {
            Deadline::Never => Some(poll),
            Deadline::Immediate => None,
            Deadline::At(at) => {
                let left = at.saturating_duration_since(Instant::now());
                if left.is_zero() { None } else { Some(left.min(poll)) }
            }
        }
    }
}
