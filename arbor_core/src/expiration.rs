// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Expiration times: the priority model of the work loop.
//!
//! An [`ExpirationTime`] is an integer where larger means more urgent.
//! [`ExpirationTime::SYNC`] is the maximum, [`ExpirationTime::NO_WORK`] means
//! nothing is pending, and [`ExpirationTime::IDLE`] is the least urgent
//! non-zero level.
//!
//! Wall-clock milliseconds map onto expiration times in 10 ms units counting
//! down from a fixed offset, so time moving forward produces *smaller*
//! values. Updates dispatched within the same bucket collapse onto the same
//! expiration time, which is how they end up batched into one render.

use core::fmt;

const MAX_SIGNED_31_BIT_INT: u32 = 1_073_741_823;

const UNIT_SIZE: u32 = 10;

/// Size of one expiration-time unit in milliseconds.
pub const UNIT_SIZE_MS: u64 = UNIT_SIZE as u64;

const MAGIC_NUMBER_OFFSET: u32 = ExpirationTime::BATCHED.0 - 1;

/// Expiration window for normal-priority updates.
pub const LOW_PRIORITY_EXPIRATION_MS: u32 = 5000;
/// Bucket size for normal-priority updates.
pub const LOW_PRIORITY_BATCH_SIZE_MS: u32 = 250;
/// Expiration window for user-blocking updates.
pub const HIGH_PRIORITY_EXPIRATION_MS: u32 = 150;
/// Bucket size for user-blocking updates.
pub const HIGH_PRIORITY_BATCH_SIZE_MS: u32 = 100;

/// Integer priority of pending work. Larger is more urgent.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpirationTime(pub u32);

impl ExpirationTime {
    /// Nothing pending.
    pub const NO_WORK: Self = Self(0);
    /// Work that should never run (offscreen, hidden).
    pub const NEVER: Self = Self(1);
    /// Least urgent runnable work.
    pub const IDLE: Self = Self(2);
    /// Synchronous work; rendered without yielding.
    pub const SYNC: Self = Self(MAX_SIGNED_31_BIT_INT);
    /// Batched synchronous work.
    pub const BATCHED: Self = Self(MAX_SIGNED_31_BIT_INT - 1);

    /// Returns `true` if this is [`NO_WORK`](Self::NO_WORK).
    #[inline]
    #[must_use]
    pub const fn is_no_work(self) -> bool {
        self.0 == 0
    }

    /// Converts a millisecond timestamp to an expiration time.
    ///
    /// Timestamps far enough in the future saturate just above
    /// [`IDLE`](Self::IDLE).
    #[must_use]
    pub fn from_ms(ms: u64) -> Self {
        let units = u32::try_from(ms / UNIT_SIZE_MS).unwrap_or(u32::MAX);
        Self(MAGIC_NUMBER_OFFSET.saturating_sub(units).max(Self::IDLE.0 + 1))
    }

    /// Converts an expiration time back to a millisecond timestamp.
    #[must_use]
    pub fn to_ms(self) -> u64 {
        u64::from(MAGIC_NUMBER_OFFSET.saturating_sub(self.0)) * UNIT_SIZE_MS
    }
}

impl fmt::Debug for ExpirationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NO_WORK => f.write_str("NoWork"),
            Self::NEVER => f.write_str("Never"),
            Self::IDLE => f.write_str("Idle"),
            Self::SYNC => f.write_str("Sync"),
            Self::BATCHED => f.write_str("Batched"),
            Self(t) => write!(f, "ExpirationTime({t})"),
        }
    }
}

impl fmt::Display for ExpirationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn ceiling(num: u32, precision: u32) -> u32 {
    (num / precision + 1) * precision
}

/// Computes a bucketed expiration time `expiration_ms` after `current_time`.
///
/// All current times inside one `bucket_size_ms` window produce the same
/// result.
#[must_use]
pub fn compute_expiration_bucket(
    current_time: ExpirationTime,
    expiration_ms: u32,
    bucket_size_ms: u32,
) -> ExpirationTime {
    let elapsed = MAGIC_NUMBER_OFFSET.saturating_sub(current_time.0) + expiration_ms / UNIT_SIZE;
    let precision = (bucket_size_ms / UNIT_SIZE).max(1);
    ExpirationTime(MAGIC_NUMBER_OFFSET.saturating_sub(ceiling(elapsed, precision)))
}

/// Expiration time for a normal-priority update issued at `current_time`.
#[must_use]
pub fn compute_async_expiration(current_time: ExpirationTime) -> ExpirationTime {
    compute_expiration_bucket(
        current_time,
        LOW_PRIORITY_EXPIRATION_MS,
        LOW_PRIORITY_BATCH_SIZE_MS,
    )
}

/// Expiration time for a user-blocking update issued at `current_time`.
#[must_use]
pub fn compute_interactive_expiration(current_time: ExpirationTime) -> ExpirationTime {
    compute_expiration_bucket(
        current_time,
        HIGH_PRIORITY_EXPIRATION_MS,
        HIGH_PRIORITY_BATCH_SIZE_MS,
    )
}

/// Scheduler priority levels an update can be issued at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Must render now.
    Immediate,
    /// Direct user input.
    UserBlocking,
    /// Ordinary updates.
    Normal,
    /// Updates that may lag behind.
    Low,
    /// Work to do when nothing else is pending.
    Idle,
}

impl Priority {
    /// Maps this priority to an expiration time given the current time.
    #[must_use]
    pub fn expiration_time(self, current_time: ExpirationTime) -> ExpirationTime {
        match self {
            Self::Immediate => ExpirationTime::SYNC,
            Self::UserBlocking => compute_interactive_expiration(current_time),
            Self::Normal | Self::Low => compute_async_expiration(current_time),
            Self::Idle => ExpirationTime::IDLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn ordering_matches_urgency() {
        assert!(ExpirationTime::SYNC > ExpirationTime::BATCHED);
        assert!(ExpirationTime::BATCHED > ExpirationTime::IDLE);
        assert!(ExpirationTime::IDLE > ExpirationTime::NEVER);
        assert!(ExpirationTime::NEVER > ExpirationTime::NO_WORK);
        assert!(ExpirationTime::NO_WORK.is_no_work());
    }

    #[test]
    fn later_timestamps_are_less_urgent() {
        let early = ExpirationTime::from_ms(1_000);
        let late = ExpirationTime::from_ms(2_000);
        assert!(early > late, "time moving forward lowers the value");
        assert_eq!(early.to_ms(), 1_000);
        assert_eq!(late.to_ms(), 2_000);
    }

    #[test]
    fn from_ms_truncates_to_units() {
        assert_eq!(ExpirationTime::from_ms(1_009), ExpirationTime::from_ms(1_000));
        assert_ne!(ExpirationTime::from_ms(1_010), ExpirationTime::from_ms(1_000));
    }

    #[test]
    fn from_ms_saturates_above_idle() {
        let t = ExpirationTime::from_ms(u64::MAX);
        assert!(t > ExpirationTime::IDLE);
    }

    #[test]
    fn updates_in_one_bucket_batch_together() {
        let a = compute_async_expiration(ExpirationTime::from_ms(10_000));
        let b = compute_async_expiration(ExpirationTime::from_ms(10_100));
        assert_eq!(a, b, "100 ms apart inside a 250 ms bucket");
        let c = compute_async_expiration(ExpirationTime::from_ms(10_300));
        assert!(c < a, "next bucket expires later");
    }

    #[test]
    fn interactive_is_more_urgent_than_async() {
        let now = ExpirationTime::from_ms(50_000);
        assert!(compute_interactive_expiration(now) > compute_async_expiration(now));
        assert!(compute_interactive_expiration(now) < now);
    }

    #[rstest]
    #[case(Priority::Immediate, ExpirationTime::SYNC)]
    #[case(Priority::Idle, ExpirationTime::IDLE)]
    fn fixed_priorities(#[case] priority: Priority, #[case] expected: ExpirationTime) {
        assert_eq!(priority.expiration_time(ExpirationTime::from_ms(0)), expected);
    }

    #[rstest]
    #[case(Priority::Normal)]
    #[case(Priority::Low)]
    fn normal_and_low_share_the_async_bucket(#[case] priority: Priority) {
        let now = ExpirationTime::from_ms(1_234);
        assert_eq!(priority.expiration_time(now), compute_async_expiration(now));
    }
}
