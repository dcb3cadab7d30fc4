//! Continuous-engagement tracking for health reminders.
//!
//! Activity events from any number of input sources stamp
//! `last_activity`; a fixed 60-second check decides whether the user has
//! been continuously engaged long enough to deserve a break reminder. An
//! idle gap of more than five minutes observed at check time breaks the
//! streak. The reminder interval is read live on every check so runtime
//! reconfiguration needs no restart.

use std::time::{Duration, Instant};
use tracing::debug;

/// Gap without activity after which the engagement streak resets.
pub const IDLE_GAP: Duration = Duration::from_secs(5 * 60);

/// Spacing of the periodic check tick.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Tracks activity recency and continuous-engagement duration.
#[derive(Debug)]
pub struct ActivityTracker {
    last_activity: Instant,
    continuous_start: Instant,
    last_reminder: Option<Instant>,
}

impl ActivityTracker {
    /// Start tracking from `now`.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            last_activity: now,
            continuous_start: now,
            last_reminder: None,
        }
    }

    /// Record user activity from any input source.
    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Run one periodic check. Returns `true` when a reminder should fire.
    ///
    /// Both the streak clock and the last-reminder clock must exceed
    /// `interval`; this prevents premature firing on short sessions and
    /// re-firing faster than once per interval. Both reset on fire.
    pub fn check(&mut self, now: Instant, interval: Duration) -> bool {
        if now.duration_since(self.last_activity) > IDLE_GAP {
            // The user stepped away; the streak restarts here.
            self.continuous_start = now;
            return false;
        }

        let engaged = now.duration_since(self.continuous_start);
        let since_reminder = self
            .last_reminder
            .map_or(Duration::MAX, |t| now.duration_since(t));

        if engaged >= interval && since_reminder >= interval {
            debug!(minutes = engaged.as_secs() / 60, "health reminder due");
            self.last_reminder = Some(now);
            self.continuous_start = now;
            return true;
        }
        false
    }

    /// Minutes of the current continuous-engagement streak.
    #[must_use]
    pub fn continuous_minutes(&self, now: Instant) -> u64 {
        now.duration_since(self.continuous_start).as_secs() / 60
    }
}
