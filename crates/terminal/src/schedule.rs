//! Cooperative pacing for the session loops.
//!
//! [`Responsive`] rate-limits an expensive boolean probe, [`Intermission`]
//! paces a loop body to a fixed period without ever sleeping a full period
//! unconditionally.

use std::thread;
use std::time::{Duration, Instant};

/// A boolean probe evaluated at most once per period.
///
/// The first check and any check made after the period has elapsed since the
/// last real evaluation run the probe and cache its answer. Checks inside the
/// period return the cached answer without running the probe.
pub struct Responsive<F> {
    probe: F,
    period: Duration,
    value: bool,
    evaluated_at: Option<Instant>,
}

impl<F> Responsive<F>
where
    F: FnMut() -> bool,
{
    /// `default` is the answer reported by [`Responsive::last_value`] before
    /// the probe has ever run.
    pub fn new(period: Duration, default: bool, probe: F) -> Self {
        Self {
            probe,
            period,
            value: default,
            evaluated_at: None,
        }
    }

    pub fn check(&mut self) -> bool {
        self.check_at(Instant::now())
    }

    /// [`Responsive::check`] against an explicit clock reading.
    pub fn check_at(&mut self, now: Instant) -> bool {
        let fresh = matches!(
            self.evaluated_at,
            Some(at) if now.saturating_duration_since(at) < self.period
        );
        if !fresh {
            self.value = (self.probe)();
            self.evaluated_at = Some(now);
        }
        self.value
    }

    /// Cached answer, without probing.
    pub fn last_value(&self) -> bool {
        self.value
    }
}

/// Scoped loop pacer.
///
/// Created at the top of a loop body; when dropped it sleeps for whatever is
/// left of the period. Work that overran the period proceeds immediately.
#[must_use = "the intermission only paces the scope it lives in"]
pub struct Intermission {
    period: Duration,
    started: Instant,
}

impl Intermission {
    pub fn begin(period: Duration) -> Self {
        Self {
            period,
            started: Instant::now(),
        }
    }

    /// Time left in the current period, `None` once it has run out.
    pub fn remaining(&self) -> Option<Duration> {
        self.period
            .checked_sub(self.started.elapsed())
            .filter(|left| !left.is_zero())
    }
}

impl Drop for Intermission {
    fn drop(&mut self) {
        if let Some(left) = self.remaining() {
            thread::sleep(left);
        }
    }
}
