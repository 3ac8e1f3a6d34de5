//! Progress accounting for long-running batch loops.

use std::fmt;
use std::time::{Duration, Instant};

/// Tracks how many of a known number of records have been processed.
#[derive(Debug, Clone)]
pub struct Progress {
    total: u64,
    processed: u64,
    started: Instant,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self::starting_at(total, Instant::now())
    }

    pub fn starting_at(total: usize, started: Instant) -> Self {
        Self {
            total: total as u64,
            processed: 0,
            started,
        }
    }

    /// Record `n` more processed records. Never exceeds the total.
    pub fn add(&mut self, n: usize) {
        self.processed = self.processed.saturating_add(n as u64).min(self.total);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Fraction in `[0, 1]`; an empty workload counts as complete.
    pub fn fraction_complete(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> ProgressSnapshot {
        let fraction = self.fraction_complete();
        let elapsed = now.saturating_duration_since(self.started);
        let elapsed_secs = elapsed.as_secs_f64();

        let estimated_total = if fraction > 0.0 {
            Some(Duration::from_secs_f64(elapsed_secs / fraction))
        } else {
            None
        };
        let throughput = if elapsed_secs > 0.0 {
            Some(self.total as f64 * fraction / elapsed_secs)
        } else {
            None
        };

        ProgressSnapshot {
            percentage: 100.0 * fraction,
            elapsed,
            estimated_total,
            throughput,
        }
    }
}

/// Point-in-time rendering of a [`Progress`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub percentage: f64,
    pub elapsed: Duration,
    /// Extrapolated total duration; `None` until something has been processed.
    pub estimated_total: Option<Duration>,
    /// Records per second; `None` when no time has elapsed.
    pub throughput: Option<f64>,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self
            .estimated_total
            .map(|d| human_readable(d))
            .unwrap_or_else(|| "unknown".to_string());
        let rate = self
            .throughput
            .map(|r| format!("{:.2}", r))
            .unwrap_or_else(|| "unknown".to_string());
        write!(
            f,
            "{:>6.2}% [{} of {}, {} records/s]",
            self.percentage,
            human_readable(self.elapsed),
            total,
            rate
        )
    }
}

/// Compact duration rendering: `1d2h3m4s`, largest non-zero unit first.
pub fn human_readable(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);

    if days > 0 {
        format!("{days}d{hours}h{minutes}m{seconds}s")
    } else if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
