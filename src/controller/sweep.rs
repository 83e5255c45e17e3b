//! Return-temperature stability detection during a sweep.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Delay before the first stability check, in seconds.
pub const FIRST_CHECK_SECS: i64 = 30;
/// Delay between subsequent checks, in seconds.
pub const CHECK_INTERVAL_SECS: i64 = 15;
/// Elapsed time the window must cover before stability can be declared.
pub const MIN_WINDOW_SECS: f64 = 60.0;
/// Readings the window must hold before stability can be declared.
pub const MIN_READINGS: usize = 3;
/// Max-min spread (°C) under which the window counts as stable.
pub const STABILITY_RANGE: f64 = 0.2;

/// Result of one stability check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SweepVerdict {
    Stable { range: f64, readings: usize },
    TimedOut { range: Option<f64>, readings: usize },
    Continue,
}

impl SweepVerdict {
    pub fn is_done(&self) -> bool {
        !matches!(self, SweepVerdict::Continue)
    }
}

/// Accumulates return-temperature readings for one sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityMonitor {
    started: DateTime<Utc>,
    max_duration_secs: f64,
    readings: Vec<f64>,
}

impl StabilityMonitor {
    pub fn new(started: DateTime<Utc>, max_duration_secs: u64) -> Self {
        Self {
            started,
            max_duration_secs: max_duration_secs as f64,
            readings: Vec::new(),
        }
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn readings(&self) -> &[f64] {
        &self.readings
    }

    /// Spread of the window, if any readings exist.
    pub fn range(&self) -> Option<f64> {
        if self.readings.is_empty() {
            return None;
        }
        let min = self.readings.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.readings.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(max - min)
    }

    /// Record a reading taken at `now` (`None` when the sensor had no
    /// value) and decide whether the sweep is over.
    pub fn observe(&mut self, now: DateTime<Utc>, reading: Option<f64>) -> SweepVerdict {
        let elapsed = (now - self.started).num_milliseconds() as f64 / 1000.0;

        if let Some(value) = reading {
            self.readings.push(value);
        }

        if elapsed >= MIN_WINDOW_SECS && self.readings.len() >= MIN_READINGS {
            if let Some(range) = self.range().filter(|r| *r < STABILITY_RANGE) {
                info!(
                    elapsed_secs = elapsed,
                    range,
                    readings = self.readings.len(),
                    "Sweep stable"
                );
                return SweepVerdict::Stable {
                    range,
                    readings: self.readings.len(),
                };
            }
        }

        if elapsed >= self.max_duration_secs {
            info!(
                max_secs = self.max_duration_secs,
                range = ?self.range(),
                "Sweep timed out"
            );
            return SweepVerdict::TimedOut {
                range: self.range(),
                readings: self.readings.len(),
            };
        }

        debug!(
            reading = ?reading,
            elapsed_secs = elapsed,
            readings = self.readings.len(),
            "Sweep monitoring"
        );
        SweepVerdict::Continue
    }
}
