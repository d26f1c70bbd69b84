//! Temporal filters for noisy packet-driven signals.

use std::time::{Duration, Instant};

/// Samples required before the outlier gate starts filtering.
pub(crate) const OUTLIER_MIN_SAMPLES: usize = 3;
/// Floor tolerance of the outlier gate, seconds.
pub(crate) const OUTLIER_FIXED_THRESHOLD_S: f64 = 2.5;
/// MAD to normal-equivalent sigma.
const MAD_TO_SIGMA: f64 = 1.4826;
const OUTLIER_SIGMA_MULT: f64 = 3.5;

/// Only accept a value once it has stayed the same for N updates or T seconds.
///
/// Used to suppress single-packet noise in the weather, safety-car and rain
/// fields. Time is passed in by the caller so behavior is deterministic under
/// test.
#[derive(Debug)]
pub struct Debounce<T> {
    required: u32,
    max_age: Duration,
    candidate: Option<T>,
    count: u32,
    since: Option<Instant>,
}

impl<T: Copy + PartialEq> Debounce<T> {
    pub fn new(required: u32, max_age: Duration) -> Self {
        Self {
            required: required.max(1),
            max_age,
            candidate: None,
            count: 0,
            since: None,
        }
    }

    /// Feed one observation. Returns the stable value once the current streak
    /// reaches the update count or the age threshold, whichever comes first.
    pub fn update(&mut self, value: T, now: Instant) -> Option<T> {
        if self.candidate != Some(value) {
            self.candidate = Some(value);
            self.count = 1;
            self.since = Some(now);
            return None;
        }

        self.count += 1;
        let age = self
            .since
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or(Duration::ZERO);
        if self.count >= self.required || age >= self.max_age {
            self.candidate
        } else {
            None
        }
    }
}

/// Median of a slice; None when empty. NaN entries are ignored.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Robust outlier gate for admitting a lap time into a reference buffer.
///
/// With fewer than [`OUTLIER_MIN_SAMPLES`] prior laps everything is accepted.
/// Otherwise the acceptance window adapts to the buffer's own variance:
/// `max(fixed threshold, 3.5 sigma)` around the median, with sigma estimated
/// from the median absolute deviation.
pub fn robust_accept_lap(buf: &[f64], lap_s: f64) -> bool {
    if buf.len() < OUTLIER_MIN_SAMPLES {
        return true;
    }

    let Some(med) = median(buf) else {
        return true;
    };
    let devs: Vec<f64> = buf.iter().map(|x| (x - med).abs()).collect();
    let Some(mad) = median(&devs) else {
        return true;
    };

    let sigma = MAD_TO_SIGMA * mad;
    let threshold = OUTLIER_FIXED_THRESHOLD_S.max(OUTLIER_SIGMA_MULT * sigma);
    (lap_s - med).abs() <= threshold
}
