//! Helpers over the session's weather-forecast sample series.
//!
//! Forecast samples are minute-based and sparse; lookups are stepwise: the
//! nearest sample at or after the target minute answers, the last known
//! sample answers past the end.

use crate::telemetry::ForecastSample;

const DEFAULT_LAP_S: f64 = 90.0;
const NEXT_LAP_MARGIN_S: f64 = 10.0;
const NEXT_LAP_MIN_S: f64 = 30.0;
const FORECAST_MAX_MINUTE: u32 = 240;

/// Map "early in the next lap" onto the forecast's minute grid.
///
/// Conservative by construction: seconds round up to the next whole minute,
/// so rain is never undershot by picking a too-early sample.
pub fn estimate_next_lap_minute(your_last_lap_s: Option<f64>) -> u32 {
    let lap_s = match your_last_lap_s {
        Some(s) if s > 0.0 => s,
        _ => DEFAULT_LAP_S,
    };
    let next_lap_s = (lap_s - NEXT_LAP_MARGIN_S).max(NEXT_LAP_MIN_S);
    let minute = (next_lap_s / 60.0).ceil() as u32;
    minute.clamp(1, FORECAST_MAX_MINUTE)
}

/// Rain % at or after `minute`; the last sample answers beyond the horizon.
pub fn value_at(series: &[ForecastSample], minute: u32) -> Option<u8> {
    if series.is_empty() {
        return None;
    }
    series
        .iter()
        .find(|s| u32::from(s.minute) >= minute)
        .or(series.last())
        .map(|s| s.rain_pct)
}

/// First minute at which rain drops to `threshold` or below.
pub fn time_to_below(series: &[ForecastSample], threshold: u8) -> Option<u8> {
    series
        .iter()
        .find(|s| s.rain_pct <= threshold)
        .map(|s| s.minute)
}

/// First minute at which rain reaches `threshold` or above.
pub fn time_to_above(series: &[ForecastSample], threshold: u8) -> Option<u8> {
    series
        .iter()
        .find(|s| s.rain_pct >= threshold)
        .map(|s| s.minute)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(minute: u8, rain_pct: u8) -> ForecastSample {
        ForecastSample {
            minute,
            rain_pct,
            weather: 0,
        }
    }

    #[test]
    fn test_next_lap_minute_rounds_up() {
        // 92 s lap -> 82 s to early-next-lap -> 2 minutes
        assert_eq!(estimate_next_lap_minute(Some(92.0)), 2);
        // 65 s lap -> 55 s -> 1 minute
        assert_eq!(estimate_next_lap_minute(Some(65.0)), 1);
        // unknown lap time falls back to the 90 s default -> 2 minutes
        assert_eq!(estimate_next_lap_minute(None), 2);
        assert_eq!(estimate_next_lap_minute(Some(-3.0)), 2);
    }

    #[test]
    fn test_stepwise_lookup() {
        let series = [sample(0, 10), sample(5, 40), sample(15, 80)];
        assert_eq!(value_at(&series, 0), Some(10));
        assert_eq!(value_at(&series, 3), Some(40));
        assert_eq!(value_at(&series, 5), Some(40));
        assert_eq!(value_at(&series, 10), Some(80));
        // Past the last sample: last known value answers.
        assert_eq!(value_at(&series, 60), Some(80));
        assert_eq!(value_at(&[], 5), None);
    }

    #[test]
    fn test_time_to_cross() {
        let series = [sample(0, 70), sample(5, 40), sample(10, 20)];
        assert_eq!(time_to_below(&series, 25), Some(10));
        assert_eq!(time_to_above(&series, 60), Some(0));
        assert_eq!(time_to_above(&series, 90), None);
        assert_eq!(time_to_below(&series, 5), None);
    }
}
