//! Stateful rain/tyre strategy engine.
//!
//! Fuses the live field signals into a 0..1 "wetness" score plus a separate
//! "full wet" score, runs a two-tier hysteresis state machine over them, and
//! turns the result into a pit recommendation with payback-time economics
//! and an anti-flip-flop lockout between the two rain compounds.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use itertools::Itertools;

use super::forecast::{estimate_next_lap_minute, time_to_above, time_to_below, value_at};
use super::tuning::RainTuning;
use super::{LapRow, PitAdvice, StrategyAssessment, StrategyInput};
use crate::telemetry::filters::median;
use crate::telemetry::{CompoundLabel, LiveState, SafetyCar, TyreCategory};

/// Slope windows for the temperature trends.
const TRACK_TEMP_SLOPE_WINDOW: Duration = Duration::from_secs(90);
const AIR_TEMP_SLOPE_WINDOW: Duration = Duration::from_secs(120);

/// Baseline pace cache lifetime per (track, tyre).
const BASELINE_CACHE_TTL: Duration = Duration::from_secs(10);
/// Historical lap rows outside this band are noise, not laps.
const BASELINE_LAP_MIN_S: f64 = 10.0;
const BASELINE_LAP_MAX_S: f64 = 400.0;

/// Assumed lap time for lockout sizing when no baseline is known.
const LOCKOUT_FALLBACK_LAP_S: f64 = 85.0;
const LOCKOUT_MIN_S: f64 = 45.0;

/// Default dry compound to call when exiting rain tyres.
const DRY_EXIT_TARGET: CompoundLabel = CompoundLabel::C4;

#[derive(Clone, Debug)]
pub struct RainEngineConfig {
    /// Rolling signal window length.
    pub window: Duration,
    /// Samples before the confidence model trusts the windows much.
    pub min_samples: usize,
    /// Mode A (dry vs intermediate) thresholds and hold counts.
    pub on_th: f64,
    pub off_th: f64,
    pub hold_on_updates: u32,
    pub hold_off_updates: u32,
    /// Mode B (intermediate vs full wet) thresholds and hold counts.
    pub wet_on_th: f64,
    pub wet_off_th: f64,
    pub wet_hold_on_updates: u32,
    pub wet_hold_off_updates: u32,
    /// Lockout lengths in laps for the two switch directions.
    pub lockout_laps_wet_to_inter: f64,
    pub lockout_laps_inter_to_wet: f64,
}

impl Default for RainEngineConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(20),
            min_samples: 4,
            on_th: 0.65,
            off_th: 0.35,
            hold_on_updates: 2,
            hold_off_updates: 3,
            wet_on_th: 0.78,
            wet_off_th: 0.55,
            wet_hold_on_updates: 2,
            wet_hold_off_updates: 3,
            lockout_laps_wet_to_inter: 2.0,
            lockout_laps_inter_to_wet: 1.0,
        }
    }
}

/// Time-bounded rolling buffer of (timestamp, value) samples. Bounded by
/// time rather than count: sample arrival is packet-driven, not clock-driven.
#[derive(Debug, Default)]
struct SignalWindow {
    samples: VecDeque<(Instant, f64)>,
}

impl SignalWindow {
    fn push(&mut self, now: Instant, value: Option<f64>, window: Duration) {
        let Some(v) = value else {
            return;
        };
        self.samples.push_back((now, v));
        while let Some(&(t, _)) = self.samples.front() {
            if now.saturating_duration_since(t) > window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn median(&self) -> Option<f64> {
        let values = self.samples.iter().map(|(_, v)| *v).collect_vec();
        median(&values)
    }

    /// Trend in units per minute over the trailing `span`: last value minus
    /// the newest value at least `span` old (or the oldest available).
    fn slope_per_min(&self, span: Duration) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let &(t_last, v_last) = self.samples.back()?;
        let origin = self
            .samples
            .iter()
            .rev()
            .find(|(t, _)| t_last.saturating_duration_since(*t) >= span)
            .or_else(|| self.samples.front())?;
        let (t0, v0) = *origin;
        let dt = t_last.saturating_duration_since(t0).as_secs_f64();
        if dt <= 1e-6 {
            return None;
        }
        Some((v_last - v0) / dt * 60.0)
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

pub struct RainEngine {
    cfg: RainEngineConfig,
    tuning: RainTuning,

    inter_share: SignalWindow,
    wet_share: SignalWindow,
    delta_is: SignalWindow,
    delta_wi: SignalWindow,
    rain_now: SignalWindow,
    rain_next: SignalWindow,
    track_temp: SignalWindow,
    air_temp: SignalWindow,
    weather: SignalWindow,

    is_wet_mode: bool,
    on_counter: u32,
    off_counter: u32,
    is_fullwet_mode: bool,
    wet_on_counter: u32,
    wet_off_counter: u32,

    /// Wet <-> Inter switch lockout deadline.
    lockout_until: Option<Instant>,

    baseline_cache: HashMap<(String, CompoundLabel), (Instant, f64)>,
}

impl RainEngine {
    pub fn new(cfg: RainEngineConfig) -> Self {
        Self {
            cfg,
            tuning: RainTuning::default(),
            inter_share: SignalWindow::default(),
            wet_share: SignalWindow::default(),
            delta_is: SignalWindow::default(),
            delta_wi: SignalWindow::default(),
            rain_now: SignalWindow::default(),
            rain_next: SignalWindow::default(),
            track_temp: SignalWindow::default(),
            air_temp: SignalWindow::default(),
            weather: SignalWindow::default(),
            is_wet_mode: false,
            on_counter: 0,
            off_counter: 0,
            is_fullwet_mode: false,
            wet_on_counter: 0,
            wet_off_counter: 0,
            lockout_until: None,
            baseline_cache: HashMap::new(),
        }
    }

    pub fn with_tuning(cfg: RainEngineConfig, tuning: RainTuning) -> Self {
        let mut engine = Self::new(cfg);
        engine.tuning = tuning;
        engine
    }

    pub fn is_wet_mode(&self) -> bool {
        self.is_wet_mode
    }

    pub fn is_fullwet_mode(&self) -> bool {
        self.is_fullwet_mode
    }

    pub fn update(&mut self, state: &LiveState, input: &StrategyInput<'_>) -> StrategyAssessment {
        self.update_at(Instant::now(), state, input)
    }

    /// One engine tick with an explicit clock, so scenarios are reproducible
    /// under test.
    pub fn update_at(
        &mut self,
        now: Instant,
        state: &LiveState,
        input: &StrategyInput<'_>,
    ) -> StrategyAssessment {
        let p = self.tuning.clone();
        let window = self.cfg.window;
        let fc_series = state.rain_fc_series.clone().unwrap_or_default();

        // --- Rolling inputs (state -> windows) ---
        self.inter_share.push(now, state.inter_share, window);
        self.delta_is
            .push(now, state.pace_delta_inter_vs_slick_s, window);
        self.rain_now
            .push(now, state.rain_now_pct.map(f64::from), window);
        self.rain_next
            .push(now, state.rain_fc_pct.map(f64::from), window);
        self.track_temp
            .push(now, state.track_temp_c.map(f64::from), window);
        self.air_temp
            .push(now, state.air_temp_c.map(f64::from), window);
        self.weather.push(now, state.weather.map(f64::from), window);
        self.wet_share.push(now, state.wet_share, window);
        self.delta_wi
            .push(now, state.pace_delta_wet_vs_inter_s, window);

        // --- Robust medians ---
        let inter_share_med = self.inter_share.median();
        let delta_is_med = self.delta_is.median(); // I - S, negative = inter faster
        let rain_next_med = self.rain_next.median();
        let rain_now_med = self.rain_now.median();
        let track_temp_med = self.track_temp.median();
        let weather_med = self.weather.median();
        let wet_share_med = self.wet_share.median();
        let delta_wi_field_med = self.delta_wi.median(); // W - I, negative = wet faster

        // W-I also comes from the player's own reference laps; blend when
        // both exist, the field view weighted higher.
        let your_delta_wi = state.your_delta_wet_vs_inter_s;
        let delta_wi_med = match (delta_wi_field_med, your_delta_wi) {
            (Some(field), Some(yours)) => Some(0.6 * field + 0.4 * yours),
            (Some(field), None) => Some(field),
            (None, Some(yours)) => Some(yours),
            (None, None) => None,
        };

        let track_slope_cpm = self.track_temp.slope_per_min(TRACK_TEMP_SLOPE_WINDOW);
        let air_slope_cpm = self.air_temp.slope_per_min(AIR_TEMP_SLOPE_WINDOW);

        // --- Forecast-derived features ---
        let next_lap_min = estimate_next_lap_minute(input.your_last_lap_s);
        let rain_nl = value_at(&fc_series, next_lap_min).map(f64::from);
        let rain_3 = value_at(&fc_series, 3).map(f64::from);
        let rain_5 = value_at(&fc_series, 5).map(f64::from);
        let rain_10 = value_at(&fc_series, 10).map(f64::from);

        let drying_soon = time_to_below(&fc_series, 25).is_some_and(|t| t <= 15);
        let heavy_incoming = time_to_above(&fc_series, 60).is_some_and(|t| t <= 10);

        // --- Baseline: expected pace on the current tyre from history ---
        let expected_pace = input.history.and_then(|rows| {
            self.expected_pace_from_rows(input.track, input.current_tyre, rows, now)
        });
        let baseline_loss = match (expected_pace, input.your_last_lap_s) {
            (Some(expected), Some(last)) => Some(last - expected),
            _ => None,
        };

        // --- Wetness fusion: weighted average of the signals we have ---
        // 0 clear, 1 light cloud, 2 overcast, 3 light rain, 4 heavy rain, 5 storm
        let s0 = weather_med.map(|w| match w.trunc() as i32 {
            ..=2 => 0.0,
            3 => 0.25,
            4 => 0.55,
            _ => 0.75,
        });

        let s_now =
            rain_now_med.map(|r| clamp01((r - p.rain_now_map_lo) / p.rain_now_map_span));

        // Cooling track implies wetting, warming implies drying; the wetting
        // direction counts more.
        let mut s_temp = track_slope_cpm.map(|slope| {
            let wet_from_track = clamp01((-slope - 0.20) / 0.80);
            let dry_from_track = clamp01((slope - 0.20) / 0.80);
            clamp01(wet_from_track - 0.60 * dry_from_track + 0.50)
        });
        if s_temp.is_none() {
            s_temp = air_slope_cpm.map(|slope| {
                let wet_from_air = clamp01((-slope - 0.10) / 0.60);
                let dry_from_air = clamp01((slope - 0.10) / 0.60);
                clamp01(wet_from_air - 0.50 * dry_from_air + 0.50)
            });
        }

        let s1 = inter_share_med.map(|share| clamp01((share - 0.15) / 0.35));
        let s2 = delta_is_med.map(|d| clamp01((-d - 0.5) / 2.0));
        let s3 = rain_next_med.map(|r| clamp01((r - 35.0) / 35.0));
        let s4 = baseline_loss.map(|loss| clamp01((loss - 0.7) / 2.0));

        let temp_boost = track_temp_med
            .map(|t| clamp01((p.cold_track_ref_c - t) / p.cold_track_span_c) * p.cold_track_boost_max)
            .unwrap_or(0.0);

        let mut parts: Vec<(f64, f64)> = Vec::new();
        let mut add = |signal: Option<f64>, weight: f64| {
            if let Some(v) = signal {
                parts.push((v, weight));
            }
        };
        add(s0, p.w_weather_enum);
        add(s_now, p.w_rain_now);
        add(s_temp, p.w_temp_trend);
        add(s2, p.w_delta_is);
        add(s1, p.w_inter_share);
        add(s3, p.w_forecast);
        add(s4, p.w_baseline_loss);

        let mut wetness = if parts.is_empty() {
            0.0
        } else {
            let wsum: f64 = parts.iter().map(|(_, w)| w).sum();
            parts.iter().map(|(v, w)| v * w).sum::<f64>() / wsum.max(1e-9)
        };
        wetness = clamp01(wetness + temp_boost);

        // Hard floor by actual rain on the HUD.
        if let Some(s) = s_now {
            wetness = wetness.max(s * p.rain_now_floor_factor);
        }

        // --- Separate "full wet" score (Inter -> Wet), harsher ladder ---
        let fw0 = weather_med.map(|w| match w.trunc() as i32 {
            ..=3 => 0.0,
            4 => 0.75,
            _ => 0.95,
        });
        let fw1 = wet_share_med.map(|share| clamp01((share - 0.05) / 0.25));
        let fw2 = delta_wi_med.map(|d| clamp01((-d - 0.20) / 1.30));
        let fw3 = rain_next_med.map(|r| clamp01((r - 60.0) / 30.0));

        let mut fw_parts: Vec<(f64, f64)> = Vec::new();
        let mut fw_add = |signal: Option<f64>, weight: f64| {
            if let Some(v) = signal {
                fw_parts.push((v, weight));
            }
        };
        fw_add(fw0, 0.35);
        fw_add(fw2, 0.35);
        fw_add(fw1, 0.25);
        fw_add(fw3, 0.20);

        let mut fullwet = if fw_parts.is_empty() {
            0.0
        } else {
            let wsum: f64 = fw_parts.iter().map(|(_, w)| w).sum();
            fw_parts.iter().map(|(v, w)| v * w).sum::<f64>() / wsum.max(1e-9)
        };
        if let Some(w0) = fw0 {
            fullwet = fullwet.max(w0 * 0.85);
        }
        fullwet = clamp01(fullwet);
        if heavy_incoming {
            fullwet = (fullwet + 0.10).min(1.0);
        }
        let wet_score = fullwet;

        // --- Confidence: more core signals + enough samples ---
        let n_signals = [s1, s2, s3, s4].iter().filter(|s| s.is_some()).count();
        let n_samples = self.rain_next.len() + self.delta_is.len() + self.inter_share.len();
        let sample_fill = clamp01(n_samples as f64 / (self.cfg.min_samples as f64 * 3.0));
        let mut conf = clamp01(
            p.conf_base + p.conf_per_signal * n_signals as f64 + p.conf_samples_factor * sample_fill,
        );

        // SC/VSC lowers the cost of an early stop.
        let under_sc = matches!(
            state.safety_car_status,
            Some(SafetyCar::Full) | Some(SafetyCar::Virtual)
        );
        if under_sc {
            wetness = clamp01(wetness + 0.06);
            conf = clamp01(conf + 0.05);
        }

        // --- Conditions-shift detector ---
        let mut cond_reasons: Vec<String> = Vec::new();
        if rain_now_med.is_some_and(|r| r >= p.cond_rain_now_on) {
            cond_reasons.push(format!("rain_now>={:.0}", p.cond_rain_now_on));
        }
        if track_slope_cpm.is_some_and(|s| s <= p.cond_track_drop_cpm) {
            cond_reasons.push("trackTemp_drop".to_string());
        }
        if delta_is_med.is_some_and(|d| d <= p.cond_delta_is_on) {
            cond_reasons.push(format!("dIS<={:.2}", p.cond_delta_is_on));
        }
        if let (Some(r3), Some(r5)) = (rain_3, rain_5) {
            if r5 - r3 >= p.cond_fc_ramp_3to5 {
                cond_reasons.push("fc_ramp_3to5".to_string());
            }
        }
        let cond_shift = !cond_reasons.is_empty();
        let cond_reason_txt = if cond_shift {
            cond_reasons.join(",")
        } else {
            "-".to_string()
        };

        if cond_shift {
            wetness = clamp01(wetness + p.shift_boost);
            conf = clamp01(conf + 0.05);
        }

        // --- Hysteresis, mode A (dry vs intermediate) ---
        // A conditions shift relaxes, but never removes, the confirmation
        // requirement.
        let on_needed = if cond_shift {
            self.cfg.hold_on_updates.saturating_sub(1).max(1)
        } else {
            self.cfg.hold_on_updates
        };

        if wetness >= self.cfg.on_th {
            self.on_counter += 1;
            self.off_counter = 0;
        } else if wetness <= self.cfg.off_th {
            self.off_counter += 1;
            self.on_counter = 0;
        } else {
            // Soft zone: counters decay instead of resetting.
            self.on_counter = self.on_counter.saturating_sub(1);
            self.off_counter = self.off_counter.saturating_sub(1);
        }

        if !self.is_wet_mode && self.on_counter >= on_needed {
            self.is_wet_mode = true;
        }
        if self.is_wet_mode && self.off_counter >= self.cfg.hold_off_updates {
            self.is_wet_mode = false;
        }

        // --- Hysteresis, mode B (intermediate vs full wet) ---
        if self.is_wet_mode {
            if fullwet >= self.cfg.wet_on_th {
                self.wet_on_counter += 1;
                self.wet_off_counter = 0;
            } else if fullwet <= self.cfg.wet_off_th {
                self.wet_off_counter += 1;
                self.wet_on_counter = 0;
            } else {
                self.wet_on_counter = self.wet_on_counter.saturating_sub(1);
                self.wet_off_counter = self.wet_off_counter.saturating_sub(1);
            }

            if !self.is_fullwet_mode && self.wet_on_counter >= self.cfg.wet_hold_on_updates {
                self.is_fullwet_mode = true;
            }
            if self.is_fullwet_mode && self.wet_off_counter >= self.cfg.wet_hold_off_updates {
                self.is_fullwet_mode = false;
            }
        } else {
            self.is_fullwet_mode = false;
            self.wet_on_counter = 0;
            self.wet_off_counter = 0;
        }

        // --- Advice policy ---
        let tyre = input.current_tyre;
        let lr = input.laps_remaining;
        let mut advice = if lr <= 1 {
            PitAdvice::stay("1 lap or less remaining.")
        } else {
            match tyre.category() {
                TyreCategory::Slick => self.slick_advice(
                    &p,
                    wetness,
                    weather_med,
                    delta_is_med,
                    track_slope_cpm,
                    under_sc,
                    lr,
                ),
                _ => self.rain_tyre_advice(
                    &p,
                    tyre,
                    wetness,
                    wet_score,
                    conf,
                    weather_med,
                    delta_wi_med,
                    rain_now_med,
                    rain_next_med,
                    inter_share_med,
                    track_slope_cpm,
                    rain_3,
                    rain_5,
                    rain_10,
                    drying_soon,
                    under_sc,
                    input,
                ),
            }
        };

        // Prefer riding out a short shower over pitting into conditions that
        // will have reversed.
        if lr > 1
            && tyre.category() != TyreCategory::Slick
            && drying_soon
            && !under_sc
            && lr > p.avoid_refresh_min_lr
        {
            let rain_target = match &advice {
                PitAdvice::StayOut { .. } => true,
                PitAdvice::BoxIn { target, .. } => {
                    matches!(target, CompoundLabel::Inter | CompoundLabel::Wet)
                }
            };
            if rain_target {
                advice =
                    PitAdvice::stay("Forecast: drying soon; avoid an unnecessary tyre refresh.");
            }
        }

        // --- Wet <-> Inter lockout (anti flip-flop) ---
        advice = self.apply_lockout(
            now,
            advice,
            tyre,
            delta_wi_med,
            wet_score,
            expected_pace,
        );

        let lockout_remaining_s = self
            .lockout_until
            .filter(|t| *t > now)
            .map(|t| t.duration_since(now).as_secs())
            .unwrap_or(0);

        let mut trace = String::new();
        let _ = write!(
            trace,
            "wetness={wetness:.2} conf={conf:.2} mode={} fullwet={} wetScore={wet_score:.2} | \
             share(I+W)={} share(W)={} dI-S={} dW-I={} rainNow={} rainNext={} trackT={} \
             baseLoss={} | {}({cond_reason_txt}) | trackSlope={} nextLapMin={next_lap_min} \
             rainNL={} dryingSoon={drying_soon} heavyIncoming={heavy_incoming} \
             lockout={lockout_remaining_s}s",
            if self.is_wet_mode { "INTER" } else { "DRY" },
            if self.is_fullwet_mode { "ON" } else { "OFF" },
            fmt_opt(inter_share_med, 3),
            fmt_opt(wet_share_med, 3),
            fmt_opt(delta_is_med, 2),
            fmt_opt(delta_wi_med, 2),
            fmt_opt(rain_now_med, 1),
            fmt_opt(rain_next_med, 1),
            fmt_opt(track_temp_med, 1),
            fmt_opt(baseline_loss, 2),
            if cond_shift { "COND_SHIFT" } else { "stable" },
            fmt_opt(track_slope_cpm, 2),
            fmt_opt(rain_nl, 0),
        );

        StrategyAssessment {
            advice,
            wetness,
            confidence: conf,
            trace,
        }
    }

    /// Policy while on slicks: mode A gates every box call; before it
    /// confirms, a conditions shift only warns.
    #[allow(clippy::too_many_arguments)]
    fn slick_advice(
        &mut self,
        p: &RainTuning,
        wetness: f64,
        weather_med: Option<f64>,
        delta_is_med: Option<f64>,
        track_slope_cpm: Option<f64>,
        under_sc: bool,
        laps_remaining: u32,
    ) -> PitAdvice {
        let track_falling_fast = track_slope_cpm.is_some_and(|s| s <= p.cond_track_drop_cpm);
        let track_rising_fast = track_slope_cpm.is_some_and(|s| s >= p.slick_hold_warming_cpm);
        let w_enum = weather_med.map(|w| w.trunc() as i32);

        let mut reasons: Vec<&str> = Vec::new();
        if w_enum.is_some_and(|w| w >= 3) {
            reasons.push("w>=3");
        }
        if track_falling_fast {
            reasons.push("track_drop");
        }
        if delta_is_med.is_some_and(|d| d <= -0.25) {
            reasons.push("dIS<=-0.25");
        }
        let cond_shift = !reasons.is_empty();
        let reason_txt = if cond_shift { reasons.join(",") } else { "-".to_string() };

        if !self.is_wet_mode {
            return if cond_shift {
                PitAdvice::stay(format!(
                    "Conditions shifting ({reason_txt}); Inter likely soon."
                ))
            } else {
                PitAdvice::stay("On slicks: wetness not high enough for Inter yet.")
            };
        }

        if track_rising_fast
            && wetness < p.slick_hold_max_wetness
            && !under_sc
            && laps_remaining > 3
            && delta_is_med.is_none_or(|d| d > -0.8)
        {
            return PitAdvice::stay("Track warming again; try to stay out on slicks.");
        }

        let hard_weather = w_enum.is_some_and(|w| w >= p.slick_hard_weather_enum);
        let hard_wetness = wetness >= p.slick_hard_wetness;

        if hard_weather || hard_wetness || cond_shift {
            return PitAdvice::box_in(
                1,
                CompoundLabel::Inter,
                format!("Slicks unsafe: conditions shift ({reason_txt})."),
            );
        }

        if delta_is_med.is_some_and(|d| d < p.slick_delta_is_box) {
            return PitAdvice::box_in(1, CompoundLabel::Inter, "Pace delta: Inter is faster.");
        }

        let laps = if wetness > 0.80 || under_sc { 1 } else { 2 };
        PitAdvice::box_in(laps, CompoundLabel::Inter, "Wetness trend suggests Inter.")
    }

    /// Policy while already on a rain tyre: payback economics between Wet and
    /// Inter, and the confirmation ladder back to slicks.
    #[allow(clippy::too_many_arguments)]
    fn rain_tyre_advice(
        &mut self,
        p: &RainTuning,
        tyre: CompoundLabel,
        wetness: f64,
        wet_score: f64,
        conf: f64,
        weather_med: Option<f64>,
        delta_wi_med: Option<f64>,
        rain_now_med: Option<f64>,
        rain_next_med: Option<f64>,
        inter_share_med: Option<f64>,
        track_slope_cpm: Option<f64>,
        rain_3: Option<f64>,
        rain_5: Option<f64>,
        rain_10: Option<f64>,
        drying_soon: bool,
        under_sc: bool,
        input: &StrategyInput<'_>,
    ) -> PitAdvice {
        let is_inter = tyre == CompoundLabel::Inter;
        let is_wet = tyre == CompoundLabel::Wet;
        let laps_remaining = input.laps_remaining;

        if is_inter && self.is_fullwet_mode {
            // Wet recommended over Inter: only box when the pace gain pays
            // the stop back in the laps that are left.
            if delta_wi_med.is_some_and(|d| d < -p.wi_delta_min) {
                let gain_per_lap = (-delta_wi_med.unwrap_or(0.0)).max(0.0);
                return self.payback_call(
                    p,
                    CompoundLabel::Wet,
                    gain_per_lap,
                    input.pit_loss_s,
                    laps_remaining,
                    under_sc,
                );
            }
            let laps = if under_sc || wet_score > 0.88 { 1 } else { 2 };
            return PitAdvice::box_in(
                laps,
                CompoundLabel::Wet,
                "Rain intensity suggests switching to full wets.",
            );
        }

        if is_wet && !self.is_fullwet_mode && self.is_wet_mode {
            // Drying back toward Inter: symmetric payback logic.
            if delta_wi_med.is_some_and(|d| d > p.wi_delta_min) {
                let gain_per_lap = delta_wi_med.unwrap_or(0.0).max(0.0);
                return self.payback_call(
                    p,
                    CompoundLabel::Inter,
                    gain_per_lap,
                    input.pit_loss_s,
                    laps_remaining,
                    under_sc,
                );
            }
            let drying_now = wet_score <= 0.72 && conf >= p.dry_temp_conf_min;
            let forecast_dry = match (rain_3, rain_5) {
                (Some(r3), Some(r5)) => {
                    r3 < f64::from(p.fc_dry_3) && r5 < f64::from(p.fc_dry_5)
                }
                _ => rain_next_med.is_some_and(|r| r < f64::from(p.fc_dry_5)),
            };
            if drying_now && (forecast_dry || under_sc) {
                let laps = if under_sc { 1 } else { 2 };
                return PitAdvice::box_in(
                    laps,
                    CompoundLabel::Inter,
                    "Drying trend plus forecast: switch Wet to Inter.",
                );
            }
            return PitAdvice::stay("On wets: signals not strong enough to go back to Inter yet.");
        }

        // Drying all the way back to slicks.
        let w_enum = weather_med.map(|w| w.trunc() as i32);
        let mut hard_dry_exit = wetness <= 0.20
            && conf >= 0.58
            && rain_next_med.is_some_and(|r| r <= 5.0)
            && w_enum.is_some_and(|w| w <= 2);
        if !hard_dry_exit {
            if let (Some(r3), Some(r5), Some(r10)) = (rain_3, rain_5, rain_10) {
                if wetness <= 0.21
                    && conf >= 0.60
                    && r3 <= 5.0
                    && r5 <= 5.0
                    && r10 <= 10.0
                    && w_enum.unwrap_or(9) <= 2
                {
                    hard_dry_exit = true;
                }
            }
        }
        if hard_dry_exit {
            return PitAdvice::box_in(
                1,
                DRY_EXIT_TARGET,
                "Track dry: a rain tyre is no longer justified.",
            );
        }

        let track_warming = track_slope_cpm.is_some_and(|s| s >= p.dry_track_warming_cpm);
        let track_warming_fast =
            track_slope_cpm.is_some_and(|s| s >= p.dry_track_warming_fast_cpm);
        let fc_dry = match (rain_3, rain_5) {
            (Some(r3), Some(r5)) => r3 < 20.0 && r5 < 25.0,
            _ => rain_next_med.is_some_and(|r| r < 25.0),
        };
        let hard_dry = wetness <= 0.25
            && rain_now_med.is_some_and(|r| r <= 15.0)
            && (fc_dry || drying_soon);
        let low_inter_share = inter_share_med.is_some_and(|s| s < 0.20);

        if (hard_dry || !self.is_wet_mode) && !w_enum.is_some_and(|w| w >= 3) {
            if fc_dry && (track_warming || drying_soon) && wetness < 0.60 && low_inter_share {
                return PitAdvice::box_in(
                    1,
                    DRY_EXIT_TARGET,
                    "Drying confirmed: forecast low, track warming, low rain-tyre share.",
                );
            }
            if fc_dry && wetness < 0.72 && (track_warming_fast || low_inter_share) {
                let laps = if under_sc { 1 } else { 2 };
                return PitAdvice::box_in(
                    laps,
                    DRY_EXIT_TARGET,
                    "Drying trend: slicks soon (moderate confidence).",
                );
            }
            return PitAdvice::stay("Drying not confirmed enough for slicks yet.");
        }

        if is_wet {
            PitAdvice::stay("Stay on wets: wet mode still active.")
        } else {
            PitAdvice::stay("Stay on Inter: wet mode still active.")
        }
    }

    /// Box only if the per-lap gain pays back the pit loss with laps to
    /// spare; under safety car the spare-lap buffer drops to zero.
    fn payback_call(
        &mut self,
        p: &RainTuning,
        target: CompoundLabel,
        gain_per_lap: f64,
        pit_loss_s: f64,
        laps_remaining: u32,
        under_sc: bool,
    ) -> PitAdvice {
        let buffer_laps: u32 = if under_sc { 0 } else { 1 };
        let payback_laps =
            (pit_loss_s / gain_per_lap.max(p.wi_payback_min_gain)).ceil() as u32;
        if laps_remaining >= payback_laps + buffer_laps + 1 {
            let laps = if under_sc || gain_per_lap >= p.wi_fast_gain {
                1
            } else {
                2
            };
            PitAdvice::box_in(
                laps,
                target,
                format!(
                    "{target} faster by ~{gain_per_lap:.2}s/lap; payback ~{payback_laps} lap(s)."
                ),
            )
        } else {
            PitAdvice::stay(format!(
                "{target} faster, but not enough laps left to pay back a stop."
            ))
        }
    }

    /// Suppress opposite-direction Wet <-> Inter switches inside the lockout
    /// window unless conditions are unambiguous enough to override it.
    fn apply_lockout(
        &mut self,
        now: Instant,
        advice: PitAdvice,
        current_tyre: CompoundLabel,
        delta_wi_med: Option<f64>,
        wet_score: f64,
        expected_pace: Option<f64>,
    ) -> PitAdvice {
        let PitAdvice::BoxIn { target, .. } = &advice else {
            return advice;
        };
        let target = *target;

        let cur = match current_tyre.category() {
            TyreCategory::Inter => CompoundLabel::Inter,
            TyreCategory::Wet => CompoundLabel::Wet,
            TyreCategory::Slick => return advice,
        };
        if !matches!(target, CompoundLabel::Inter | CompoundLabel::Wet) || target == cur {
            return advice;
        }

        let emergency = delta_wi_med.is_some_and(|d| d.abs() >= 0.90)
            || wet_score >= 0.97
            || wet_score <= 0.25;

        if let Some(until) = self.lockout_until {
            if now < until && !emergency {
                let remaining = until.duration_since(now).as_secs();
                return PitAdvice::stay(format!(
                    "Lockout active ({remaining}s) to avoid a Wet/Inter flip-flop."
                ));
            }
        }

        let lap_s = expected_pace.unwrap_or(LOCKOUT_FALLBACK_LAP_S);
        let lock_laps = if cur == CompoundLabel::Wet && target == CompoundLabel::Inter {
            self.cfg.lockout_laps_wet_to_inter
        } else {
            self.cfg.lockout_laps_inter_to_wet
        };
        let duration = Duration::from_secs_f64((lock_laps * lap_s).max(LOCKOUT_MIN_S));
        self.lockout_until = Some(now + duration);

        advice
    }

    /// Median historical pace for (track, tyre), cached briefly to bound
    /// recomputation cost while the engine is called every emit tick.
    fn expected_pace_from_rows(
        &mut self,
        track: &str,
        tyre: CompoundLabel,
        rows: &[LapRow],
        now: Instant,
    ) -> Option<f64> {
        let key = (track.trim().to_string(), tyre);
        if let Some((cached_at, pace)) = self.baseline_cache.get(&key) {
            if now.saturating_duration_since(*cached_at) < BASELINE_CACHE_TTL {
                return Some(*pace);
            }
        }

        let times: Vec<f64> = rows
            .iter()
            .filter(|r| CompoundLabel::parse(&r.tyre) == Some(tyre))
            .filter_map(|r| r.lap_time_s)
            .filter(|t| (BASELINE_LAP_MIN_S..BASELINE_LAP_MAX_S).contains(t))
            .collect();

        let med = median(&times)?;
        self.baseline_cache.insert(key, (now, med));
        Some(med)
    }
}

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{v:.decimals$}"),
        None => "None".to_string(),
    }
}
