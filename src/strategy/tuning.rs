//! Tuning constants for the rain engine, gathered in one place so the fusion
//! weights and thresholds can be reviewed (and adjusted) together.

#[derive(Clone, Debug)]
pub struct RainTuning {
    // --- Wetness fusion / signal weights ---
    pub w_weather_enum: f64,
    pub w_rain_now: f64,
    pub w_temp_trend: f64,
    pub w_delta_is: f64,
    pub w_inter_share: f64,
    pub w_forecast: f64,
    pub w_baseline_loss: f64,

    // rain_now -> wetness mapping
    pub rain_now_map_lo: f64,
    pub rain_now_map_span: f64,
    /// Wetness floor as a fraction of the rain-now signal: live rain on the
    /// HUD must never be masked by a stale field-pace computation.
    pub rain_now_floor_factor: f64,

    // cold-track early switch boost
    pub cold_track_ref_c: f64,
    pub cold_track_span_c: f64,
    pub cold_track_boost_max: f64,

    // --- Confidence model ---
    pub conf_base: f64,
    pub conf_per_signal: f64,
    pub conf_samples_factor: f64,

    // --- Condition shift detection (slick -> inter responsiveness) ---
    pub cond_rain_now_on: f64,
    pub cond_track_drop_cpm: f64,
    pub cond_delta_is_on: f64,
    pub cond_fc_ramp_3to5: f64,
    pub shift_boost: f64,

    // --- Slick -> Inter thresholds ---
    pub slick_hold_warming_cpm: f64,
    pub slick_hold_max_wetness: f64,
    pub slick_hard_weather_enum: i32,
    pub slick_hard_wetness: f64,
    pub slick_delta_is_box: f64,

    // --- Wet <-> Inter payback thresholds ---
    pub wi_delta_min: f64,
    pub wi_payback_min_gain: f64,
    pub wi_fast_gain: f64,

    // --- Inter -> Slick (dry exit) thresholds ---
    pub dry_track_warming_cpm: f64,
    pub dry_track_warming_fast_cpm: f64,
    pub dry_temp_conf_min: f64,

    // forecast gates (absolute envelope, rain %)
    pub fc_dry_3: i32,
    pub fc_dry_5: i32,

    // --- Guards ---
    /// Don't burn a stop to ride out a short shower with this many laps left.
    pub avoid_refresh_min_lr: u32,
}

impl Default for RainTuning {
    fn default() -> Self {
        Self {
            w_weather_enum: 0.15,
            w_rain_now: 0.25,
            w_temp_trend: 0.22,
            w_delta_is: 0.35,
            w_inter_share: 0.25,
            w_forecast: 0.20,
            w_baseline_loss: 0.20,

            rain_now_map_lo: 5.0,
            rain_now_map_span: 55.0,
            rain_now_floor_factor: 0.75,

            cold_track_ref_c: 22.0,
            cold_track_span_c: 18.0,
            cold_track_boost_max: 0.08,

            conf_base: 0.15,
            conf_per_signal: 0.20,
            conf_samples_factor: 0.15,

            cond_rain_now_on: 18.0,
            cond_track_drop_cpm: -0.45,
            cond_delta_is_on: -0.25,
            cond_fc_ramp_3to5: 18.0,
            shift_boost: 0.08,

            slick_hold_warming_cpm: 0.35,
            slick_hold_max_wetness: 0.82,
            slick_hard_weather_enum: 4,
            slick_hard_wetness: 0.88,
            slick_delta_is_box: -0.30,

            wi_delta_min: 0.05,
            wi_payback_min_gain: 0.10,
            wi_fast_gain: 0.45,

            dry_track_warming_cpm: 0.25,
            dry_track_warming_fast_cpm: 0.40,
            dry_temp_conf_min: 0.55,

            fc_dry_3: 20,
            fc_dry_5: 25,

            avoid_refresh_min_lr: 3,
        }
    }
}
