pub(crate) mod car_damage;
pub(crate) mod car_status;
pub mod decoder;
pub mod dump;
pub mod filters;
pub mod header;
pub(crate) mod lap_data;
pub mod listener;
pub(crate) mod participants;
pub mod profiles;
pub mod replay;
pub(crate) mod session;
#[cfg(test)]
pub(crate) mod testkit;

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

pub use decoder::TelemetryDecoder;
pub use listener::UdpTelemetryListener;
pub use replay::ReplayTelemetryListener;
use serde::{Deserialize, Serialize};

/// Fixed grid size: every per-car packet body carries exactly 22 records.
/// A slot index identifies a car slot, not a stable driver identity.
pub const GRID_SIZE: usize = 22;

/// Recency depth of the rolling per-car and player lap buffers.
pub(crate) const LAP_BUFFER_CAP: usize = 5;

/// A completed lap this much slower than the previous one, while the
/// ignore-next-lap flag is armed, is classified as an outlap.
pub(crate) const OUTLAP_SLOW_MS: u32 = 8_000;

/// Laps at or above this magnitude imply time spent stationary in the pit.
pub(crate) const INLAP_MIN_MS: u32 = 200_000;

/// Coalescing interval for aggregate recomputation and emission (2 Hz).
pub(crate) const EMIT_INTERVAL: Duration = Duration::from_millis(500);

/// Coarse tyre class used by the rain logic and the field shares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TyreCategory {
    Slick,
    Inter,
    Wet,
}

impl TyreCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            TyreCategory::Slick => "SLICK",
            TyreCategory::Inter => "INTER",
            TyreCategory::Wet => "WET",
        }
    }
}

impl fmt::Display for TyreCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact tyre identifier, as opposed to the coarse [`TyreCategory`].
/// Slicks resolve to C1 (hardest) through C6 (softest) when the wire codes
/// allow it, `Slick` otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompoundLabel {
    C1,
    C2,
    C3,
    C4,
    C5,
    C6,
    Inter,
    Wet,
    Slick,
}

impl CompoundLabel {
    pub fn category(self) -> TyreCategory {
        match self {
            CompoundLabel::Inter => TyreCategory::Inter,
            CompoundLabel::Wet => TyreCategory::Wet,
            _ => TyreCategory::Slick,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompoundLabel::C1 => "C1",
            CompoundLabel::C2 => "C2",
            CompoundLabel::C3 => "C3",
            CompoundLabel::C4 => "C4",
            CompoundLabel::C5 => "C5",
            CompoundLabel::C6 => "C6",
            CompoundLabel::Inter => "INTER",
            CompoundLabel::Wet => "WET",
            CompoundLabel::Slick => "SLICK",
        }
    }

    /// Parse a label as found in historical lap rows ("C4", "INTERMEDIATE", ...).
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "C1" => Some(CompoundLabel::C1),
            "C2" => Some(CompoundLabel::C2),
            "C3" => Some(CompoundLabel::C3),
            "C4" => Some(CompoundLabel::C4),
            "C5" => Some(CompoundLabel::C5),
            "C6" => Some(CompoundLabel::C6),
            "INTER" | "INTERMEDIATE" => Some(CompoundLabel::Inter),
            "WET" => Some(CompoundLabel::Wet),
            "SLICK" | "DRY" => Some(CompoundLabel::Slick),
            _ => None,
        }
    }

    /// C1..C6 from a 1-based slick index; anything else falls back to `Slick`.
    pub(crate) fn from_slick_index(index: u8) -> Self {
        match index {
            1 => CompoundLabel::C1,
            2 => CompoundLabel::C2,
            3 => CompoundLabel::C3,
            4 => CompoundLabel::C4,
            5 => CompoundLabel::C5,
            6 => CompoundLabel::C6,
            _ => CompoundLabel::Slick,
        }
    }
}

impl fmt::Display for CompoundLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Safety car state from the Session packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyCar {
    None,
    Full,
    Virtual,
    Formation,
}

impl SafetyCar {
    pub(crate) fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(SafetyCar::None),
            1 => Some(SafetyCar::Full),
            2 => Some(SafetyCar::Virtual),
            3 => Some(SafetyCar::Formation),
            _ => None,
        }
    }
}

/// Validity classification of a car's most recently completed lap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum LapFlag {
    #[default]
    Ok,
    /// Inlap into the pit: pit status was set and the lap was very slow.
    InLap,
    /// Outlap after a tyre change, caught by the armed ignore flag.
    OutLap,
    /// Compound changed while the lap was accumulating; the lap is discarded.
    TyreSwap,
}

/// One weather forecast sample from the Session packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastSample {
    /// Minutes into the future; 0 means "now".
    pub minute: u8,
    pub rain_pct: u8,
    pub weather: u8,
}

/// Rolling recency buffer of lap times in seconds (capacity 5, oldest evicted).
#[derive(Clone, Debug, Default, Serialize)]
pub struct LapBuffer {
    samples: VecDeque<f64>,
}

impl LapBuffer {
    pub fn push(&mut self, lap_s: f64) {
        if self.samples.len() >= LAP_BUFFER_CAP {
            self.samples.pop_front();
        }
        self.samples.push_back(lap_s);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn median(&self) -> Option<f64> {
        filters::median(&self.values())
    }
}

/// Per-category lap buffers for one car (or for the player's reference laps).
#[derive(Clone, Debug, Default, Serialize)]
pub struct CategoryLaps {
    slick: LapBuffer,
    inter: LapBuffer,
    wet: LapBuffer,
}

impl CategoryLaps {
    pub fn get(&self, cat: TyreCategory) -> &LapBuffer {
        match cat {
            TyreCategory::Slick => &self.slick,
            TyreCategory::Inter => &self.inter,
            TyreCategory::Wet => &self.wet,
        }
    }

    pub fn get_mut(&mut self, cat: TyreCategory) -> &mut LapBuffer {
        match cat {
            TyreCategory::Slick => &mut self.slick,
            TyreCategory::Inter => &mut self.inter,
            TyreCategory::Wet => &mut self.wet,
        }
    }

    pub fn clear(&mut self) {
        self.slick.clear();
        self.inter.clear();
        self.wet.clear();
    }
}

/// Everything tracked for one of the 22 grid slots. Keeping the fields in one
/// struct keeps coupled invariants together: a tyre-category change resets
/// `last_lap_ms` and the lap flag in the same place.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CarSlot {
    pub tyre_cat: Option<TyreCategory>,
    pub tyre_compound: Option<CompoundLabel>,
    pub tyre_actual: Option<u8>,
    pub tyre_visual: Option<u8>,
    /// Compound seen while the car is in the pit; applied on pit exit so the
    /// new tyre never shows before the stop actually happened.
    pub pending_tyre: Option<TyreCategory>,
    /// 0 none, 1 pitting, 2 in pit area.
    pub pit_status: u8,
    /// 0 invalid, 1 inactive, 2 active, 3 finished, ...
    pub result_status: u8,
    pub last_lap_ms: Option<u32>,
    /// One-shot: the next completed lap is checked against the outlap
    /// heuristic, then the flag clears regardless of outcome.
    pub ignore_next_lap: bool,
    pub lap_flag: LapFlag,
    pub laps: CategoryLaps,
}

/// The central live-session aggregate. Single writer (the decode thread);
/// consumers receive it as a cloned snapshot through the emission channel.
#[derive(Clone, Debug, Default, Serialize)]
pub struct LiveState {
    // --- Session scalars ---
    pub safety_car_status: Option<SafetyCar>,
    /// 0 clear, 1 light cloud, 2 overcast, 3 light rain, 4 heavy rain, 5 storm
    pub weather: Option<u8>,
    /// Max marshal-zone flag: 0..3, None while unknown.
    pub track_flag: Option<i8>,
    pub rain_now_pct: Option<u8>,
    pub rain_fc_pct: Option<u8>,
    /// Forecast samples, time-ascending and deduplicated by minute offset.
    pub rain_fc_series: Option<Vec<ForecastSample>>,
    pub track_temp_c: Option<f32>,
    pub air_temp_c: Option<f32>,
    pub session_uid: Option<u64>,
    pub track_id: Option<i8>,
    pub session_type_id: Option<u8>,

    // --- Track geometry ---
    pub track_length_m: Option<u16>,
    pub sector2_start_m: Option<f32>,
    pub sector3_start_m: Option<f32>,

    // --- Game identity (from the packet header) ---
    pub packet_format: Option<u16>,
    pub game_year: Option<u8>,

    // --- Player ---
    pub player_car_index: usize,
    pub player_tyre_cat: Option<TyreCategory>,
    pub player_tyre_compound: Option<CompoundLabel>,
    pub player_tyre_visual: Option<u8>,
    pub player_tyre_actual: Option<u8>,
    pub player_fia_flag: Option<i8>,
    pub player_team_id: Option<u8>,
    pub player_team_name: Option<String>,
    pub player_current_lap_time_ms: Option<u32>,
    pub player_last_lap_time_ms: Option<u32>,
    pub player_lap_distance_m: Option<f32>,
    pub player_sector1_time_ms: Option<u32>,
    pub player_sector2_time_ms: Option<u32>,
    pub player_pit_status: Option<u8>,
    pub player_current_lap_num: Option<u8>,
    pub player_fuel_in_tank: Option<f32>,
    pub player_fuel_capacity: Option<f32>,
    pub player_fuel_remaining_laps: Option<f32>,
    /// Tyre wear as "worn %": 0 = new, 100 = fully worn.
    pub player_wear_fl: Option<f32>,
    pub player_wear_fr: Option<f32>,
    pub player_wear_rl: Option<f32>,
    pub player_wear_rr: Option<f32>,

    // --- Field aggregates (recomputed each emit, never mutated directly) ---
    /// Share of (INTER+WET) among active cars with a known tyre. None when no
    /// tyre is known yet; never a fabricated 0.0.
    pub inter_share: Option<f64>,
    pub inter_only_share: Option<f64>,
    pub wet_share: Option<f64>,
    pub pace_delta_inter_vs_slick_s: Option<f64>,
    pub pace_delta_wet_vs_inter_s: Option<f64>,
    pub pace_delta_wet_vs_slick_s: Option<f64>,
    /// Count of (INTER+WET) cars among active known-tyre cars.
    pub inter_count: Option<usize>,
    pub inter_only_count: Option<usize>,
    pub wet_count: Option<usize>,
    pub slick_count: Option<usize>,
    pub field_total_cars: Option<usize>,
    pub unknown_tyre_count: Option<usize>,

    // --- Player reference deltas (learned from the player's own laps) ---
    pub your_delta_inter_vs_slick_s: Option<f64>,
    pub your_delta_wet_vs_slick_s: Option<f64>,
    pub your_delta_wet_vs_inter_s: Option<f64>,
    /// e.g. "S:3 I:2 W:0"
    pub your_ref_counts: Option<String>,

    // --- Per-car slots, indexed 0..21 ---
    pub cars: [CarSlot; GRID_SIZE],
}
