pub mod engine;
pub mod forecast;
pub mod tuning;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use engine::{RainEngine, RainEngineConfig};
pub use tuning::RainTuning;

use crate::telemetry::CompoundLabel;

/// One historical lap row, as provided by the external lap database. The
/// engine treats these as opaque read-only input to baseline-pace
/// computation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LapRow {
    pub created_at: String,
    pub session: String,
    pub track: String,
    pub tyre: String,
    pub weather: String,
    pub lap_time_s: Option<f64>,
    pub fuel_load: Option<f64>,
    pub wear_fl: Option<f64>,
    pub wear_fr: Option<f64>,
    pub wear_rl: Option<f64>,
    pub wear_rr: Option<f64>,
}

/// The engine's pit recommendation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum PitAdvice {
    StayOut {
        reason: String,
    },
    BoxIn {
        laps: u8,
        target: CompoundLabel,
        reason: String,
    },
}

impl PitAdvice {
    pub(crate) fn stay(reason: impl Into<String>) -> Self {
        PitAdvice::StayOut {
            reason: reason.into(),
        }
    }

    pub(crate) fn box_in(laps: u8, target: CompoundLabel, reason: impl Into<String>) -> Self {
        PitAdvice::BoxIn {
            laps: laps.max(1),
            target,
            reason: reason.into(),
        }
    }

    pub fn is_box(&self) -> bool {
        matches!(self, PitAdvice::BoxIn { .. })
    }
}

impl fmt::Display for PitAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PitAdvice::StayOut { reason } => write!(f, "STAY OUT: {reason}"),
            PitAdvice::BoxIn {
                laps,
                target,
                reason,
            } => write!(f, "BOX IN {laps} for {target}: {reason}"),
        }
    }
}

/// Per-update inputs that do not live in the telemetry state.
#[derive(Clone, Debug)]
pub struct StrategyInput<'a> {
    pub track: &'a str,
    pub current_tyre: CompoundLabel,
    pub laps_remaining: u32,
    /// Estimated total time cost of a pit stop, seconds.
    pub pit_loss_s: f64,
    pub history: Option<&'a [LapRow]>,
    pub your_last_lap_s: Option<f64>,
}

/// Full engine output for one update.
#[derive(Clone, Debug)]
pub struct StrategyAssessment {
    pub advice: PitAdvice,
    /// Fused 0..1 estimate of how strongly conditions favor a rain tyre.
    pub wetness: f64,
    pub confidence: f64,
    /// Operator-facing diagnostic summary; not a stable machine contract.
    pub trace: String,
}
