//! Protocol-version-aware packet decoding into [`LiveState`].
//!
//! One `TelemetryDecoder` instance is owned by a single source thread (live
//! socket or replay file) and fed raw payloads in arrival order. Aggregate
//! recomputation and emission are coalesced behind a dirty flag: bursts of
//! packets overwrite pending state, they never queue work.

use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use log::{debug, info};

use super::filters::{Debounce, median, robust_accept_lap};
use super::header::ProtocolHeader;
use super::profiles::{self, GameProfile};
use super::{
    CategoryLaps, EMIT_INTERVAL, GRID_SIZE, INLAP_MIN_MS, LapFlag, LiveState, OUTLAP_SLOW_MS,
    SafetyCar, TyreCategory, car_damage, car_status, lap_data, participants, session,
};

const DEBOUNCE_UPDATES: u32 = 6;
const DEBOUNCE_MAX_AGE: Duration = Duration::from_millis(700);

/// Result status value meaning "actively racing".
const RESULT_ACTIVE: u8 = 2;

/// Per-driver compound deltas outside this band come from spins or outlaps
/// and are rejected before the field median.
const FIELD_DELTA_PLAUSIBLE_S: f64 = 10.0;
/// Per-car lap samples required on each side of a compound pair.
const DELTA_MIN_LAPS_PER_SIDE: usize = 2;
/// Qualifying drivers required before a field delta is published.
const DELTA_MIN_DRIVERS: usize = 3;

/// Last-lap values at or above this are wire garbage, not lap times.
const LAP_GARBAGE_MS: u32 = 10_000_000;

pub struct TelemetryDecoder {
    pub(crate) state: LiveState,
    pub(crate) profile: Option<&'static GameProfile>,
    pub(crate) deb_safety_car: Debounce<SafetyCar>,
    pub(crate) deb_weather: Debounce<u8>,
    pub(crate) deb_rain_now: Debounce<u8>,
    pub(crate) deb_rain_fc: Debounce<u8>,
    /// The player's own reference laps per tyre category.
    pub(crate) your_laps: CategoryLaps,
    last_session_uid: Option<u64>,
    dirty: bool,
    last_emit: Option<Instant>,
    sink: Sender<LiveState>,
}

impl TelemetryDecoder {
    pub fn new(sink: Sender<LiveState>) -> Self {
        Self {
            state: LiveState::default(),
            profile: None,
            deb_safety_car: Debounce::new(DEBOUNCE_UPDATES, DEBOUNCE_MAX_AGE),
            deb_weather: Debounce::new(DEBOUNCE_UPDATES, DEBOUNCE_MAX_AGE),
            deb_rain_now: Debounce::new(DEBOUNCE_UPDATES, DEBOUNCE_MAX_AGE),
            deb_rain_fc: Debounce::new(DEBOUNCE_UPDATES, DEBOUNCE_MAX_AGE),
            your_laps: CategoryLaps::default(),
            last_session_uid: None,
            dirty: false,
            last_emit: None,
            sink,
        }
    }

    pub fn state(&self) -> &LiveState {
        &self.state
    }

    /// Decode one raw payload and update the live state. Unrecognized or
    /// malformed payloads leave the state unchanged; this never panics and
    /// never returns an error to the receive loop.
    pub fn handle_payload(&mut self, data: &[u8], now: Instant) {
        let Some(hdr) = ProtocolHeader::parse(data) else {
            return;
        };

        self.state.packet_format = Some(hdr.packet_format);
        self.state.game_year = Some(hdr.game_year);
        // The player's slot can move between packets; always re-derive it.
        self.state.player_car_index = usize::from(hdr.player_car_index).min(GRID_SIZE - 1);
        self.state.session_uid = Some(hdr.session_uid);

        if self.profile.is_none() {
            self.profile = profiles::resolve(hdr.packet_format, Some(hdr.game_year));
            if let Some(profile) = self.profile {
                info!(
                    "using game profile {} (packet format {})",
                    profile.name, hdr.packet_format
                );
            }
        }

        // New session: reference lap buffers from the previous session would
        // poison the pace deltas.
        if self.last_session_uid != Some(hdr.session_uid) {
            self.last_session_uid = Some(hdr.session_uid);
            self.your_laps.clear();
            for slot in self.state.cars.iter_mut() {
                slot.laps.clear();
            }
        }

        let changed = match hdr.packet_id {
            1 => session::decode(self, &hdr, data, now),
            2 => lap_data::decode(self, &hdr, data),
            4 => participants::decode(self, &hdr, data),
            7 => car_status::decode(self, &hdr, data),
            10 => car_damage::decode(self, &hdr, data),
            _ => false,
        };
        if changed {
            self.dirty = true;
        }

        self.maybe_emit(now);
    }

    /// A completed lap arrived for a car slot: classify it, admit it to the
    /// rolling buffers if it survives, and mirror player fields.
    pub(crate) fn on_last_lap(&mut self, idx: usize, last_ms: u32) -> bool {
        if last_ms >= LAP_GARBAGE_MS {
            return false;
        }
        let player_idx = self.state.player_car_index;
        let slot = &mut self.state.cars[idx];
        let prev_ms = slot.last_lap_ms;
        if prev_ms == Some(last_ms) {
            return false;
        }
        slot.last_lap_ms = Some(last_ms);

        let mut flag = LapFlag::Ok;

        // Conservative inlap detection: pit status set AND the lap slow enough
        // to contain a standing stop.
        if slot.pit_status != 0 && last_ms >= INLAP_MIN_MS {
            flag = LapFlag::InLap;
        }

        if slot.ignore_next_lap {
            let slower_than_prev = prev_ms
                .map(|p| last_ms.saturating_sub(p) >= OUTLAP_SLOW_MS)
                .unwrap_or(false);
            if slower_than_prev || last_ms >= INLAP_MIN_MS {
                flag = LapFlag::OutLap;
            }
            // Consumed exactly once per arming, whatever the outcome.
            slot.ignore_next_lap = false;
        }

        slot.lap_flag = flag;

        if flag == LapFlag::Ok {
            if let Some(cat) = slot.tyre_cat {
                let lap_s = f64::from(last_ms) / 1000.0;
                let buf = slot.laps.get_mut(cat);
                if robust_accept_lap(&buf.values(), lap_s) {
                    buf.push(lap_s);
                }
                if idx == player_idx {
                    let ybuf = self.your_laps.get_mut(cat);
                    if robust_accept_lap(&ybuf.values(), lap_s) {
                        ybuf.push(lap_s);
                    }
                }
            }
        }

        if idx == player_idx {
            self.state.player_last_lap_time_ms = Some(last_ms);
        }

        true
    }

    /// Run the aggregator and emit if anything changed and the emit interval
    /// has elapsed. Latest value wins; intermediate updates are overwritten.
    pub(crate) fn maybe_emit(&mut self, now: Instant) {
        if !self.dirty {
            return;
        }
        if let Some(last) = self.last_emit {
            if now.saturating_duration_since(last) < EMIT_INTERVAL {
                return;
            }
        }
        self.last_emit = Some(now);
        self.dirty = false;

        self.refresh_field_metrics();
        // A gone consumer must not take the decode thread down with it.
        if self.sink.send(self.state.clone()).is_err() {
            debug!("state receiver disconnected; dropping snapshot");
        }
    }

    /// Recompute the field-wide aggregates: tyre shares among active cars and
    /// median pace deltas between compound pairs.
    pub(crate) fn refresh_field_metrics(&mut self) {
        // "Field" = only cars actively racing. Before any result status has
        // arrived, assume a full grid so shares don't read as an empty field.
        let mut active: Vec<usize> = (0..GRID_SIZE)
            .filter(|&i| self.state.cars[i].result_status == RESULT_ACTIVE)
            .collect();
        if active.is_empty() {
            active = (0..GRID_SIZE).collect();
        }

        let mut slick = 0usize;
        let mut inter = 0usize;
        let mut wet = 0usize;
        for &i in &active {
            match self.state.cars[i].tyre_cat {
                Some(TyreCategory::Slick) => slick += 1,
                Some(TyreCategory::Inter) => inter += 1,
                Some(TyreCategory::Wet) => wet += 1,
                None => {}
            }
        }

        // Unknown-tyre cars count toward the field total but never dilute the
        // share denominator.
        let denom = slick + inter + wet;
        let interwet = inter + wet;

        self.state.field_total_cars = Some(active.len());
        self.state.unknown_tyre_count = Some(active.len() - denom);

        if denom > 0 {
            let d = denom as f64;
            self.state.inter_share = Some(interwet as f64 / d);
            self.state.inter_only_share = Some(inter as f64 / d);
            self.state.wet_share = Some(wet as f64 / d);
        } else {
            // No data is not "no rain".
            self.state.inter_share = None;
            self.state.inter_only_share = None;
            self.state.wet_share = None;
        }

        self.state.inter_count = Some(interwet);
        self.state.inter_only_count = Some(inter);
        self.state.wet_count = Some(wet);
        self.state.slick_count = Some(slick);

        // Player tyre from the slot array.
        let pidx = self.state.player_car_index;
        self.state.player_tyre_cat = self.state.cars[pidx].tyre_cat;
        self.state.player_tyre_compound = self.state.cars[pidx].tyre_compound;

        // Field pace deltas are computed per driver first: comparing one
        // driver's inter laps against another driver's slick laps would bake
        // in the car difference.
        self.state.pace_delta_inter_vs_slick_s = self.field_delta(|slot| {
            let mut rain = slot.laps.get(TyreCategory::Inter).values();
            rain.extend(slot.laps.get(TyreCategory::Wet).values());
            let slicks = slot.laps.get(TyreCategory::Slick).values();
            Self::per_car_delta(&rain, &slicks)
        });
        self.state.pace_delta_wet_vs_inter_s = self.field_delta(|slot| {
            Self::per_car_delta(
                &slot.laps.get(TyreCategory::Wet).values(),
                &slot.laps.get(TyreCategory::Inter).values(),
            )
        });
        self.state.pace_delta_wet_vs_slick_s = self.field_delta(|slot| {
            Self::per_car_delta(
                &slot.laps.get(TyreCategory::Wet).values(),
                &slot.laps.get(TyreCategory::Slick).values(),
            )
        });

        // The player's own reference deltas (no cross-car bias to worry
        // about, so no plausibility band).
        let s = self.your_laps.get(TyreCategory::Slick);
        let i = self.your_laps.get(TyreCategory::Inter);
        let w = self.your_laps.get(TyreCategory::Wet);

        self.state.your_ref_counts = Some(format!("S:{} I:{} W:{}", s.len(), i.len(), w.len()));
        self.state.your_delta_inter_vs_slick_s = Self::reference_delta(i, s);
        self.state.your_delta_wet_vs_slick_s = Self::reference_delta(w, s);
        self.state.your_delta_wet_vs_inter_s = Self::reference_delta(w, i);
    }

    /// Median of plausible per-car deltas; published only with enough drivers.
    fn field_delta(&self, per_car: impl Fn(&super::CarSlot) -> Option<f64>) -> Option<f64> {
        let deltas: Vec<f64> = self
            .state
            .cars
            .iter()
            .filter_map(|slot| per_car(slot))
            .filter(|d| d.abs() < FIELD_DELTA_PLAUSIBLE_S)
            .collect();
        if deltas.len() >= DELTA_MIN_DRIVERS {
            median(&deltas)
        } else {
            None
        }
    }

    fn per_car_delta(a: &[f64], b: &[f64]) -> Option<f64> {
        if a.len() >= DELTA_MIN_LAPS_PER_SIDE && b.len() >= DELTA_MIN_LAPS_PER_SIDE {
            Some(median(a)? - median(b)?)
        } else {
            None
        }
    }

    fn reference_delta(a: &super::LapBuffer, b: &super::LapBuffer) -> Option<f64> {
        if a.len() >= DELTA_MIN_LAPS_PER_SIDE && b.len() >= DELTA_MIN_LAPS_PER_SIDE {
            Some(a.median()? - b.median()?)
        } else {
            None
        }
    }
}
