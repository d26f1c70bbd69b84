//! Session packet (id 1): weather, rain forecast, safety car, track geometry.

use std::time::Instant;

use log::debug;

use super::decoder::TelemetryDecoder;
use super::header::{ProtocolHeader, read_f32, read_i8, read_u8, read_u16};
use super::{ForecastSample, SafetyCar};

/// Anything shorter cannot be a session packet body.
const MIN_SESSION_LEN: usize = 150;

/// The marshal-zone array is a fixed 21 entries of 5 bytes each.
const MARSHAL_ZONE_COUNT: usize = 21;
const MARSHAL_ZONE_STRIDE: usize = 5;

/// One weather forecast sample is 8 bytes on the wire.
const FORECAST_STRIDE: usize = 8;

pub(crate) fn decode(
    dec: &mut TelemetryDecoder,
    hdr: &ProtocolHeader,
    data: &[u8],
    now: Instant,
) -> bool {
    if data.len() < MIN_SESSION_LEN {
        return false;
    }

    let base = hdr.header_size;
    let mut changed = false;

    if let Some(sess_type) = read_u8(data, base + 6) {
        if dec.state.session_type_id != Some(sess_type) {
            dec.state.session_type_id = Some(sess_type);
            changed = true;
        }
    }

    if let Some(track_id) = read_i8(data, base + 7) {
        if dec.state.track_id != Some(track_id) {
            dec.state.track_id = Some(track_id);
            changed = true;
        }
    }

    if let Some(track_len) = read_u16(data, base + 4) {
        if track_len > 0 && dec.state.track_length_m != Some(track_len) {
            dec.state.track_length_m = Some(track_len);
            changed = true;
        }
    }

    if let Some(temp) = read_i8(data, base + 1) {
        let temp = f32::from(temp);
        if dec.state.track_temp_c != Some(temp) {
            dec.state.track_temp_c = Some(temp);
            changed = true;
        }
    }
    if let Some(temp) = read_i8(data, base + 2) {
        let temp = f32::from(temp);
        if dec.state.air_temp_c != Some(temp) {
            dec.state.air_temp_c = Some(temp);
            changed = true;
        }
    }

    changed |= apply_sector_starts(dec, hdr, data);
    changed |= apply_track_flag(dec, data, base);

    let weather_raw = match read_u8(data, base) {
        Some(w) => w,
        None => return changed,
    };

    let safety_car_off = base + 19 + MARSHAL_ZONE_COUNT * MARSHAL_ZONE_STRIDE;
    if safety_car_off + 3 >= data.len() {
        return changed;
    }

    let sc_raw = data[safety_car_off];
    let num_fc = data[safety_car_off + 2] as usize;
    let fc_off = safety_car_off + 3;

    // --- Rain: current + forecast, from the forecast sample array ---
    let mut rain_now_raw = None;
    let mut rain_fc_raw = None;
    dec.state.rain_fc_series = None;

    if num_fc > 0 && fc_off + num_fc * FORECAST_STRIDE <= data.len() {
        let mut series: Vec<ForecastSample> = Vec::with_capacity(num_fc);
        for j in 0..num_fc {
            let o = fc_off + j * FORECAST_STRIDE;
            let (Some(minute), Some(weather), Some(rain_pct)) = (
                read_u8(data, o + 1),
                read_u8(data, o + 2),
                read_u8(data, o + 7),
            ) else {
                continue;
            };
            if minute <= 240 && weather <= 5 && rain_pct <= 100 {
                series.push(ForecastSample {
                    minute,
                    rain_pct,
                    weather,
                });
            }
        }

        // Time-ascending, one sample per minute offset (first wins).
        series.sort_by_key(|s| s.minute);
        series.dedup_by_key(|s| s.minute);

        if !series.is_empty() {
            rain_now_raw = series.iter().find(|s| s.minute == 0).map(|s| s.rain_pct);
            rain_fc_raw = series
                .iter()
                .find(|s| s.minute > 0)
                .or(series.first())
                .map(|s| s.rain_pct);
            dec.state.rain_fc_series = Some(series);
        }
    }

    if let Some(rain_now) = rain_now_raw {
        if let Some(stable) = dec.deb_rain_now.update(rain_now, now) {
            if dec.state.rain_now_pct != Some(stable) {
                dec.state.rain_now_pct = Some(stable);
                changed = true;
            }
        }
    }

    if let Some(rain_fc) = rain_fc_raw {
        if let Some(stable) = dec.deb_rain_fc.update(rain_fc, now) {
            if dec.state.rain_fc_pct != Some(stable) {
                dec.state.rain_fc_pct = Some(stable);
                changed = true;
            }
        }
    }

    if weather_raw <= 5 {
        if let Some(stable) = dec.deb_weather.update(weather_raw, now) {
            if dec.state.weather != Some(stable) {
                dec.state.weather = Some(stable);
                changed = true;
            }
        }
    }

    if let Some(sc) = SafetyCar::from_wire(sc_raw) {
        if let Some(stable) = dec.deb_safety_car.update(sc, now) {
            if dec.state.safety_car_status != Some(stable) {
                dec.state.safety_car_status = Some(stable);
                changed = true;
            }
        }
    }

    changed
}

/// Sector 2/3 start distances live in the tail of modern session packets.
/// Older releases don't carry them; the thirds approximation only applies
/// when the resolved profile explicitly enables it.
fn apply_sector_starts(dec: &mut TelemetryDecoder, hdr: &ProtocolHeader, data: &[u8]) -> bool {
    let track_len = match dec.state.track_length_m {
        Some(l) if l > 0 => f32::from(l),
        _ => return false,
    };

    let carries_tail = dec
        .profile
        .map(|p| p.has_sector_start_distances)
        .unwrap_or(hdr.packet_format >= 2025);

    let mut starts: Option<(f32, f32)> = None;
    if carries_tail && data.len() >= 8 {
        if let (Some(s2), Some(s3)) = (
            read_f32(data, data.len() - 8),
            read_f32(data, data.len() - 4),
        ) {
            if 0.0 < s2 && s2 < s3 && s3 < track_len {
                starts = Some((s2, s3));
            }
        }
    }

    if starts.is_none() {
        if let Some(profile) = dec.profile {
            if let Some((f2, f3)) = profile.sector_fallback {
                let f2 = f2.clamp(0.10, 0.60);
                let f3 = f3.clamp(0.40, 0.90);
                if f2 < f3 {
                    starts = Some((track_len * f2, track_len * f3));
                }
            }
        }
    }

    let Some((s2, s3)) = starts else {
        return false;
    };

    let mut changed = false;
    if dec.state.sector2_start_m != Some(s2) {
        dec.state.sector2_start_m = Some(s2);
        changed = true;
    }
    if dec.state.sector3_start_m != Some(s3) {
        dec.state.sector3_start_m = Some(s3);
        changed = true;
    }
    changed
}

/// Track flag = the worst flag currently shown in any marshal zone.
fn apply_track_flag(dec: &mut TelemetryDecoder, data: &[u8], base: usize) -> bool {
    let track_flag = read_u8(data, base + 18).and_then(|num_zones| {
        let zones = (num_zones as usize).min(MARSHAL_ZONE_COUNT);
        let start = base + 19;
        let mut max_flag: Option<i8> = None;
        for j in 0..zones {
            let Some(zone_flag) = read_i8(data, start + j * MARSHAL_ZONE_STRIDE + 4) else {
                continue;
            };
            // -1 marks an invalid/unused zone.
            if zone_flag >= 0 {
                max_flag = Some(max_flag.map_or(zone_flag, |m| m.max(zone_flag)));
            }
        }
        max_flag
    });

    if dec.state.track_flag != track_flag {
        debug!("track flag -> {:?}", track_flag);
        dec.state.track_flag = track_flag;
        true
    } else {
        false
    }
}
