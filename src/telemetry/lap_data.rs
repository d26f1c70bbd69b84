//! LapData packet (id 2): lap times, pit/result status, lap-validity flags.
//!
//! The legacy protocol range needs two decisions the wire does not announce:
//! lap times switched from float seconds to u32 milliseconds after 2020, and
//! the per-car record layout drifted between releases. The record size is
//! derived from the payload length and each car picks whichever known layout
//! reads plausibly.

use log::debug;

use super::decoder::TelemetryDecoder;
use super::header::{ProtocolHeader, read_f32, read_u8, read_u16, read_u32};
use super::{GRID_SIZE, header};

/// Plausibility band for a derived legacy LapData record size.
const LEGACY_CAR_SIZE_MIN: usize = 40;
const LEGACY_CAR_SIZE_MAX: usize = 70;

/// Modern (2025+) LapData records are a fixed 57 bytes.
const MODERN_CAR_SIZE: usize = 57;

/// Last float-seconds protocol year; later legacy years use milliseconds.
const LAST_FLOAT_TIME_FORMAT: u16 = 2020;

pub(crate) fn decode(dec: &mut TelemetryDecoder, hdr: &ProtocolHeader, data: &[u8]) -> bool {
    if hdr.packet_format <= header::FORMAT_LEGACY_MAX {
        decode_legacy(dec, hdr, data)
    } else {
        decode_modern(dec, hdr, data)
    }
}

struct CarLap {
    last_ms: Option<u32>,
    current_ms: u32,
    sector1_ms: u32,
    sector2_ms: u32,
    lap_distance_m: f32,
    lap_num: u8,
    pit_status: u8,
    result_status: u8,
}

fn decode_legacy(dec: &mut TelemetryDecoder, hdr: &ProtocolHeader, data: &[u8]) -> bool {
    let base = hdr.header_size;
    let remaining = data.len().saturating_sub(base);
    if remaining == 0 {
        return false;
    }

    // Record size drifts between legacy releases; derive it and sanity-check
    // against the plausible band before trusting any offset.
    let car_size = dec
        .profile
        .and_then(|p| p.lap_car_size)
        .unwrap_or(remaining / GRID_SIZE);
    if !(LEGACY_CAR_SIZE_MIN..=LEGACY_CAR_SIZE_MAX).contains(&car_size)
        || remaining < GRID_SIZE * car_size
    {
        debug!(
            "lap data: implausible car size {} (len={} fmt={})",
            car_size,
            data.len(),
            hdr.packet_format
        );
        return false;
    }

    let times_are_float = dec
        .profile
        .map(|p| p.lap_time_is_float)
        .unwrap_or(hdr.packet_format <= LAST_FLOAT_TIME_FORMAT);
    let mut changed = false;

    for i in 0..GRID_SIZE {
        let off = base + i * car_size;

        let (last_ms, current_ms) = if times_are_float {
            let Some(last_s) = read_f32(data, off) else {
                continue;
            };
            let Some(cur_s) = read_f32(data, off + 4) else {
                continue;
            };
            let last_ms = (last_s > 0.0).then(|| (f64::from(last_s) * 1000.0).round() as u32);
            let cur_ms = if cur_s > 0.0 {
                (f64::from(cur_s) * 1000.0).round() as u32
            } else {
                0
            };
            (last_ms, cur_ms)
        } else {
            let Some(last_raw) = read_u32(data, off) else {
                continue;
            };
            let Some(cur_raw) = read_u32(data, off + 4) else {
                continue;
            };
            ((last_raw > 0).then_some(last_raw), cur_raw)
        };

        let Some(s1_ms) = read_u16(data, off + 8) else {
            continue;
        };
        let Some(s2_ms) = read_u16(data, off + 10) else {
            continue;
        };

        let Some((lap_distance_m, lap_num, pit_status, result_status)) =
            read_legacy_layout(data, off, car_size)
        else {
            continue;
        };

        changed |= apply_car(
            dec,
            i,
            CarLap {
                last_ms,
                current_ms,
                sector1_ms: u32::from(s1_ms),
                sector2_ms: u32::from(s2_ms),
                lap_distance_m,
                lap_num,
                pit_status,
                result_status,
            },
        );
    }

    changed
}

/// Two record layouts are seen in the legacy range. Probe both and pick the
/// one whose fields read plausibly; prefer the compact one when both do.
fn read_legacy_layout(data: &[u8], off: usize, car_size: usize) -> Option<(f32, u8, u8, u8)> {
    // Layout A (compact): lapDistance(12), lapNum(25), pit(26), result(37)
    let a = (
        read_f32(data, off + 12)?,
        read_u8(data, off + 25)?,
        read_u8(data, off + 26)?,
        if 37 < car_size {
            read_u8(data, off + 37)?
        } else {
            0
        },
    );
    if layout_plausible(a) {
        return Some(a);
    }

    // Layout B (53-byte): lapDistance(32), lapNum(46), pit(47), result(52)
    let b = (
        read_f32(data, off + 32)?,
        read_u8(data, off + 46)?,
        read_u8(data, off + 47)?,
        if 52 < car_size {
            read_u8(data, off + 52)?
        } else {
            0
        },
    );
    Some(b)
}

fn layout_plausible((lap_dist, lap_num, pit, result): (f32, u8, u8, u8)) -> bool {
    (-500.0..=20_000.0).contains(&lap_dist) && lap_num <= 80 && pit <= 2 && result <= 10
}

fn decode_modern(dec: &mut TelemetryDecoder, hdr: &ProtocolHeader, data: &[u8]) -> bool {
    let base = hdr.header_size;
    if data.len() < base + GRID_SIZE * MODERN_CAR_SIZE {
        return false;
    }

    let mut changed = false;
    for i in 0..GRID_SIZE {
        let off = base + i * MODERN_CAR_SIZE;

        let Some(last_raw) = read_u32(data, off) else {
            continue;
        };
        let Some(current_ms) = read_u32(data, off + 4) else {
            continue;
        };

        // Sector times are split into a millisecond part and a whole-minute part.
        let (Some(s1_part), Some(s1_min), Some(s2_part), Some(s2_min)) = (
            read_u16(data, off + 8),
            read_u8(data, off + 10),
            read_u16(data, off + 11),
            read_u8(data, off + 13),
        ) else {
            continue;
        };

        let (Some(lap_distance_m), Some(lap_num), Some(pit_status), Some(result_status)) = (
            read_f32(data, off + 20),
            read_u8(data, off + 33),
            read_u8(data, off + 34),
            read_u8(data, off + 45),
        ) else {
            continue;
        };

        changed |= apply_car(
            dec,
            i,
            CarLap {
                last_ms: (last_raw > 0).then_some(last_raw),
                current_ms,
                sector1_ms: u32::from(s1_part) + u32::from(s1_min) * 60_000,
                sector2_ms: u32::from(s2_part) + u32::from(s2_min) * 60_000,
                lap_distance_m,
                lap_num,
                pit_status,
                result_status,
            },
        );
    }

    changed
}

fn apply_car(dec: &mut TelemetryDecoder, idx: usize, lap: CarLap) -> bool {
    let mut changed = false;

    {
        let slot = &mut dec.state.cars[idx];
        slot.pit_status = lap.pit_status;
        slot.result_status = lap.result_status;
    }

    if idx == dec.state.player_car_index {
        let state = &mut dec.state;
        if state.player_lap_distance_m != Some(lap.lap_distance_m) {
            state.player_lap_distance_m = Some(lap.lap_distance_m);
            changed = true;
        }
        if state.player_current_lap_time_ms != Some(lap.current_ms) {
            state.player_current_lap_time_ms = Some(lap.current_ms);
            changed = true;
        }
        if state.player_sector1_time_ms != Some(lap.sector1_ms) {
            state.player_sector1_time_ms = Some(lap.sector1_ms);
            changed = true;
        }
        if state.player_sector2_time_ms != Some(lap.sector2_ms) {
            state.player_sector2_time_ms = Some(lap.sector2_ms);
            changed = true;
        }
        if state.player_pit_status != Some(lap.pit_status) {
            state.player_pit_status = Some(lap.pit_status);
            changed = true;
        }
        if state.player_current_lap_num != Some(lap.lap_num) {
            state.player_current_lap_num = Some(lap.lap_num);
            changed = true;
        }
    }

    if let Some(last_ms) = lap.last_ms {
        changed |= dec.on_last_lap(idx, last_ms);
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::testkit::{
        LapRecord, decoder_for_tests, legacy_lap_packet_float, legacy_lap_packet_ms,
        modern_lap_packet, modern_lap_packet_for_player,
    };
    use crate::telemetry::{LapFlag, TyreCategory};
    use std::time::Instant;

    #[test]
    fn test_modern_packet_updates_player_fields() {
        let (mut dec, _rx) = decoder_for_tests();
        let pkt = modern_lap_packet_for_player(
            &[(
                3,
                LapRecord {
                    last_lap_ms: 92_500,
                    current_lap_ms: 14_000,
                    lap_distance_m: 1200.5,
                    lap_num: 7,
                    pit_status: 0,
                    result_status: 2,
                },
            )],
            3,
        );
        dec.handle_payload(&pkt, Instant::now());

        assert_eq!(dec.state().player_last_lap_time_ms, Some(92_500));
        assert_eq!(dec.state().player_current_lap_time_ms, Some(14_000));
        assert_eq!(dec.state().player_lap_distance_m, Some(1200.5));
        assert_eq!(dec.state().player_current_lap_num, Some(7));
        assert_eq!(dec.state().cars[3].result_status, 2);
    }

    #[test]
    fn test_legacy_ms_packet_layout_a() {
        let (mut dec, _rx) = decoder_for_tests();
        let pkt = legacy_lap_packet_ms(
            2022,
            &[(
                0,
                LapRecord {
                    last_lap_ms: 88_000,
                    current_lap_ms: 10_000,
                    lap_distance_m: 800.0,
                    lap_num: 4,
                    pit_status: 0,
                    result_status: 2,
                },
            )],
        );
        dec.handle_payload(&pkt, Instant::now());
        assert_eq!(dec.state().player_last_lap_time_ms, Some(88_000));
        assert_eq!(dec.state().player_current_lap_num, Some(4));
    }

    #[test]
    fn test_legacy_float_packet_layout_b() {
        let (mut dec, _rx) = decoder_for_tests();
        let pkt = legacy_lap_packet_float(
            2020,
            &[(
                0,
                LapRecord {
                    last_lap_ms: 95_250,
                    current_lap_ms: 5_000,
                    lap_distance_m: 300.0,
                    lap_num: 2,
                    pit_status: 0,
                    result_status: 2,
                },
            )],
        );
        dec.handle_payload(&pkt, Instant::now());
        assert_eq!(dec.state().player_last_lap_time_ms, Some(95_250));
        assert_eq!(dec.state().player_current_lap_num, Some(2));
    }

    #[test]
    fn test_truncated_packet_is_skipped() {
        let (mut dec, _rx) = decoder_for_tests();
        let mut pkt = modern_lap_packet(&[(
            0,
            LapRecord {
                last_lap_ms: 90_000,
                result_status: 2,
                ..Default::default()
            },
        )]);
        pkt.truncate(pkt.len() - 400);
        dec.handle_payload(&pkt, Instant::now());
        assert_eq!(dec.state().player_last_lap_time_ms, None);
    }

    #[test]
    fn test_valid_lap_admitted_to_buffers() {
        let (mut dec, _rx) = decoder_for_tests();
        dec.state.cars[0].tyre_cat = Some(TyreCategory::Slick);
        let pkt = modern_lap_packet(&[(
            0,
            LapRecord {
                last_lap_ms: 91_000,
                result_status: 2,
                ..Default::default()
            },
        )]);
        dec.handle_payload(&pkt, Instant::now());

        assert_eq!(dec.state().cars[0].lap_flag, LapFlag::Ok);
        assert_eq!(dec.state().cars[0].laps.get(TyreCategory::Slick).len(), 1);
        // Player reference buffer (index 0 is the player here) too.
        assert_eq!(dec.your_laps.get(TyreCategory::Slick).len(), 1);
    }

    #[test]
    fn test_inlap_flagged_and_excluded() {
        let (mut dec, _rx) = decoder_for_tests();
        dec.state.cars[1].tyre_cat = Some(TyreCategory::Slick);
        let pkt = modern_lap_packet(&[(
            1,
            LapRecord {
                last_lap_ms: 240_000,
                pit_status: 1,
                result_status: 2,
                ..Default::default()
            },
        )]);
        dec.handle_payload(&pkt, Instant::now());
        assert_eq!(dec.state().cars[1].lap_flag, LapFlag::InLap);
        assert!(dec.state().cars[1].laps.get(TyreCategory::Slick).is_empty());
    }

    #[test]
    fn test_garbage_lap_time_ignored() {
        let (mut dec, _rx) = decoder_for_tests();
        let pkt = modern_lap_packet(&[(
            0,
            LapRecord {
                last_lap_ms: 20_000_000,
                result_status: 2,
                ..Default::default()
            },
        )]);
        dec.handle_payload(&pkt, Instant::now());
        assert_eq!(dec.state().player_last_lap_time_ms, None);
        assert_eq!(dec.state().cars[0].last_lap_ms, None);
    }
}
