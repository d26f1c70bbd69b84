//! CarStatus packet (id 7): tyre compounds, FIA flag, fuel.

use log::debug;

use super::decoder::TelemetryDecoder;
use super::header::{ProtocolHeader, read_f32, read_i8, read_u8};
use super::{CompoundLabel, GRID_SIZE, LapFlag, TyreCategory};

/// Plausibility band for a derived CarStatus record size.
const CAR_SIZE_MIN: usize = 45;
const CAR_SIZE_MAX: usize = 80;

/// Visual compound codes for the rain tyres (Codemasters mapping).
const VISUAL_INTER: u8 = 7;
const VISUAL_WET: u8 = 8;

pub(crate) fn decode(dec: &mut TelemetryDecoder, hdr: &ProtocolHeader, data: &[u8]) -> bool {
    let base = hdr.header_size;
    let remaining = data.len().saturating_sub(base);
    if remaining == 0 {
        return false;
    }

    let car_size = dec
        .profile
        .and_then(|p| p.car_status_size)
        .unwrap_or(remaining / GRID_SIZE);
    if !(CAR_SIZE_MIN..=CAR_SIZE_MAX).contains(&car_size) || remaining < GRID_SIZE * car_size {
        debug!(
            "car status: implausible car size {} (len={} fmt={})",
            car_size,
            data.len(),
            hdr.packet_format
        );
        return false;
    }

    let player_idx = dec.state.player_car_index;
    let mut changed = false;

    for i in 0..GRID_SIZE {
        let off = base + i * car_size;
        if off + car_size > data.len() {
            break;
        }

        let (Some(actual), Some(visual)) = (read_u8(data, off + 25), read_u8(data, off + 26))
        else {
            continue;
        };

        let tyre_cat = match visual {
            VISUAL_WET => TyreCategory::Wet,
            VISUAL_INTER => TyreCategory::Inter,
            _ => TyreCategory::Slick,
        };
        let label = compound_label(Some(actual), Some(visual), tyre_cat, hdr.packet_format);

        if i == player_idx {
            if let Some(fia_flag) = read_i8(data, off + 28) {
                if dec.state.player_fia_flag != Some(fia_flag) {
                    dec.state.player_fia_flag = Some(fia_flag);
                    changed = true;
                }
            }
            changed |= update_player_fuel(dec, data, off);
            dec.state.player_tyre_actual = Some(actual);
            dec.state.player_tyre_visual = Some(visual);
        }

        let slot = &mut dec.state.cars[i];
        slot.tyre_actual = Some(actual);
        slot.tyre_visual = Some(visual);
        slot.tyre_compound = Some(label);

        if slot.pit_status == 1 || slot.pit_status == 2 {
            // While the car sits in the pit the new compound is only
            // remembered; it becomes active on pit exit.
            slot.pending_tyre = Some(tyre_cat);
        } else {
            slot.pending_tyre = None;
            let prev_cat = slot.tyre_cat;
            if prev_cat != Some(tyre_cat) {
                slot.tyre_cat = Some(tyre_cat);
                changed = true;

                // The category usually flips before the next lap-time event,
                // so the accumulating lap would be misattributed to the new
                // compound. Discard it and arm the outlap check.
                slot.last_lap_ms = None;
                slot.lap_flag = LapFlag::TyreSwap;
                if prev_cat.is_some() {
                    slot.ignore_next_lap = true;
                }
            }
        }
    }

    changed
}

fn update_player_fuel(dec: &mut TelemetryDecoder, data: &[u8], off: usize) -> bool {
    let mut changed = false;
    if let Some(fuel) = read_f32(data, off + 5) {
        if dec.state.player_fuel_in_tank != Some(fuel) {
            dec.state.player_fuel_in_tank = Some(fuel);
            changed = true;
        }
    }
    if let Some(capacity) = read_f32(data, off + 9) {
        if dec.state.player_fuel_capacity != Some(capacity) {
            dec.state.player_fuel_capacity = Some(capacity);
            changed = true;
        }
    }
    if let Some(laps) = read_f32(data, off + 13) {
        if dec.state.player_fuel_remaining_laps != Some(laps) {
            dec.state.player_fuel_remaining_laps = Some(laps);
            changed = true;
        }
    }
    changed
}

/// Map the wire compound codes to an exact label.
///
/// Slick codes come in two ranges (16..=21 and, on older releases, 0..=5).
/// From protocol year 2025 on, the observed mapping runs in the opposite
/// direction of the legacy one (code 16 is C6, not C1). This inversion is an
/// observed behavior, not documented by the protocol; it is applied exactly
/// as observed.
pub(crate) fn compound_label(
    actual: Option<u8>,
    visual: Option<u8>,
    tyre_cat: TyreCategory,
    packet_format: u16,
) -> CompoundLabel {
    match tyre_cat {
        TyreCategory::Inter => return CompoundLabel::Inter,
        TyreCategory::Wet => return CompoundLabel::Wet,
        TyreCategory::Slick => {}
    }

    // Prefer the visual code (what the HUD shows) when present.
    let Some(code) = visual.or(actual) else {
        return CompoundLabel::Slick;
    };
    let modern = packet_format >= 2025;

    if (16..=21).contains(&code) {
        let index = if modern { 22 - code } else { code - 15 };
        return CompoundLabel::from_slick_index(index);
    }
    if code <= 5 {
        let index = if modern { 6 - code } else { code + 1 };
        return CompoundLabel::from_slick_index(index);
    }

    CompoundLabel::Slick
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::testkit::{car_status_packet, decoder_for_tests};
    use std::time::Instant;

    #[test]
    fn test_compound_mapping_inverts_from_2025() {
        // Modern: 16 -> C6 ... 21 -> C1
        assert_eq!(
            compound_label(None, Some(16), TyreCategory::Slick, 2025),
            CompoundLabel::C6
        );
        assert_eq!(
            compound_label(None, Some(21), TyreCategory::Slick, 2025),
            CompoundLabel::C1
        );
        // Legacy: 16 -> C1 ... 21 -> C6
        assert_eq!(
            compound_label(None, Some(16), TyreCategory::Slick, 2023),
            CompoundLabel::C1
        );
        assert_eq!(
            compound_label(None, Some(21), TyreCategory::Slick, 2023),
            CompoundLabel::C6
        );

        // The two mappings are exact inverses over the shared range.
        for code in 16u8..=21 {
            let legacy = compound_label(None, Some(code), TyreCategory::Slick, 2020);
            let modern = compound_label(None, Some(37 - code), TyreCategory::Slick, 2025);
            assert_eq!(legacy, modern);
        }
    }

    #[test]
    fn test_compound_mapping_low_range() {
        assert_eq!(
            compound_label(None, Some(0), TyreCategory::Slick, 2020),
            CompoundLabel::C1
        );
        assert_eq!(
            compound_label(None, Some(5), TyreCategory::Slick, 2020),
            CompoundLabel::C6
        );
        assert_eq!(
            compound_label(None, Some(0), TyreCategory::Slick, 2025),
            CompoundLabel::C6
        );
        // Unknown codes degrade to the coarse label instead of failing.
        assert_eq!(
            compound_label(None, Some(12), TyreCategory::Slick, 2025),
            CompoundLabel::Slick
        );
    }

    #[test]
    fn test_rain_categories_keep_their_label() {
        assert_eq!(
            compound_label(Some(7), Some(7), TyreCategory::Inter, 2025),
            CompoundLabel::Inter
        );
        assert_eq!(
            compound_label(Some(8), Some(8), TyreCategory::Wet, 2025),
            CompoundLabel::Wet
        );
    }

    #[test]
    fn test_tyre_change_on_track_invalidates_lap() {
        let (mut dec, _rx) = decoder_for_tests();
        let t = Instant::now();

        dec.handle_payload(&car_status_packet(2025, &[(4, 18, 18)]), t);
        assert_eq!(dec.state().cars[4].tyre_cat, Some(TyreCategory::Slick));
        assert!(!dec.state().cars[4].ignore_next_lap);

        dec.state.cars[4].last_lap_ms = Some(90_000);
        dec.handle_payload(&car_status_packet(2025, &[(4, 7, 7)]), t);
        let slot = &dec.state().cars[4];
        assert_eq!(slot.tyre_cat, Some(TyreCategory::Inter));
        assert_eq!(slot.last_lap_ms, None);
        assert_eq!(slot.lap_flag, crate::telemetry::LapFlag::TyreSwap);
        assert!(slot.ignore_next_lap);
    }

    #[test]
    fn test_first_category_sighting_does_not_arm_outlap() {
        let (mut dec, _rx) = decoder_for_tests();
        dec.handle_payload(&car_status_packet(2025, &[(2, 7, 7)]), Instant::now());
        assert_eq!(dec.state().cars[2].tyre_cat, Some(TyreCategory::Inter));
        assert!(!dec.state().cars[2].ignore_next_lap);
    }

    #[test]
    fn test_category_change_buffered_during_pit() {
        let (mut dec, _rx) = decoder_for_tests();
        let t = Instant::now();
        dec.handle_payload(&car_status_packet(2025, &[(6, 18, 18)]), t);
        assert_eq!(dec.state().cars[6].tyre_cat, Some(TyreCategory::Slick));

        // In the pit: the new compound is held back.
        dec.state.cars[6].pit_status = 2;
        dec.handle_payload(&car_status_packet(2025, &[(6, 8, 8)]), t);
        assert_eq!(dec.state().cars[6].tyre_cat, Some(TyreCategory::Slick));
        assert_eq!(dec.state().cars[6].pending_tyre, Some(TyreCategory::Wet));

        // Pit exit: the buffered compound becomes active.
        dec.state.cars[6].pit_status = 0;
        dec.handle_payload(&car_status_packet(2025, &[(6, 8, 8)]), t);
        assert_eq!(dec.state().cars[6].tyre_cat, Some(TyreCategory::Wet));
        assert_eq!(dec.state().cars[6].pending_tyre, None);
    }

    #[test]
    fn test_player_fuel_extracted() {
        let (mut dec, _rx) = decoder_for_tests();
        dec.handle_payload(&car_status_packet(2025, &[(0, 18, 18)]), Instant::now());
        assert_eq!(dec.state().player_fuel_in_tank, Some(40.0));
        assert_eq!(dec.state().player_fuel_capacity, Some(110.0));
        assert_eq!(dec.state().player_fuel_remaining_laps, Some(22.5));
    }
}
