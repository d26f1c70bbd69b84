//! CarDamage packet (id 10): tyre wear for the player's car.
//!
//! Wear arrives as four floats already expressed in percent (0 = new,
//! 100 = fully worn). Out-of-range values are rejected outright; fresh tyres
//! can legitimately report sub-1.0 values, so rescaling a 0..1 reading up to
//! 0..100 would corrupt real data.

use super::GRID_SIZE;
use super::decoder::TelemetryDecoder;
use super::header::{ProtocolHeader, read_f32};

/// The four tyresWear floats are all this decoder needs per car.
const WEAR_BYTES: usize = 16;

pub(crate) fn decode(dec: &mut TelemetryDecoder, hdr: &ProtocolHeader, data: &[u8]) -> bool {
    let base = hdr.header_size;
    let remaining = data.len().saturating_sub(base);
    if remaining == 0 {
        return false;
    }

    let car_size = remaining / GRID_SIZE;
    if car_size < WEAR_BYTES {
        return false;
    }

    let pidx = dec.state.player_car_index;
    let off = base + pidx * car_size;
    if off + WEAR_BYTES > data.len() {
        return false;
    }

    // Order kept consistent as FL, FR, RL, RR.
    let wear = [
        read_f32(data, off).and_then(accept_wear),
        read_f32(data, off + 4).and_then(accept_wear),
        read_f32(data, off + 8).and_then(accept_wear),
        read_f32(data, off + 12).and_then(accept_wear),
    ];

    let mut changed = false;
    let state = &mut dec.state;
    for (target, value) in [
        (&mut state.player_wear_fl, wear[0]),
        (&mut state.player_wear_fr, wear[1]),
        (&mut state.player_wear_rl, wear[2]),
        (&mut state.player_wear_rr, wear[3]),
    ] {
        if let Some(v) = value {
            if *target != Some(v) {
                *target = Some(v);
                changed = true;
            }
        }
    }
    changed
}

/// Reject values outside the percent range instead of rescaling them.
fn accept_wear(value: f32) -> Option<f32> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return None;
    }
    Some(value)
}
