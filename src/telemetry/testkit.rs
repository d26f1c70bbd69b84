//! Synthetic packet builders shared by the decoder unit tests.

#![allow(dead_code)]

use std::sync::mpsc::{self, Receiver};

use super::LiveState;
use super::decoder::TelemetryDecoder;
use super::header::{LEGACY_HEADER_SIZE, MODERN_HEADER_SIZE};

pub(crate) fn decoder_for_tests() -> (TelemetryDecoder, Receiver<LiveState>) {
    let (tx, rx) = mpsc::channel();
    (TelemetryDecoder::new(tx), rx)
}

pub(crate) fn modern_header(packet_id: u8) -> Vec<u8> {
    header_bytes(2025, packet_id)
}

pub(crate) fn header_bytes(packet_format: u16, packet_id: u8) -> Vec<u8> {
    header_bytes_for_player(packet_format, packet_id, 0)
}

pub(crate) fn header_bytes_for_player(
    packet_format: u16,
    packet_id: u8,
    player_idx: u8,
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&packet_format.to_le_bytes());
    if packet_format >= 2025 {
        out.push((packet_format - 2000) as u8); // game year
    }
    out.push(1); // major
    out.push(0); // minor
    out.push(1); // packet version
    out.push(packet_id);
    out.extend_from_slice(&1234u64.to_le_bytes()); // session uid
    out.extend_from_slice(&0.0f32.to_le_bytes()); // session time
    out.extend_from_slice(&1u32.to_le_bytes()); // frame id
    if packet_format >= 2025 {
        out.extend_from_slice(&1u32.to_le_bytes()); // overall frame id
    }
    out.push(player_idx);
    out.push(255);
    let expected = if packet_format >= 2025 {
        MODERN_HEADER_SIZE
    } else {
        LEGACY_HEADER_SIZE
    };
    assert_eq!(out.len(), expected);
    out
}

fn write_f32(buf: &mut [u8], offset: usize, value: f32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

// ---------------------------------------------------------------------------
// Session packet (id 1), modern layout
// ---------------------------------------------------------------------------

pub(crate) struct SessionPacketBuilder {
    weather: u8,
    track_temp: i8,
    air_temp: i8,
    track_length: u16,
    session_type: u8,
    track_id: i8,
    marshal_flags: Vec<i8>,
    safety_car: u8,
    /// (minute, rain_pct, weather)
    forecast: Vec<(u8, u8, u8)>,
    sector_starts: Option<(f32, f32)>,
}

impl SessionPacketBuilder {
    pub(crate) fn new() -> Self {
        Self {
            weather: 0,
            track_temp: 30,
            air_temp: 25,
            track_length: 5000,
            session_type: 10,
            track_id: 3,
            marshal_flags: Vec::new(),
            safety_car: 0,
            forecast: Vec::new(),
            sector_starts: None,
        }
    }

    pub(crate) fn weather(mut self, weather: u8) -> Self {
        self.weather = weather;
        self
    }

    pub(crate) fn track_temp(mut self, temp: i8) -> Self {
        self.track_temp = temp;
        self
    }

    pub(crate) fn safety_car(mut self, sc: u8) -> Self {
        self.safety_car = sc;
        self
    }

    pub(crate) fn track_length(mut self, meters: u16) -> Self {
        self.track_length = meters;
        self
    }

    pub(crate) fn marshal_zones(mut self, flags: &[i8]) -> Self {
        self.marshal_flags = flags.to_vec();
        self
    }

    pub(crate) fn forecast(mut self, samples: &[(u8, u8, u8)]) -> Self {
        self.forecast = samples.to_vec();
        self
    }

    pub(crate) fn sector_starts(mut self, s2: f32, s3: f32) -> Self {
        self.sector_starts = Some((s2, s3));
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut pkt = modern_header(1);
        let base = pkt.len();
        // Fixed part up to the forecast array, then samples, then an 8-byte
        // tail carrying the sector start distances.
        let fixed = 127 + self.forecast.len() * 8;
        let body_len = fixed.max(130) + 8;
        pkt.resize(base + body_len, 0);

        pkt[base] = self.weather;
        pkt[base + 1] = self.track_temp as u8;
        pkt[base + 2] = self.air_temp as u8;
        write_u16(&mut pkt, base + 4, self.track_length);
        pkt[base + 6] = self.session_type;
        pkt[base + 7] = self.track_id as u8;

        pkt[base + 18] = self.marshal_flags.len() as u8;
        for (j, flag) in self.marshal_flags.iter().enumerate() {
            pkt[base + 19 + j * 5 + 4] = *flag as u8;
        }

        let sc_off = base + 19 + 21 * 5;
        pkt[sc_off] = self.safety_car;
        pkt[sc_off + 2] = self.forecast.len() as u8;
        for (j, (minute, rain, weather)) in self.forecast.iter().enumerate() {
            let o = sc_off + 3 + j * 8;
            pkt[o + 1] = *minute;
            pkt[o + 2] = *weather;
            pkt[o + 7] = *rain;
        }

        if let Some((s2, s3)) = self.sector_starts {
            let tail = pkt.len() - 8;
            write_f32(&mut pkt, tail, s2);
            write_f32(&mut pkt, tail + 4, s3);
        }
        pkt
    }
}

// ---------------------------------------------------------------------------
// LapData packet (id 2)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default)]
pub(crate) struct LapRecord {
    pub(crate) last_lap_ms: u32,
    pub(crate) current_lap_ms: u32,
    pub(crate) lap_distance_m: f32,
    pub(crate) lap_num: u8,
    pub(crate) pit_status: u8,
    pub(crate) result_status: u8,
}

/// Modern (2025) LapData: fixed 57-byte records.
pub(crate) fn modern_lap_packet(records: &[(usize, LapRecord)]) -> Vec<u8> {
    modern_lap_packet_for_player(records, 0)
}

pub(crate) fn modern_lap_packet_for_player(
    records: &[(usize, LapRecord)],
    player_idx: u8,
) -> Vec<u8> {
    let mut pkt = header_bytes_for_player(2025, 2, player_idx);
    let base = pkt.len();
    pkt.resize(base + 22 * 57, 0);
    for (idx, rec) in records {
        let off = base + idx * 57;
        write_u32(&mut pkt, off, rec.last_lap_ms);
        write_u32(&mut pkt, off + 4, rec.current_lap_ms);
        write_f32(&mut pkt, off + 20, rec.lap_distance_m);
        pkt[off + 33] = rec.lap_num;
        pkt[off + 34] = rec.pit_status;
        pkt[off + 45] = rec.result_status;
    }
    pkt
}

/// Legacy layout A (compact records, times as u32 milliseconds).
pub(crate) fn legacy_lap_packet_ms(packet_format: u16, records: &[(usize, LapRecord)]) -> Vec<u8> {
    let car_size = 43;
    let mut pkt = header_bytes(packet_format, 2);
    let base = pkt.len();
    pkt.resize(base + 22 * car_size, 0);
    for (idx, rec) in records {
        let off = base + idx * car_size;
        write_u32(&mut pkt, off, rec.last_lap_ms);
        write_u32(&mut pkt, off + 4, rec.current_lap_ms);
        write_f32(&mut pkt, off + 12, rec.lap_distance_m);
        pkt[off + 25] = rec.lap_num;
        pkt[off + 26] = rec.pit_status;
        pkt[off + 37] = rec.result_status;
    }
    pkt
}

/// Legacy layout B (53-byte records, times as float seconds). The layout-A
/// probe offsets are poisoned so the plausibility check settles on B.
pub(crate) fn legacy_lap_packet_float(
    packet_format: u16,
    records: &[(usize, LapRecord)],
) -> Vec<u8> {
    let car_size = 53;
    let mut pkt = header_bytes(packet_format, 2);
    let base = pkt.len();
    pkt.resize(base + 22 * car_size, 0);
    for i in 0..22 {
        let off = base + i * car_size;
        // Garbage where layout A expects lap number / pit status.
        pkt[off + 25] = 200;
        pkt[off + 26] = 9;
    }
    for (idx, rec) in records {
        let off = base + idx * car_size;
        write_f32(&mut pkt, off, rec.last_lap_ms as f32 / 1000.0);
        write_f32(&mut pkt, off + 4, rec.current_lap_ms as f32 / 1000.0);
        write_f32(&mut pkt, off + 32, rec.lap_distance_m);
        pkt[off + 46] = rec.lap_num;
        pkt[off + 47] = rec.pit_status;
        pkt[off + 52] = rec.result_status;
    }
    pkt
}

// ---------------------------------------------------------------------------
// CarStatus packet (id 7)
// ---------------------------------------------------------------------------

pub(crate) fn car_status_packet(
    packet_format: u16,
    tyres: &[(usize, u8, u8)], // (car index, actual, visual)
) -> Vec<u8> {
    let car_size = 55;
    let mut pkt = header_bytes(packet_format, 7);
    let base = pkt.len();
    pkt.resize(base + 22 * car_size, 0);
    for (idx, actual, visual) in tyres {
        let off = base + idx * car_size;
        write_f32(&mut pkt, off + 5, 40.0); // fuel in tank
        write_f32(&mut pkt, off + 9, 110.0); // fuel capacity
        write_f32(&mut pkt, off + 13, 22.5); // fuel remaining laps
        pkt[off + 25] = *actual;
        pkt[off + 26] = *visual;
    }
    pkt
}

// ---------------------------------------------------------------------------
// Participants packet (id 4)
// ---------------------------------------------------------------------------

pub(crate) fn participants_packet(player_idx: u8, team_id: u8) -> Vec<u8> {
    let mut pkt = header_bytes_for_player(2025, 4, player_idx);
    let base = pkt.len();
    pkt.resize(base + 1 + 22 * 57, 0);
    pkt[base] = 22; // num active cars
    pkt[base + 1 + usize::from(player_idx) * 57 + 3] = team_id;
    pkt
}

// ---------------------------------------------------------------------------
// CarDamage packet (id 10)
// ---------------------------------------------------------------------------

pub(crate) fn car_damage_packet(player_idx: u8, wear: [f32; 4]) -> Vec<u8> {
    let car_size = 42;
    let mut pkt = header_bytes_for_player(2025, 10, player_idx);
    let base = pkt.len();
    pkt.resize(base + 22 * car_size, 0);
    let off = base + usize::from(player_idx) * car_size;
    for (i, w) in wear.iter().enumerate() {
        write_f32(&mut pkt, off + i * 4, *w);
    }
    pkt
}
