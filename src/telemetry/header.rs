//! Packet header decoding for the two known wire layouts.
//!
//! The first two bytes of every payload carry a little-endian `packet_format`
//! that doubles as the protocol year. Formats 2017..=2024 use a 24-byte
//! header; formats from 2025 on use a 29-byte header that adds an explicit
//! game-year byte and an overall frame counter. Anything else is treated as
//! unrecognized and dropped by the caller.

pub const LEGACY_HEADER_SIZE: usize = 24;
pub const MODERN_HEADER_SIZE: usize = 29;

pub(crate) const FORMAT_LEGACY_MIN: u16 = 2017;
pub(crate) const FORMAT_LEGACY_MAX: u16 = 2024;
pub(crate) const FORMAT_MODERN_MIN: u16 = 2025;
/// Plausibility ceiling: formats past this are garbage, not future games.
pub(crate) const FORMAT_MODERN_MAX: u16 = 2029;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProtocolHeader {
    pub packet_format: u16,
    /// Two-digit game year. Explicit in the modern layout; synthesized as
    /// `packet_format - 2000` for legacy formats.
    pub game_year: u8,
    pub game_major: u8,
    pub game_minor: u8,
    pub packet_version: u8,
    pub packet_id: u8,
    pub session_uid: u64,
    pub session_time: f32,
    pub frame_id: u32,
    /// Only present in the modern layout.
    pub overall_frame_id: Option<u32>,
    pub player_car_index: u8,
    pub secondary_player_car_index: u8,
    /// Offset where the packet body starts.
    pub header_size: usize,
}

impl ProtocolHeader {
    /// Decode a header from the start of `data`, or `None` when the buffer is
    /// too short or the format is outside both known ranges. Never panics.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let packet_format = read_u16(data, 0)?;

        if (FORMAT_MODERN_MIN..=FORMAT_MODERN_MAX).contains(&packet_format)
            && data.len() >= MODERN_HEADER_SIZE
        {
            return Some(ProtocolHeader {
                packet_format,
                game_year: read_u8(data, 2)?,
                game_major: read_u8(data, 3)?,
                game_minor: read_u8(data, 4)?,
                packet_version: read_u8(data, 5)?,
                packet_id: read_u8(data, 6)?,
                session_uid: read_u64(data, 7)?,
                session_time: read_f32(data, 15)?,
                frame_id: read_u32(data, 19)?,
                overall_frame_id: Some(read_u32(data, 23)?),
                player_car_index: read_u8(data, 27)?,
                secondary_player_car_index: read_u8(data, 28)?,
                header_size: MODERN_HEADER_SIZE,
            });
        }

        if (FORMAT_LEGACY_MIN..=FORMAT_LEGACY_MAX).contains(&packet_format)
            && data.len() >= LEGACY_HEADER_SIZE
        {
            return Some(ProtocolHeader {
                packet_format,
                game_year: (packet_format - 2000) as u8,
                game_major: read_u8(data, 2)?,
                game_minor: read_u8(data, 3)?,
                packet_version: read_u8(data, 4)?,
                packet_id: read_u8(data, 5)?,
                session_uid: read_u64(data, 6)?,
                session_time: read_f32(data, 14)?,
                frame_id: read_u32(data, 18)?,
                overall_frame_id: None,
                player_car_index: read_u8(data, 22)?,
                secondary_player_car_index: read_u8(data, 23)?,
                header_size: LEGACY_HEADER_SIZE,
            });
        }

        None
    }

    /// Re-encode the header bytes. The layout follows `packet_format`, so a
    /// parsed header reproduces its original bytes exactly.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header_size);
        out.extend_from_slice(&self.packet_format.to_le_bytes());
        if self.packet_format >= FORMAT_MODERN_MIN {
            out.push(self.game_year);
        }
        out.push(self.game_major);
        out.push(self.game_minor);
        out.push(self.packet_version);
        out.push(self.packet_id);
        out.extend_from_slice(&self.session_uid.to_le_bytes());
        out.extend_from_slice(&self.session_time.to_le_bytes());
        out.extend_from_slice(&self.frame_id.to_le_bytes());
        if let Some(overall) = self.overall_frame_id {
            out.extend_from_slice(&overall.to_le_bytes());
        }
        out.push(self.player_car_index);
        out.push(self.secondary_player_car_index);
        out
    }
}

// Checked little-endian field reads. A short buffer yields None, never a panic.

pub(crate) fn read_u8(data: &[u8], offset: usize) -> Option<u8> {
    data.get(offset).copied()
}

pub(crate) fn read_i8(data: &[u8], offset: usize) -> Option<i8> {
    data.get(offset).map(|b| *b as i8)
}

pub(crate) fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes(bytes.try_into().ok()?))
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

pub(crate) fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

pub(crate) fn read_f32(data: &[u8], offset: usize) -> Option<f32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(f32::from_le_bytes(bytes.try_into().ok()?))
}
