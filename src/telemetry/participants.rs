//! Participants packet (id 4): only the player's team is of interest.

use super::decoder::TelemetryDecoder;
use super::header::{ProtocolHeader, read_u8};

/// Modern ParticipantData record size.
const PARTICIPANT_SIZE: usize = 57;
/// teamId offset within a participant record.
const TEAM_ID_OFFSET: usize = 3;

/// Codemasters team ids (current mapping). Unknown ids get a synthesized
/// label instead of failing.
pub(crate) fn team_name_from_id(team_id: u8) -> String {
    match team_id {
        0 => "Mercedes".to_string(),
        1 => "Ferrari".to_string(),
        2 => "Red Bull".to_string(),
        3 => "Williams".to_string(),
        4 => "Aston Martin".to_string(),
        5 => "Alpine".to_string(),
        6 => "RB".to_string(),
        7 => "Haas".to_string(),
        8 => "McLaren".to_string(),
        9 => "Kick Sauber".to_string(),
        255 => "UNK".to_string(),
        id => format!("TEAM{id}"),
    }
}

pub(crate) fn decode(dec: &mut TelemetryDecoder, hdr: &ProtocolHeader, data: &[u8]) -> bool {
    let base = hdr.header_size;
    // One count byte, then the participant records.
    let records_start = base + 1;
    let pidx = dec.state.player_car_index;

    let off = records_start + pidx * PARTICIPANT_SIZE;
    if off + PARTICIPANT_SIZE > data.len() {
        return false;
    }

    let Some(team_id) = read_u8(data, off + TEAM_ID_OFFSET) else {
        return false;
    };
    let team_name = team_name_from_id(team_id);

    let mut changed = false;
    if dec.state.player_team_id != Some(team_id) {
        dec.state.player_team_id = Some(team_id);
        changed = true;
    }
    if dec.state.player_team_name.as_deref() != Some(team_name.as_str()) {
        dec.state.player_team_name = Some(team_name);
        changed = true;
    }
    changed
}
