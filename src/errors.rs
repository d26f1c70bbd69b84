// Error types for pitwall

use crate::telemetry::LiveState;
use snafu::Snafu;
use std::{io, sync::mpsc::SendError};

#[derive(Debug, Snafu)]
pub enum PitwallError {
    // Errors for the live UDP listener
    #[snafu(display("Unable to bind UDP socket on port {port}"))]
    SocketBind { port: u16, source: io::Error },
    #[snafu(display("Unable to spawn the telemetry thread"))]
    ListenerSpawn { source: io::Error },

    // Errors while broadcasting state snapshots
    #[snafu(display("Error broadcasting live state snapshot"))]
    StateBroadcast {
        source: Box<SendError<LiveState>>,
    },

    // Errors for the packet dump writer / replay reader
    #[snafu(display("Error writing packet dump file"))]
    DumpIo { source: io::Error },
    #[snafu(display("Replay file not found: {path}"))]
    ReplayFileMissing { path: String },
    #[snafu(display("Error reading replay file"))]
    ReplayIo { source: io::Error },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
}

impl From<SendError<LiveState>> for PitwallError {
    fn from(value: SendError<LiveState>) -> Self {
        PitwallError::StateBroadcast {
            source: Box::new(value),
        }
    }
}
