use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::PitwallError;

const CONFIG_FILE_NAME: &str = "config.json";
const DEFAULT_UDP_PORT: u16 = 20777;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Live,
    Replay,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub udp_enabled: bool,
    pub udp_port: u16,
    pub source_mode: SourceMode,
    pub replay_file: Option<PathBuf>,
    pub replay_speed: f64,
    pub dump_enabled: bool,
    pub dump_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            udp_enabled: true,
            udp_port: DEFAULT_UDP_PORT,
            source_mode: SourceMode::Live,
            replay_file: None,
            replay_speed: 1.0,
            dump_enabled: false,
            dump_file: None,
        }
    }
}

impl AppConfig {
    pub fn from_local_file() -> Option<Self> {
        let config_path = dirs::config_dir()?.join("pitwall").join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let file = std::fs::File::open(config_path).ok()?;
            serde_json::from_reader(file).ok()
        } else {
            None
        }
    }

    pub fn save(&self) -> Result<(), PitwallError> {
        let config_dir = dirs::config_dir()
            .ok_or(PitwallError::NoConfigDir)?
            .join("pitwall");

        if !config_dir.exists() {
            std::fs::create_dir_all(&config_dir)
                .map_err(|e| PitwallError::ConfigIOError { source: e })?;
        }

        let file = std::fs::File::create(config_dir.join(CONFIG_FILE_NAME))
            .map_err(|e| PitwallError::ConfigIOError { source: e })?;
        serde_json::to_writer(file, self)
            .map_err(|e| PitwallError::ConfigSerializeError { source: e })
    }
}
