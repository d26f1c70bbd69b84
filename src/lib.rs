// Library interface for pitwall
// This allows integration tests to access internal modules

pub mod config;
pub mod errors;
pub mod strategy;
pub mod telemetry;

// Re-export commonly used types
pub use config::{AppConfig, SourceMode};
pub use errors::PitwallError;
pub use strategy::{
    LapRow, PitAdvice, RainEngine, RainEngineConfig, StrategyAssessment, StrategyInput,
};
pub use telemetry::{
    CompoundLabel, LiveState, ReplayTelemetryListener, SafetyCar, TelemetryDecoder, TyreCategory,
    UdpTelemetryListener,
};
