use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{debug, info, warn};

use pitwall::{
    AppConfig, CompoundLabel, LiveState, PitwallError, RainEngine, RainEngineConfig,
    ReplayTelemetryListener, StrategyInput, UdpTelemetryListener,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Listen for live telemetry on the UDP port.
    Live {
        #[arg(short, long)]
        port: Option<u16>,

        /// Capture raw packets to this file for later replay.
        #[arg(long)]
        dump: Option<PathBuf>,

        /// Total race laps; enables pit advice output.
        #[arg(long)]
        race_laps: Option<u32>,

        /// Estimated pit stop time loss in seconds.
        #[arg(long, default_value_t = 20.0)]
        pit_loss: f64,
    },
    /// Replay a previously captured packet dump.
    Replay {
        #[arg(short, long)]
        input: PathBuf,

        /// Speed multiplier for the recorded packet timing.
        #[arg(short, long, default_value_t = 1.0)]
        speed: f64,

        /// Total race laps; enables pit advice output.
        #[arg(long)]
        race_laps: Option<u32>,

        /// Estimated pit stop time loss in seconds.
        #[arg(long, default_value_t = 20.0)]
        pit_loss: f64,
    },
}

/// Consume state snapshots and log a session summary plus, when the race
/// length is known, the rain engine's pit advice.
fn watch_states(
    rx: Receiver<LiveState>,
    running: Arc<AtomicBool>,
    race_laps: Option<u32>,
    pit_loss_s: f64,
) {
    let mut engine = RainEngine::new(RainEngineConfig::default());

    while running.load(Ordering::Relaxed) {
        let state = match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(state) => state,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        info!(
            "weather={:?} rain_now={:?}% fc={:?}% sc={:?} trackT={:?} tyre={:?} refs={:?}",
            state.weather,
            state.rain_now_pct,
            state.rain_fc_pct,
            state.safety_car_status,
            state.track_temp_c,
            state.player_tyre_compound,
            state.your_ref_counts,
        );

        let Some(total_laps) = race_laps else {
            continue;
        };
        let lap_num = u32::from(state.player_current_lap_num.unwrap_or(0));
        let laps_remaining = total_laps.saturating_sub(lap_num.saturating_sub(1));
        let current_tyre = state.player_tyre_compound.unwrap_or(CompoundLabel::Slick);
        let track = state
            .track_id
            .map(|id| format!("track{id}"))
            .unwrap_or_else(|| "unknown".to_string());

        let input = StrategyInput {
            track: &track,
            current_tyre,
            laps_remaining,
            pit_loss_s,
            history: None,
            your_last_lap_s: state
                .player_last_lap_time_ms
                .map(|ms| f64::from(ms) / 1000.0),
        };
        let assessment = engine.update(&state, &input);
        info!(
            "advice: {} (wetness {:.2}, confidence {:.2})",
            assessment.advice, assessment.wetness, assessment.confidence
        );
        debug!("{}", assessment.trace);
    }
}

fn live(
    port: Option<u16>,
    dump: Option<PathBuf>,
    race_laps: Option<u32>,
    pit_loss: f64,
    running: Arc<AtomicBool>,
) -> Result<(), PitwallError> {
    let config = AppConfig::from_local_file().unwrap_or_default();
    if !config.udp_enabled {
        warn!("telemetry is disabled in the config file; starting anyway for this run");
    }
    let port = port.unwrap_or(config.udp_port);
    let dump = dump.or_else(|| config.dump_enabled.then(|| config.dump_file.clone()).flatten());

    let (state_tx, state_rx) = mpsc::channel::<LiveState>();
    let mut listener = UdpTelemetryListener::new(port, dump, state_tx);
    listener.start()?;
    info!("listening for telemetry on UDP port {port}");

    watch_states(state_rx, running, race_laps, pit_loss);
    listener.stop();
    Ok(())
}

fn replay(
    input: PathBuf,
    speed: f64,
    race_laps: Option<u32>,
    pit_loss: f64,
    running: Arc<AtomicBool>,
) -> Result<(), PitwallError> {
    let (state_tx, state_rx) = mpsc::channel::<LiveState>();
    let mut listener = ReplayTelemetryListener::new(input, speed, state_tx);
    listener.start()?;

    watch_states(state_rx, running, race_laps, pit_loss);
    listener.stop();
    Ok(())
}

fn main() {
    colog::init();

    let cli = Args::parse();

    let running = Arc::new(AtomicBool::new(true));
    let ctrlc_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        println!("Exiting...");
        ctrlc_flag.store(false, Ordering::Relaxed);
    })
    .expect("Could not set Ctrl-C handler");

    match cli.command {
        Commands::Live {
            port,
            dump,
            race_laps,
            pit_loss,
        } => {
            live(port, dump, race_laps, pit_loss, running).expect("Error while reading telemetry")
        }
        Commands::Replay {
            input,
            speed,
            race_laps,
            pit_loss,
        } => replay(input, speed, race_laps, pit_loss, running)
            .expect("Error while replaying telemetry"),
    };
}
