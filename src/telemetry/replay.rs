//! Offline replay of captured packet dumps.
//!
//! Replay feeds recorded payloads through the identical decode path as the
//! live socket, paced against wall clock from the first record's timestamp
//! and scaled by a speed multiplier.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::info;

use super::LiveState;
use super::decoder::TelemetryDecoder;
use super::dump::read_dump;
use super::listener::{JOIN_TIMEOUT, SharedStamps, join_with_timeout};
use crate::PitwallError;

/// Sleep granularity while pacing, so the stop flag is observed promptly.
const PACING_SLEEP: Duration = Duration::from_millis(10);

pub struct ReplayTelemetryListener {
    path: PathBuf,
    speed: f64,
    stop: Arc<AtomicBool>,
    stamps: SharedStamps,
    handle: Option<JoinHandle<()>>,
    sink: Option<Sender<LiveState>>,
}

impl ReplayTelemetryListener {
    pub fn new(path: PathBuf, speed: f64, sink: Sender<LiveState>) -> Self {
        Self {
            path,
            speed: if speed > 0.0 { speed } else { 1.0 },
            stop: Arc::new(AtomicBool::new(false)),
            stamps: SharedStamps::new(),
            handle: None,
            sink: Some(sink),
        }
    }

    /// Open the dump and spawn the replay thread. A missing or unreadable
    /// file is a configuration error returned here, not a runtime fault.
    pub fn start(&mut self) -> Result<(), PitwallError> {
        let Some(sink) = self.sink.take() else {
            return Ok(());
        };

        let reader = read_dump(&self.path)?;
        info!("replaying {} @ {}x", self.path.display(), self.speed);

        self.stop.store(false, Ordering::Relaxed);
        let stop = Arc::clone(&self.stop);
        let stamps = self.stamps.clone();
        let speed = self.speed;
        let path = self.path.clone();

        let handle = thread::Builder::new()
            .name("pitwall-replay".to_string())
            .spawn(move || {
                let mut decoder = TelemetryDecoder::new(sink);
                let mut first_t: Option<u64> = None;
                let mut wall_t0 = Instant::now();

                for (t_ms, payload) in reader {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }

                    let first = *first_t.get_or_insert_with(|| {
                        wall_t0 = Instant::now();
                        t_ms
                    });

                    // Reproduce the recorded inter-packet gaps, scaled.
                    let rel = Duration::from_millis(t_ms.saturating_sub(first));
                    let target = wall_t0 + rel.div_f64(speed);
                    loop {
                        if stop.load(Ordering::Relaxed) {
                            return;
                        }
                        let now = Instant::now();
                        if now >= target {
                            break;
                        }
                        thread::sleep(PACING_SLEEP.min(target - now));
                    }

                    stamps.stamp_replay();
                    decoder.handle_payload(&payload, Instant::now());
                }

                info!("replay finished: {}", path.display());
            })
            .map_err(|e| PitwallError::ListenerSpawn { source: e })?;

        self.handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            join_with_timeout(handle, JOIN_TIMEOUT, "replay");
        }
    }

    /// Blocks until the replay thread finishes the file (or is stopped).
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Time since the last replayed packet. None = never processed.
    pub fn last_replay_packet_age(&self) -> Option<Duration> {
        self.stamps.replay_age()
    }
}

impl Drop for ReplayTelemetryListener {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::dump::PacketDumpWriter;
    use crate::telemetry::testkit::{LapRecord, modern_lap_packet};
    use std::sync::mpsc;

    #[test]
    fn test_missing_file_fails_at_start() {
        let (tx, _rx) = mpsc::channel();
        let mut replay =
            ReplayTelemetryListener::new(PathBuf::from("/nonexistent/dump.bin"), 1.0, tx);
        assert!(matches!(
            replay.start(),
            Err(PitwallError::ReplayFileMissing { .. })
        ));
    }

    #[test]
    fn test_replay_feeds_decode_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lap.bin");

        let mut writer = PacketDumpWriter::create(&path).unwrap();
        let pkt = modern_lap_packet(&[(
            0,
            LapRecord {
                last_lap_ms: 90_000,
                current_lap_ms: 1_000,
                lap_distance_m: 10.0,
                lap_num: 2,
                pit_status: 0,
                result_status: 2,
            },
        )]);
        writer.write_packet(&pkt);
        writer.close();

        let (tx, rx) = mpsc::channel();
        let mut replay = ReplayTelemetryListener::new(path, 1.0, tx);
        replay.start().unwrap();
        replay.wait();

        let last = rx.into_iter().last().expect("one snapshot expected");
        assert_eq!(last.player_last_lap_time_ms, Some(90_000));
        assert_eq!(last.player_current_lap_num, Some(2));
    }
}
