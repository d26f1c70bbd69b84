//! Live UDP listener: one background thread owns the socket, decodes packets
//! in arrival order, and emits coalesced state snapshots.

use std::io;
use std::net::UdpSocket;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, warn};

use super::LiveState;
use super::decoder::TelemetryDecoder;
use super::dump::PacketDumpWriter;
use crate::PitwallError;

/// Socket receive timeout, doubling as the stop-flag poll interval.
pub(crate) const RECV_TIMEOUT: Duration = Duration::from_millis(500);
/// Bounded shutdown wait; a wedged thread must not hang the caller.
pub(crate) const JOIN_TIMEOUT: Duration = Duration::from_secs(1);
/// Largest telemetry payload seen on the wire, with headroom.
const MAX_PACKET_BYTES: usize = 2048;

/// Timestamps of the most recent live and replay packets. Live and replay are
/// tracked separately so a consumer can show independent staleness. This is
/// the only state shared across threads; everything else stays on the decode
/// thread.
#[derive(Default)]
pub(crate) struct PacketStamps {
    pub(crate) live: Option<Instant>,
    pub(crate) replay: Option<Instant>,
}

#[derive(Clone)]
pub(crate) struct SharedStamps(pub(crate) Arc<Mutex<PacketStamps>>);

impl SharedStamps {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(PacketStamps::default())))
    }

    pub(crate) fn stamp_live(&self) {
        if let Ok(mut stamps) = self.0.lock() {
            stamps.live = Some(Instant::now());
        }
    }

    pub(crate) fn stamp_replay(&self) {
        if let Ok(mut stamps) = self.0.lock() {
            stamps.replay = Some(Instant::now());
        }
    }

    pub(crate) fn live_age(&self) -> Option<Duration> {
        self.0.lock().ok()?.live.map(|t| t.elapsed())
    }

    pub(crate) fn replay_age(&self) -> Option<Duration> {
        self.0.lock().ok()?.replay.map(|t| t.elapsed())
    }
}

/// Cooperatively stop `handle` without hanging the caller: poll until the
/// thread finishes or the bounded timeout expires, then detach.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, what: &str) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    if handle.is_finished() {
        let _ = handle.join();
    } else {
        warn!("{what} thread did not stop within {timeout:?}; detaching");
    }
}

pub struct UdpTelemetryListener {
    port: u16,
    dump_path: Option<PathBuf>,
    stop: Arc<AtomicBool>,
    stamps: SharedStamps,
    handle: Option<JoinHandle<()>>,
    sink: Option<Sender<LiveState>>,
}

impl UdpTelemetryListener {
    pub fn new(port: u16, dump_path: Option<PathBuf>, sink: Sender<LiveState>) -> Self {
        Self {
            port,
            dump_path,
            stop: Arc::new(AtomicBool::new(false)),
            stamps: SharedStamps::new(),
            handle: None,
            sink: Some(sink),
        }
    }

    /// Bind the socket and spawn the decode thread. A failed bind is a fatal
    /// startup error surfaced to the caller; everything after that is
    /// fail-soft inside the thread.
    pub fn start(&mut self) -> Result<(), PitwallError> {
        let Some(sink) = self.sink.take() else {
            return Ok(());
        };

        let socket = UdpSocket::bind(("0.0.0.0", self.port)).map_err(|e| {
            PitwallError::SocketBind {
                port: self.port,
                source: e,
            }
        })?;
        socket
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(|e| PitwallError::SocketBind {
                port: self.port,
                source: e,
            })?;

        let mut dump = match &self.dump_path {
            Some(path) => Some(PacketDumpWriter::create(path)?),
            None => None,
        };

        self.stop.store(false, Ordering::Relaxed);
        let stop = Arc::clone(&self.stop);
        let stamps = self.stamps.clone();

        let handle = thread::Builder::new()
            .name("pitwall-udp".to_string())
            .spawn(move || {
                let mut decoder = TelemetryDecoder::new(sink);
                let mut buf = [0u8; MAX_PACKET_BYTES];

                while !stop.load(Ordering::Relaxed) {
                    let n = match socket.recv_from(&mut buf) {
                        Ok((n, _addr)) => n,
                        Err(e)
                            if matches!(
                                e.kind(),
                                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                            ) =>
                        {
                            continue;
                        }
                        Err(e) => {
                            error!("UDP receive failed: {e}");
                            break;
                        }
                    };

                    stamps.stamp_live();
                    if let Some(writer) = dump.as_mut() {
                        writer.write_packet(&buf[..n]);
                    }
                    // Decoding is fail-soft: malformed packets leave the
                    // state unchanged and the loop keeps running.
                    decoder.handle_payload(&buf[..n], Instant::now());
                }

                if let Some(mut writer) = dump.take() {
                    writer.close();
                }
            })
            .map_err(|e| PitwallError::ListenerSpawn { source: e })?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Signal the decode thread to stop and wait for it, bounded.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            join_with_timeout(handle, JOIN_TIMEOUT, "UDP listener");
        }
    }

    /// Time since the last live packet. None = never received.
    pub fn last_live_packet_age(&self) -> Option<Duration> {
        self.stamps.live_age()
    }

    /// Time since the last replayed packet. None on a live listener.
    pub fn last_replay_packet_age(&self) -> Option<Duration> {
        self.stamps.replay_age()
    }

    /// Live age when available, replay age otherwise.
    pub fn last_packet_age(&self) -> Option<Duration> {
        self.last_live_packet_age()
            .or_else(|| self.last_replay_packet_age())
    }
}

impl Drop for UdpTelemetryListener {
    fn drop(&mut self) {
        self.stop();
    }
}
