//! Raw packet dump files for offline replay.
//!
//! Record format: `<u64 t_ms><u32 n_bytes><payload>`, little-endian, where
//! `t_ms` is a monotonic millisecond timestamp taken at capture time. There
//! is no file header or checksum; a truncated trailing record marks the end
//! of the stream, not an error.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{error, info};

use crate::PitwallError;

const RECORD_HEADER_BYTES: usize = 12;

/// Appends captured packets to a dump file. Write failures are logged once
/// and then silently disable the writer for the rest of the run; a broken
/// dump must never slow down or kill the decode thread.
pub struct PacketDumpWriter {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    started: Instant,
    err_logged: bool,
}

impl PacketDumpWriter {
    pub fn create(path: &Path) -> Result<Self, PitwallError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PitwallError::DumpIo { source: e })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| PitwallError::DumpIo { source: e })?;
        info!("UDP dump enabled -> {}", path.display());
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            path: path.to_path_buf(),
            started: Instant::now(),
            err_logged: false,
        })
    }

    pub fn write_packet(&mut self, payload: &[u8]) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let t_ms = self.started.elapsed().as_millis() as u64;
        let n = payload.len() as u32;

        let result = writer
            .write_all(&t_ms.to_le_bytes())
            .and_then(|_| writer.write_all(&n.to_le_bytes()))
            .and_then(|_| writer.write_all(payload));

        if let Err(e) = result {
            if !self.err_logged {
                self.err_logged = true;
                error!("UDP dump write failed ({}): {e}", self.path.display());
            }
            self.writer = None;
        }
    }

    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                if !self.err_logged {
                    error!("UDP dump flush failed ({}): {e}", self.path.display());
                }
            }
        }
    }
}

impl Drop for PacketDumpWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open a dump file for replay.
pub fn read_dump(path: &Path) -> Result<DumpReader, PitwallError> {
    if !path.is_file() {
        return Err(PitwallError::ReplayFileMissing {
            path: path.display().to_string(),
        });
    }
    let file = File::open(path).map_err(|e| PitwallError::ReplayIo { source: e })?;
    Ok(DumpReader {
        reader: BufReader::new(file),
    })
}

/// Iterates `(t_ms, payload)` records until EOF or a truncated record.
#[derive(Debug)]
pub struct DumpReader {
    reader: BufReader<File>,
}

impl Iterator for DumpReader {
    type Item = (u64, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        let mut header = [0u8; RECORD_HEADER_BYTES];
        self.reader.read_exact(&mut header).ok()?;

        let t_ms = u64::from_le_bytes(header[0..8].try_into().ok()?);
        let n = u32::from_le_bytes(header[8..12].try_into().ok()?) as usize;

        let mut payload = vec![0u8; n];
        self.reader.read_exact(&mut payload).ok()?;
        Some((t_ms, payload))
    }
}
