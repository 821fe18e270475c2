//! On-disk capture log.
//!
//! A capture log stores the raw TCP payloads seen during a monitoring
//! session so they can be replayed through the engine later. Each record is
//! written as `[len:u32 LE][crc32:u32 LE][bincode payload]`.
use anyhow::{bail, Context, Result};
use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::capture::Flow;

pub const LOG_VERSION: u16 = 1;
/// Upper bound on one encoded record, guards against corrupt length fields.
pub const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureHeader {
    pub version: u16,
    pub created_unix_ns: u128,
    pub port: u16, // game port the sniffer filtered on
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub seq: u64,                      // monotonic per session
    pub recv_unix_ns: u128,            // SystemTime::now()
    pub recv_mono_ns_from_start: u128, // Instant since start
    pub flow: Flow,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordFrame {
    Header(CaptureHeader),
    Chunk(ChunkRecord),
}

/// Serialize `frame` with its length and CRC prefix.
pub fn encode_frame(frame: &RecordFrame) -> Result<Vec<u8>> {
    let payload = bincode::serialize(frame).context("bincode encode")?;
    let mut hasher = Crc32::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Check `crc` against `payload` and decode it.
pub fn decode_payload(payload: &[u8], crc: u32, index: usize) -> Result<RecordFrame> {
    let mut hasher = Crc32::new();
    hasher.update(payload);
    let calc = hasher.finalize();
    if calc != crc { bail!("CRC mismatch at frame {}: file={:#x}, calc={:#x}", index, crc, calc); }
    bincode::deserialize(payload).with_context(|| format!("bincode decode at frame {}", index))
}

pub struct CaptureWriter {
    path: PathBuf,
    w: BufWriter<File>,
    frames: usize,
}

impl CaptureWriter {
    /// Create (or truncate) `path`, making parent directories, and write the header.
    pub fn create(path: &Path, header: CaptureHeader) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
            }
        }
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(path).with_context(|| format!("open {:?}", path))?;
        let mut this = Self { path: path.to_path_buf(), w: BufWriter::with_capacity(1 << 20, file), frames: 0 };
        this.append(&RecordFrame::Header(header))?;
        Ok(this)
    }

    pub fn append(&mut self, frame: &RecordFrame) -> Result<()> {
        let bytes = encode_frame(frame)?;
        self.w.write_all(&bytes).with_context(|| format!("write {:?}", self.path))?;
        self.frames += 1;
        Ok(())
    }

    /// Flush buffered frames to disk.
    pub fn finish(mut self) -> Result<usize> {
        self.w.flush().with_context(|| format!("flush {:?}", self.path))?;
        log::info!("wrote {} frames to {:?}", self.frames, self.path);
        Ok(self.frames)
    }
}

pub struct CaptureReader<R> {
    r: R,
    index: usize,
    failed: bool,
}

impl CaptureReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {:?}", path))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> CaptureReader<R> {
    pub fn new(r: R) -> Self { Self { r, index: 0, failed: false } }

    /// Next frame; `Ok(None)` on a clean end of file.
    pub fn next_frame(&mut self) -> Result<Option<RecordFrame>> {
        let mut head = [0u8; 8];
        match read_full(&mut self.r, &mut head)? {
            0 => return Ok(None),
            8 => {}
            n => bail!("truncated frame header at frame {} ({} of 8 bytes)", self.index, n),
        }
        let len = u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize;
        let crc = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);
        if len > MAX_RECORD_LEN { bail!("frame {} declares {} bytes (max {})", self.index, len, MAX_RECORD_LEN); }
        let mut payload = vec![0u8; len];
        self.r.read_exact(&mut payload).with_context(|| format!("truncated payload at frame {}", self.index))?;
        let frame = decode_payload(&payload, crc, self.index)?;
        self.index += 1;
        Ok(Some(frame))
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<RecordFrame>;

    /// Stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed { return None; }
        let item = self.next_frame().transpose();
        if matches!(item, Some(Err(_))) { self.failed = true; }
        item
    }
}

// read_exact, but reports how much was read before EOF
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
