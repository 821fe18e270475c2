//! Reassembly of `TOZ ` frames from a raw TCP byte stream.
//!
//! The game server writes frames as `MAGIC | LENGTH | PAYLOAD`:
//! - `MAGIC` is the 4 ASCII bytes `"TOZ "`
//! - `LENGTH` is a little-endian `u32` counting payload bytes
//! - `PAYLOAD` is exactly `LENGTH` bytes
//!
//! Segments captured off the wire do not line up with frame boundaries, so
//! [`StreamReassembler`] buffers bytes until whole frames are available and
//! hands them out in arrival order. Bytes in front of a tag belong to no
//! recognised frame and are dropped.

/// Frame tag.
pub const MAGIC: &[u8; 4] = b"TOZ ";
/// Tag plus length field.
pub const HEADER_LEN: usize = 8;
/// Largest declared payload accepted by [`StreamReassembler::new`].
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// One complete frame, header included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Whole frame: tag, length field and payload.
    pub fn as_bytes(&self) -> &[u8] { &self.bytes }

    /// Bytes following the 8-byte header.
    pub fn payload(&self) -> &[u8] { &self.bytes[HEADER_LEN..] }

    /// Payload length as declared by the length field.
    pub fn declared_len(&self) -> u32 { read_len(&self.bytes).unwrap_or_default() }
}

/// Build the wire form of a frame around `payload`.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn read_len(at_tag: &[u8]) -> Option<u32> {
    let raw: [u8; 4] = at_tag.get(4..HEADER_LEN)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

fn find_tag(haystack: &[u8]) -> Option<usize> {
    haystack.windows(MAGIC.len()).position(|w| w == MAGIC)
}

/// Accumulates stream bytes and cuts them into [`Frame`]s.
///
/// One instance serves one ordered byte stream. It is not shared between
/// threads; the caller feeds it from a single consumer.
#[derive(Debug)]
pub struct StreamReassembler {
    buf: Vec<u8>,
    max_frame_len: Option<usize>,
}

impl Default for StreamReassembler {
    fn default() -> Self { Self::new() }
}

impl StreamReassembler {
    /// Reassembler that resynchronises on frames declaring more than
    /// [`DEFAULT_MAX_FRAME_LEN`] payload bytes.
    pub fn new() -> Self { Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN) }

    /// Reassembler with a custom payload cap.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { buf: Vec::with_capacity(64 * 1024), max_frame_len: Some(max_frame_len) }
    }

    /// Reassembler that trusts every length field, however large.
    pub fn unbounded() -> Self {
        Self { buf: Vec::with_capacity(64 * 1024), max_frame_len: None }
    }

    /// Unconsumed bytes currently held.
    pub fn buffered(&self) -> usize { self.buf.len() }

    /// Forget any partial frame, e.g. when the capture session ends.
    pub fn clear(&mut self) { self.buf.clear(); }

    /// Append `chunk` and return every frame completed by it, in stream order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let Some(start) = find_tag(&self.buf) else {
                // keep a possible partial tag at the tail
                let keep = self.buf.len().min(MAGIC.len() - 1);
                let cut = self.buf.len() - keep;
                if cut > 0 {
                    log::trace!("discarding {} bytes without frame tag", cut);
                    self.buf.drain(..cut);
                }
                return None;
            };
            let len = read_len(&self.buf[start..])? as usize;
            if let Some(max) = self.max_frame_len {
                if len > max {
                    log::warn!("frame declares {} payload bytes (max {}), resynchronising", len, max);
                    self.buf.drain(..start + MAGIC.len());
                    continue;
                }
            }
            let end = start.checked_add(HEADER_LEN)?.checked_add(len)?;
            if self.buf.len() < end { return None; }
            let bytes = self.buf[start..end].to_vec();
            if start > 0 { log::debug!("dropped {} bytes before frame tag", start); }
            self.buf.drain(..end);
            return Some(Frame { bytes });
        }
    }
}
