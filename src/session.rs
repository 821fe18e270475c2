//! Per-flow reassembly and extraction for one capture session.
use std::collections::HashMap;

use crate::capture::Flow;
use crate::extract::{PlayerRecord, RecordExtractor};
use crate::lookup::NameLookup;
use crate::reassembly::{StreamReassembler, DEFAULT_MAX_FRAME_LEN};

/// Owns one [`StreamReassembler`] per TCP direction and a shared extractor.
///
/// Feed it from a single consumer; records come back in stream order.
#[derive(Debug)]
pub struct Session<L> {
    streams: HashMap<Flow, StreamReassembler>,
    extractor: RecordExtractor<L>,
    max_frame_len: Option<usize>,
    frames: u64,
}

impl<L: NameLookup> Session<L> {
    pub fn new(lookup: L) -> Self { Self::with_max_frame_len(lookup, Some(DEFAULT_MAX_FRAME_LEN)) }

    /// `None` trusts every length field.
    pub fn with_max_frame_len(lookup: L, max_frame_len: Option<usize>) -> Self {
        Self { streams: HashMap::new(), extractor: RecordExtractor::new(lookup), max_frame_len, frames: 0 }
    }

    /// Feed bytes captured on `flow` and return the records they completed.
    pub fn ingest(&mut self, flow: Flow, bytes: &[u8]) -> Vec<PlayerRecord> {
        let max = self.max_frame_len;
        let stream = self.streams.entry(flow).or_insert_with(|| {
            log::debug!("new stream {}", flow);
            match max {
                Some(n) => StreamReassembler::with_max_frame_len(n),
                None => StreamReassembler::unbounded(),
            }
        });
        let mut records = Vec::new();
        for frame in stream.feed(bytes) {
            self.frames += 1;
            records.extend(self.extractor.extract_frame(&frame));
        }
        records
    }

    /// Feed bytes of a single stream whose endpoints are unknown.
    pub fn ingest_stream(&mut self, bytes: &[u8]) -> Vec<PlayerRecord> { self.ingest(Flow::UNKNOWN, bytes) }

    /// Frames extracted so far.
    pub fn frames(&self) -> u64 { self.frames }

    pub fn streams(&self) -> usize { self.streams.len() }

    /// Drop every partially buffered frame.
    pub fn reset(&mut self) {
        self.streams.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::Passthrough;
    use crate::reassembly::encode_frame;
    use std::net::SocketAddr;

    fn flow(a: &str, b: &str) -> Flow {
        Flow { src: a.parse::<SocketAddr>().unwrap(), dst: b.parse::<SocketAddr>().unwrap() }
    }

    fn player_frame(nick: &str) -> Vec<u8> {
        let id = "12345678901234567";
        encode_frame(format!("98765432109876543/0/{id}/{nick}#{id}/map/u/1/job/").as_bytes())
    }

    #[test]
    fn flows_are_reassembled_independently() {
        let a = flow("10.0.0.1:32800", "10.0.0.2:50000");
        let b = flow("10.0.0.3:32800", "10.0.0.2:50001");
        let fa = player_frame("Alpha");
        let fb = player_frame("Bravo");
        let mut s = Session::new(Passthrough);
        assert!(s.ingest(a, &fa[..9]).is_empty());
        assert!(s.ingest(b, &fb[..12]).is_empty());
        let got_b = s.ingest(b, &fb[12..]);
        let got_a = s.ingest(a, &fa[9..]);
        assert_eq!(got_a[0].nickname, "Alpha");
        assert_eq!(got_b[0].nickname, "Bravo");
        assert_eq!(s.streams(), 2);
        assert_eq!(s.frames(), 2);
    }

    #[test]
    fn single_stream_spans_chunks() {
        let mut wire = player_frame("One");
        wire.extend(player_frame("Two"));
        let mut s = Session::new(Passthrough);
        let mut got = Vec::new();
        for chunk in wire.chunks(7) { got.extend(s.ingest_stream(chunk)); }
        let nicks: Vec<_> = got.iter().map(|p| p.nickname.clone()).collect();
        assert_eq!(nicks, ["One", "Two"]);
    }

    #[test]
    fn reset_discards_partial_frames() {
        let wire = player_frame("Gone");
        let mut s = Session::new(Passthrough);
        assert!(s.ingest_stream(&wire[..20]).is_empty());
        s.reset();
        assert!(s.ingest_stream(&wire[20..]).is_empty());
        assert_eq!(s.frames(), 0);
    }
}
