//! Player record extraction from reassembled frames.
//!
//! A frame body is loosely structured text. Each player entry is anchored by
//! a 17-digit account number followed by slash separated fields:
//!
//! ```text
//! <anchor>/<opaque>/<id>/<nickname>#<id>/<map>/<unused>/<level>/<job>/...
//! ```
//!
//! Entries are surrounded by unrelated text. Anything that does not validate
//! is skipped and scanning resumes at the next anchor.
use serde::{Deserialize, Serialize};

use crate::lookup::NameLookup;
use crate::reassembly::{Frame, HEADER_LEN};

/// Number of consecutive digits forming an anchor.
pub const ANCHOR_DIGITS: usize = 17;
/// Minimum number of fields after an anchor.
const MIN_FIELDS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub nickname: String,
    /// 17-digit player id.
    pub id: String,
    pub map_localized: String,
    pub level: String,
    pub job_localized: String,
}

impl PlayerRecord {
    /// `nickname#id`, the form players use to look each other up.
    pub fn tag(&self) -> String { format!("{}#{}", self.nickname, self.id) }
}

/// Decode UTF-8, dropping invalid sequences instead of failing.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

/// Byte offsets just past each anchor, left to right, non-overlapping.
///
/// A run of 34 digits holds two anchors; a run of 20 holds one.
pub fn anchor_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut run = 0usize;
    for (i, b) in text.bytes().enumerate() {
        if b.is_ascii_digit() {
            run += 1;
            if run == ANCHOR_DIGITS {
                ends.push(i + 1);
                run = 0;
            }
        } else {
            run = 0;
        }
    }
    ends
}

/// Turns frames into [`PlayerRecord`]s, translating names through `L`.
#[derive(Debug, Clone)]
pub struct RecordExtractor<L> {
    lookup: L,
}

impl<L: NameLookup> RecordExtractor<L> {
    pub fn new(lookup: L) -> Self { Self { lookup } }

    pub fn extract_frame(&self, frame: &Frame) -> Vec<PlayerRecord> { self.extract(frame.as_bytes()) }

    /// Extract every well-formed record from a complete frame.
    ///
    /// The 8-byte frame header is skipped; shorter input yields nothing.
    pub fn extract(&self, frame: &[u8]) -> Vec<PlayerRecord> {
        if frame.len() < HEADER_LEN { return Vec::new(); }
        let text = decode_lossy(&frame[HEADER_LEN..]);
        let records: Vec<PlayerRecord> = anchor_ends(&text)
            .into_iter()
            .filter_map(|end| self.parse_candidate(&text[end..]))
            .collect();
        log::debug!("frame of {} bytes yielded {} records", frame.len(), records.len());
        records
    }

    fn parse_candidate(&self, rest: &str) -> Option<PlayerRecord> {
        let fields: Vec<&str> = rest.trim_start_matches('/').splitn(MIN_FIELDS + 1, '/').collect();
        if fields.len() < MIN_FIELDS {
            log::trace!("candidate skipped: {} fields", fields.len());
            return None;
        }
        let Some((nickname, id2)) = fields[2].split_once('#') else {
            log::trace!("candidate skipped: no '#' in {:?}", fields[2]);
            return None;
        };
        let id = fields[1];
        if id != id2 {
            log::trace!("candidate skipped: id {:?} != {:?}", id, id2);
            return None;
        }
        Some(PlayerRecord {
            nickname: nickname.to_string(),
            id: id.trim().to_string(),
            map_localized: self.lookup.translate_map(fields[3].trim()).to_string(),
            level: fields[5].trim().to_string(),
            job_localized: self.lookup.translate_job(fields[6].trim()).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{Passthrough, TranslationTable};
    use crate::reassembly::encode_frame;
    use std::collections::HashMap;

    const ID: &str = "12345678901234567";

    fn table() -> TranslationTable {
        TranslationTable::new(
            HashMap::from([("전사".to_string(), "戰士".to_string())]),
            HashMap::from([("던전1".to_string(), "地下城1".to_string())]),
        )
    }

    fn entry(nick: &str, id: &str, map: &str, level: &str, job: &str) -> String {
        format!("98765432109876543/{id}/{id}/{nick}#{id}/{map}/x/{level}/{job}/y/z")
    }

    #[test]
    fn translates_map_and_job() {
        let text = format!("hdr/{}", entry("Hero", ID, "던전1", "50", "전사"));
        let out = RecordExtractor::new(table()).extract(&encode_frame(text.as_bytes()));
        assert_eq!(out, vec![PlayerRecord {
            nickname: "Hero".into(),
            id: ID.into(),
            map_localized: "地下城1".into(),
            level: "50".into(),
            job_localized: "戰士".into(),
        }]);
        assert_eq!(out[0].tag(), format!("Hero#{}", ID));
    }

    #[test]
    fn unknown_names_pass_through() {
        let text = entry("Hero", ID, "미지의맵", "7", "마법사");
        let out = RecordExtractor::new(table()).extract(&encode_frame(text.as_bytes()));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].map_localized, "미지의맵");
        assert_eq!(out[0].job_localized, "마법사");
    }

    #[test]
    fn short_input_yields_nothing() {
        let ex = RecordExtractor::new(Passthrough);
        assert!(ex.extract(b"").is_empty());
        assert!(ex.extract(b"TOZ").is_empty());
        assert!(ex.extract(b"TOZ \x00\x00\x00").is_empty());
    }

    #[test]
    fn mismatched_ids_are_skipped_and_scan_continues() {
        let bad = "98765432109876543/x/11111111111111111/Mallory#22222222222222222/m/u/1/j/";
        let good = entry("Alice", ID, "m", "3", "j");
        let text = format!("{bad}filler{good}");
        let out = RecordExtractor::new(Passthrough).extract(&encode_frame(text.as_bytes()));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].nickname, "Alice");
    }

    #[test]
    fn missing_hash_or_fields_are_skipped() {
        let ex = RecordExtractor::new(Passthrough);
        let no_hash = format!("98765432109876543/a/{ID}/NoHash/m/u/1/j/z");
        assert!(ex.extract(&encode_frame(no_hash.as_bytes())).is_empty());
        let few = format!("98765432109876543/a/{ID}/N#{ID}/m/u");
        assert!(ex.extract(&encode_frame(few.as_bytes())).is_empty());
    }

    #[test]
    fn multiple_records_keep_source_order() {
        let second = "76543210987654321";
        let text = format!("{}|{}", entry("First", ID, "m1", "10", "j1"), entry("Second", second, "m2", "20", "j2"));
        let out = RecordExtractor::new(Passthrough).extract(&encode_frame(text.as_bytes()));
        let nicks: Vec<_> = out.iter().map(|p| p.nickname.as_str()).collect();
        assert_eq!(nicks, ["First", "Second"]);
        assert_eq!(out[1].id, second);
        assert_eq!(out[1].level, "20");
    }

    #[test]
    fn fields_are_trimmed_but_nickname_is_not() {
        let text = format!("98765432109876543/a/{ID}/ Spacey #{ID}/ m /u/ 42 / j /");
        let out = RecordExtractor::new(Passthrough).extract(&encode_frame(text.as_bytes()));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].nickname, " Spacey ");
        assert_eq!(out[0].map_localized, "m");
        assert_eq!(out[0].level, "42");
        assert_eq!(out[0].job_localized, "j");
    }

    #[test]
    fn invalid_utf8_is_dropped() {
        let mut payload = b"\xff\xfe".to_vec();
        payload.extend_from_slice(entry("Hero", ID, "m", "1", "j").as_bytes());
        payload.extend_from_slice(b"\xc3");
        let out = RecordExtractor::new(Passthrough).extract(&encode_frame(&payload));
        assert_eq!(out.len(), 1);
        assert_eq!(decode_lossy(b"a\xffb"), "ab");
    }

    #[test]
    fn anchors_are_non_overlapping() {
        let run = "1".repeat(20);
        assert_eq!(anchor_ends(&run), vec![17]);
        let run = "2".repeat(34);
        assert_eq!(anchor_ends(&run), vec![17, 34]);
        assert_eq!(anchor_ends("1234567890123456/x"), Vec::<usize>::new());
        assert_eq!(anchor_ends("가12345678901234567"), vec![3 + 17]);
    }
}
