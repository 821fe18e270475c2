//! Channel player scout library.
//!
//! This crate provides the core types and logic used by the `channel_scout`
//! live monitor and the `replay` tool:
//!
//! - `reassembly`: cuts the game's TCP stream into `TOZ ` frames, across
//!   segment boundaries and past garbage
//! - `extract`: pulls player records (nickname, id, map, level, job) out of a
//!   frame's text and translates names through a `NameLookup`
//! - `lookup`: translation tables loaded from JSON
//! - `session`: one reassembler per TCP flow feeding one extractor
//! - `monitor`: locating the watched character and the players on its map
//! - `record`: capture log schema with length and CRC framing
//! - `capture`: IPv4/TCP payload extraction and live sniffing
pub mod capture;
pub mod extract;
pub mod lookup;
pub mod monitor;
pub mod reassembly;
pub mod record;
pub mod session;

pub use extract::{PlayerRecord, RecordExtractor};
pub use lookup::{NameLookup, Passthrough, TranslationTable};
pub use reassembly::{Frame, StreamReassembler};
pub use session::Session;
