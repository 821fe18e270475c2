//! Source-language to display-language name tables.
//!
//! The game reports map and job names in Korean. [`TranslationTable`] maps
//! them to display names loaded once at startup from a JSON file shaped like:
//!
//! ```json
//! { "職業對照": { "전사": "戰士" }, "地圖對照": { "던전1": "地下城1" } }
//! ```
//!
//! Lookups never fail: a name without an entry is returned unchanged.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Read-only name translation used by the extractor.
pub trait NameLookup {
    fn translate_map<'a>(&'a self, key: &'a str) -> &'a str;
    fn translate_job<'a>(&'a self, key: &'a str) -> &'a str;
}

impl<T: NameLookup + ?Sized> NameLookup for &T {
    fn translate_map<'a>(&'a self, key: &'a str) -> &'a str { (**self).translate_map(key) }
    fn translate_job<'a>(&'a self, key: &'a str) -> &'a str { (**self).translate_job(key) }
}

impl<T: NameLookup + ?Sized> NameLookup for Arc<T> {
    fn translate_map<'a>(&'a self, key: &'a str) -> &'a str { (**self).translate_map(key) }
    fn translate_job<'a>(&'a self, key: &'a str) -> &'a str { (**self).translate_job(key) }
}

/// Identity lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl NameLookup for Passthrough {
    fn translate_map<'a>(&'a self, key: &'a str) -> &'a str { key }
    fn translate_job<'a>(&'a self, key: &'a str) -> &'a str { key }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslationTable {
    #[serde(rename = "職業對照", default)]
    jobs: HashMap<String, String>,
    #[serde(rename = "地圖對照", default)]
    maps: HashMap<String, String>,
}

impl TranslationTable {
    pub fn new(jobs: HashMap<String, String>, maps: HashMap<String, String>) -> Self {
        Self { jobs, maps }
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("parse translation table")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        let table = Self::from_json_str(&text).with_context(|| format!("in {:?}", path))?;
        log::info!("loaded {} job and {} map translations from {:?}", table.jobs.len(), table.maps.len(), path);
        Ok(table)
    }

    /// Like [`load`](Self::load), but falls back to an empty table so names
    /// are shown untranslated.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("translations unavailable, showing untranslated names: {e:#}");
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool { self.jobs.is_empty() && self.maps.is_empty() }
}

impl NameLookup for TranslationTable {
    fn translate_map<'a>(&'a self, key: &'a str) -> &'a str {
        self.maps.get(key).map(String::as_str).unwrap_or(key)
    }

    fn translate_job<'a>(&'a self, key: &'a str) -> &'a str {
        self.jobs.get(key).map(String::as_str).unwrap_or(key)
    }
}
