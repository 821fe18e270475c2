//! "Who is on my map" view over a channel snapshot.
//!
//! A frame listing the channel's players is a snapshot: find the record for
//! the watched character, then keep everybody on the same localized map.
use crate::extract::PlayerRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct MapView<'a> {
    pub me: &'a PlayerRecord,
    /// Everyone on `me`'s map, `me` included, in snapshot order.
    pub same_map: Vec<&'a PlayerRecord>,
}

impl<'a> MapView<'a> {
    /// `None` when `my_name` is not in the snapshot.
    pub fn locate(records: &'a [PlayerRecord], my_name: &str) -> Option<Self> {
        let me = records.iter().find(|p| p.nickname == my_name)?;
        let same_map = records.iter().filter(|p| p.map_localized == me.map_localized).collect();
        Some(Self { me, same_map })
    }

    pub fn map(&self) -> &str { &self.me.map_localized }

    pub fn others(&self) -> impl Iterator<Item = &'a PlayerRecord> + '_ {
        self.same_map.iter().copied().filter(move |p| p.nickname != self.me.nickname)
    }

    pub fn summary(&self) -> String {
        format!("You are on {} (level {}, {})", self.map(), self.me.level, self.me.job_localized)
    }

    /// Table rows `[nickname, id, level, job]`; the watched character is starred.
    pub fn render_rows(&self) -> Vec<[String; 4]> {
        self.same_map
            .iter()
            .map(|p| {
                let name = if p.nickname == self.me.nickname { format!("★ {} (me)", p.nickname) } else { p.nickname.clone() };
                [name, p.id.clone(), p.level.clone(), p.job_localized.clone()]
            })
            .collect()
    }

    /// Log lines for a snapshot, matching what the monitor prints.
    pub fn report(&self) -> Vec<String> {
        let others: Vec<_> = self.others().collect();
        if others.is_empty() {
            return vec![format!("{}: only you", self.map())];
        }
        let mut lines = vec![format!("{}: {} other player(s)", self.map(), others.len())];
        for p in others {
            lines.push(format!("  > {} (ID: {}, Lv.{} {})", p.nickname, p.id, p.level, p.job_localized));
        }
        lines
    }
}

/// Column-aligned table for terminal output.
pub fn format_table(rows: &[[String; 4]]) -> String {
    const HEADERS: [&str; 4] = ["Nickname", "ID", "Level", "Job"];
    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) { *w = (*w).max(cell.chars().count()); }
    }
    let line = |cells: [&str; 4]| -> String {
        cells.iter().zip(widths).map(|(c, w)| format!("{:<w$}", c, w = w)).collect::<Vec<_>>().join("  ").trim_end().to_string()
    };
    let mut out = line(HEADERS);
    for row in rows {
        out.push('\n');
        out.push_str(&line([row[0].as_str(), row[1].as_str(), row[2].as_str(), row[3].as_str()]));
    }
    out
}
