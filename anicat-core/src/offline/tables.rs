use std::collections::HashMap;

/// Bidirectional `canonical <-> secondary` lookup built once per snapshot.
///
/// The first pair seen for a given key wins in each direction; later pairs
/// that would overwrite an existing mapping are counted as duplicates and
/// dropped. Curated snapshots list the primary entry for an id first.
///
/// Only keys are deduplicated. Several canonical ids may share a secondary
/// id (Fribb maps every AniList season of a show to the one TMDB series), so
/// `forward` can return the same value for each of them while `inverse`
/// always leads back to the first. Items resolved this way share one
/// identifier and one meta record.
#[derive(Debug, Default, Clone)]
pub struct IndexTables {
    forward: HashMap<u32, u32>,
    inverse: HashMap<u32, u32>,
}

impl IndexTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair, returning `false` if either side was already mapped.
    pub fn insert(&mut self, canonical: u32, secondary: u32) -> bool {
        let mut fresh = true;
        if self.forward.contains_key(&canonical) {
            fresh = false;
        } else {
            self.forward.insert(canonical, secondary);
        }
        if self.inverse.contains_key(&secondary) {
            fresh = false;
        } else {
            self.inverse.insert(secondary, canonical);
        }
        fresh
    }

    pub fn forward(&self, canonical: u32) -> Option<u32> {
        self.forward.get(&canonical).copied()
    }

    pub fn inverse(&self, secondary: u32) -> Option<u32> {
        self.inverse.get(&secondary).copied()
    }

    /// Number of canonical ids with a mapping.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Outcome of parsing one snapshot.
#[derive(Debug, Default)]
pub struct ParsedSnapshot {
    pub tables: IndexTables,
    /// Entries that parsed but lacked one side of the pair.
    pub incomplete: usize,
    /// Entries whose shape could not be read at all.
    pub malformed: usize,
    /// Complete entries the format deliberately leaves out.
    pub excluded: usize,
    /// Pairs dropped because an earlier entry already claimed an id.
    pub duplicates: usize,
}

impl ParsedSnapshot {
    pub(crate) fn record(&mut self, canonical: Option<u32>, secondary: Option<u32>) {
        match (canonical, secondary) {
            (Some(canonical), Some(secondary)) => {
                if !self.tables.insert(canonical, secondary) {
                    self.duplicates += 1;
                }
            }
            _ => self.incomplete += 1,
        }
    }
}
