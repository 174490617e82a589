//
// mapping.rs
// dicom-ai-randomize
//
// Run-scoped table from original identifiers to their replacements, keyed by identifier kind.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

/// The kind of identifier a mapping entry belongs to.
///
/// Keeping kinds apart means an AccessionNumber and a StudyID that happen to share the same raw
/// digits never resolve to each other's replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum IdentifierKind {
    PatientId,
    AccessionNumber,
    StudyId,
    StudyInstanceUid,
    SeriesInstanceUid,
    SopInstanceUid,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IdentifierKind::PatientId => "PatientID",
            IdentifierKind::AccessionNumber => "AccessionNumber",
            IdentifierKind::StudyId => "StudyID",
            IdentifierKind::StudyInstanceUid => "StudyInstanceUID",
            IdentifierKind::SeriesInstanceUid => "SeriesInstanceUID",
            IdentifierKind::SopInstanceUid => "SOPInstanceUID",
        };
        f.write_str(label)
    }
}

/// One row of the table, as exposed for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry<'a> {
    pub kind: IdentifierKind,
    pub original: &'a str,
    pub replacement: &'a str,
}

/// Original identifier -> replacement, for the lifetime of one run.
///
/// Entries are never overwritten: the first value stored for a key is the one every later lookup
/// sees.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: HashMap<IdentifierKind, HashMap<String, String>>,
    issued: HashMap<IdentifierKind, HashSet<String>>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: IdentifierKind, original: &str) -> Option<&str> {
        self.entries
            .get(&kind)
            .and_then(|by_original| by_original.get(original))
            .map(String::as_str)
    }

    pub fn contains(&self, kind: IdentifierKind, original: &str) -> bool {
        self.get(kind, original).is_some()
    }

    /// Whether `replacement` has already been handed out for `kind`.
    pub fn is_issued(&self, kind: IdentifierKind, replacement: &str) -> bool {
        self.issued
            .get(&kind)
            .is_some_and(|values| values.contains(replacement))
    }

    /// Store `original -> replacement` unless the key is already mapped.
    ///
    /// Returns the value the key resolves to after the call.
    pub fn register(
        &mut self,
        kind: IdentifierKind,
        original: &str,
        replacement: impl Into<String>,
    ) -> String {
        if let Some(existing) = self.get(kind, original) {
            return existing.to_string();
        }
        let replacement = replacement.into();
        self.issued
            .entry(kind)
            .or_default()
            .insert(replacement.clone());
        self.entries
            .entry(kind)
            .or_default()
            .insert(original.to_string(), replacement.clone());
        replacement
    }

    /// Look the key up, generating and storing a replacement only if it is missing.
    pub fn get_or_insert_with<F>(&mut self, kind: IdentifierKind, original: &str, generate: F) -> String
    where
        F: FnOnce() -> String,
    {
        if let Some(existing) = self.get(kind, original) {
            return existing.to_string();
        }
        self.register(kind, original, generate())
    }

    /// Like [`MappingTable::get_or_insert_with`], but redraws until the generated value has not
    /// been issued for this kind yet. `generate` must be able to produce more than one value.
    pub fn get_or_insert_unique<F>(
        &mut self,
        kind: IdentifierKind,
        original: &str,
        mut generate: F,
    ) -> String
    where
        F: FnMut() -> String,
    {
        if let Some(existing) = self.get(kind, original) {
            return existing.to_string();
        }
        let mut candidate = generate();
        while self.is_issued(kind, &candidate) {
            candidate = generate();
        }
        self.register(kind, original, candidate)
    }

    /// Claim `<prefix>.<n>` for the smallest `n >= start` not yet issued for `kind`.
    ///
    /// The value is marked as issued but not tied to any original; pair it with
    /// [`MappingTable::register`] when the record had an identifier of its own.
    pub fn issue_positional(&mut self, kind: IdentifierKind, prefix: &str, start: usize) -> String {
        let issued = self.issued.entry(kind).or_default();
        let mut position = start;
        loop {
            let candidate = format!("{prefix}.{position}");
            if !issued.contains(&candidate) {
                issued.insert(candidate.clone());
                return candidate;
            }
            position += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, ordered by kind and original value.
    pub fn entries(&self) -> Vec<MappingEntry<'_>> {
        let mut rows: Vec<MappingEntry<'_>> = self
            .entries
            .iter()
            .flat_map(|(kind, by_original)| {
                by_original
                    .iter()
                    .map(move |(original, replacement)| MappingEntry {
                        kind: *kind,
                        original,
                        replacement,
                    })
            })
            .collect();
        rows.sort_by(|a, b| (a.kind, a.original).cmp(&(b.kind, b.original)));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinsertion_keeps_first_value() {
        let mut table = MappingTable::new();
        let first = table.register(IdentifierKind::StudyInstanceUid, "1.1", "2.2");
        let second = table.register(IdentifierKind::StudyInstanceUid, "1.1", "3.3");
        assert_eq!(first, "2.2");
        assert_eq!(second, "2.2");
        assert_eq!(table.get(IdentifierKind::StudyInstanceUid, "1.1"), Some("2.2"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn generator_runs_only_for_missing_keys() {
        let mut table = MappingTable::new();
        let mut calls = 0;
        for _ in 0..3 {
            table.get_or_insert_with(IdentifierKind::SeriesInstanceUid, "1.1.1", || {
                calls += 1;
                "9.9.9".to_string()
            });
        }
        assert_eq!(calls, 1);
        assert_eq!(
            table.get(IdentifierKind::SeriesInstanceUid, "1.1.1"),
            Some("9.9.9")
        );
    }

    #[test]
    fn kinds_do_not_collide() {
        let mut table = MappingTable::new();
        table.register(IdentifierKind::AccessionNumber, "12345", "A");
        table.register(IdentifierKind::StudyId, "12345", "B");
        assert_eq!(table.get(IdentifierKind::AccessionNumber, "12345"), Some("A"));
        assert_eq!(table.get(IdentifierKind::StudyId, "12345"), Some("B"));
        assert!(!table.contains(IdentifierKind::PatientId, "12345"));
    }

    #[test]
    fn unique_insert_redraws_issued_values() {
        let mut table = MappingTable::new();
        table.register(IdentifierKind::SeriesInstanceUid, "a", "1.2.3");

        let mut candidates = vec!["1.2.4", "1.2.3"];
        let value = table.get_or_insert_unique(IdentifierKind::SeriesInstanceUid, "b", || {
            candidates.pop().map(str::to_string).unwrap_or_default()
        });
        assert_eq!(value, "1.2.4");
        assert!(table.is_issued(IdentifierKind::SeriesInstanceUid, "1.2.4"));
    }

    #[test]
    fn entries_are_sorted_for_reporting() {
        let mut table = MappingTable::new();
        table.register(IdentifierKind::SopInstanceUid, "b", "2");
        table.register(IdentifierKind::StudyInstanceUid, "z", "3");
        table.register(IdentifierKind::SopInstanceUid, "a", "1");

        let rows = table.entries();
        let originals: Vec<&str> = rows.iter().map(|r| r.original).collect();
        assert_eq!(originals, vec!["z", "a", "b"]);
    }

    #[test]
    fn positional_values_skip_issued_positions() {
        let mut table = MappingTable::new();
        table.register(IdentifierKind::SopInstanceUid, "a", "9.9.0");
        assert_eq!(
            table.issue_positional(IdentifierKind::SopInstanceUid, "9.9", 0),
            "9.9.1"
        );
        assert_eq!(
            table.issue_positional(IdentifierKind::SopInstanceUid, "9.9", 0),
            "9.9.2"
        );
        assert_eq!(
            table.issue_positional(IdentifierKind::SopInstanceUid, "9.9", 7),
            "9.9.7"
        );
        // Issuing does not create entries.
        assert_eq!(table.len(), 1);
    }
}
