//
// models.rs
// dicom-ai-randomize
//
// Serializable run summary reported to users after a study and its AI results were randomized.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Why one input did not come out fully anonymized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIssue {
    /// Position among the derived results, when the input got that far.
    pub record: Option<usize>,
    /// File the record came from, filled in by the caller when known.
    pub source: Option<String>,
    pub reason: String,
}

/// Counts and reasons for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub study_records: usize,
    pub prior_records: usize,
    pub current_records: usize,
    pub results_received: usize,
    pub fully_anonymized: usize,
    pub partially_anonymized: Vec<RecordIssue>,
    pub skipped: Vec<RecordIssue>,
    pub results_by_modality: BTreeMap<String, usize>,
    pub mapping_entries: usize,
}

impl RunSummary {
    /// Record an input that could not even be decoded into a record.
    pub fn skip_input(&mut self, source: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(RecordIssue {
            record: None,
            source: Some(source.into()),
            reason: reason.into(),
        });
    }

    /// Attach file names to issues that only carry a result index.
    pub fn attach_sources<F>(&mut self, mut source_of: F)
    where
        F: FnMut(usize) -> Option<String>,
    {
        for issue in self
            .partially_anonymized
            .iter_mut()
            .chain(self.skipped.iter_mut())
        {
            if issue.source.is_none() {
                issue.source = issue.record.and_then(&mut source_of);
            }
        }
    }

    /// True when every input made it through untouched by errors.
    pub fn is_clean(&self) -> bool {
        self.partially_anonymized.is_empty() && self.skipped.is_empty()
    }
}
