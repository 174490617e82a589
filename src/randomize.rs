//
// randomize.rs
// dicom-ai-randomize
//
// Runs one study and its AI results through the anonymizer and the reference rewriter, grouping the
// rewritten results by modality and summarizing what happened.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;

use dicom::object::InMemDicomObject;

use crate::config::AnonymizerConfig;
use crate::dicom_access::ElementAccess;
use crate::error::StudyError;
use crate::identity::SyntheticIdentity;
use crate::mapping::MappingTable;
use crate::models::{RecordIssue, RunSummary};
use crate::references::RewrittenResult;
use crate::session::AnonymizationSession;
use crate::study::AnonymizedStudy;
use crate::tags;

/// Folder/group name for results without a Modality.
pub const UNKNOWN_MODALITY: &str = "IMG";

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct RandomizedStudy {
    pub study: AnonymizedStudy,
    pub identity: SyntheticIdentity,
    /// Rewritten results grouped by their Modality.
    pub results: BTreeMap<String, Vec<RewrittenResult>>,
    pub summary: RunSummary,
    pub mapping: MappingTable,
}

pub fn modality_of(record: &InMemDicomObject) -> String {
    record
        .element_str(tags::MODALITY)
        .unwrap_or_else(|| UNKNOWN_MODALITY.to_string())
}

/// Anonymize `study` and rewrite `results` against it in a fresh session.
///
/// The study is all-or-nothing: if it fails, no output is produced. Individual results that
/// fail are left out and listed in the summary.
pub fn randomize(
    config: AnonymizerConfig,
    study: &[InMemDicomObject],
    results: Vec<InMemDicomObject>,
) -> Result<RandomizedStudy, StudyError> {
    let mut session = AnonymizationSession::new(config);
    let anonymized = session.anonymize_study(study)?;

    let results_received = results.len();
    let outcome = session.rewrite_results(anonymized.reference(), results);

    let mut summary = RunSummary {
        study_records: anonymized.records.len(),
        prior_records: if anonymized.has_prior() {
            anonymized.prior.len()
        } else {
            0
        },
        current_records: anonymized.current.len(),
        results_received,
        fully_anonymized: outcome.rewritten.len(),
        ..Default::default()
    };

    for failure in &outcome.failures {
        let issue = RecordIssue {
            record: Some(failure.record()),
            source: None,
            reason: failure.to_string(),
        };
        if failure.is_partial() {
            summary.partially_anonymized.push(issue);
        } else {
            summary.skipped.push(issue);
        }
    }

    let mut grouped: BTreeMap<String, Vec<RewrittenResult>> = BTreeMap::new();
    for result in outcome.rewritten {
        grouped
            .entry(modality_of(&result.record))
            .or_default()
            .push(result);
    }
    summary.results_by_modality = grouped
        .iter()
        .map(|(modality, records)| (modality.clone(), records.len()))
        .collect();
    summary.mapping_entries = session.table().len();

    tracing::info!(
        results = results_received,
        rewritten = summary.fully_anonymized,
        partial = summary.partially_anonymized.len(),
        skipped = summary.skipped.len(),
        "randomized study and results"
    );

    let identity = session
        .identity()
        .cloned()
        .unwrap_or_else(|| SyntheticIdentity::from_name(""));

    Ok(RandomizedStudy {
        study: anonymized,
        identity,
        results: grouped,
        summary,
        mapping: session.into_table(),
    })
}

/// Study-only variant: identity and identifier substitution without any derived results.
pub fn anonymize_only(
    config: AnonymizerConfig,
    study: &[InMemDicomObject],
) -> Result<RandomizedStudy, StudyError> {
    randomize(config, study, Vec::new())
}
