//
// error.rs
// dicom-ai-randomize
//
// Error types for study anonymization (fatal for the study) and result rewriting (fatal for one record).
//
// Thales Matheus Mendonça Santos - November 2025

use serde::Serialize;
use thiserror::Error;

use crate::mapping::IdentifierKind;

/// Failures that abort anonymization of a whole study.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StudyError {
    #[error("study contains no records")]
    EmptyStudy,

    #[error("study record {index} has no {attribute}")]
    MissingAttribute {
        index: usize,
        attribute: &'static str,
    },

    #[error("study record {index}: {attribute} is not a text value")]
    UnsupportedValue {
        index: usize,
        attribute: &'static str,
    },
}

/// Failures that stop one derived result from being emitted.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RewriteError {
    #[error("result {record}: {location} cites {kind} {identifier}, which is not part of the study")]
    MissingMapping {
        record: usize,
        location: &'static str,
        kind: IdentifierKind,
        identifier: String,
    },

    #[error("result {record}: {location} holds an unsupported value at {tag}")]
    UnsupportedValue {
        record: usize,
        location: &'static str,
        tag: String,
    },

    #[error("result {record} has no {attribute}")]
    MissingAttribute {
        record: usize,
        attribute: &'static str,
    },
}

impl RewriteError {
    pub fn record(&self) -> usize {
        match self {
            RewriteError::MissingMapping { record, .. }
            | RewriteError::UnsupportedValue { record, .. }
            | RewriteError::MissingAttribute { record, .. } => *record,
        }
    }

    /// A missing mapping leaves the record partially anonymized; anything else means the record
    /// could not be processed at all.
    pub fn is_partial(&self) -> bool {
        matches!(self, RewriteError::MissingMapping { .. })
    }
}
