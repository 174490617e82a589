//
// config.rs
// dicom-ai-randomize
//
// Caller-supplied settings for one anonymization run: redaction switch, UID root, name override and seed.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Longest root we accept, leaving room for `.<7 digits>.<8 digits>.<10 digits>.<index>` within
/// the 64 character UID limit.
pub const UID_ROOT_MAX_LENGTH: usize = 24;
const UID_ROOT_DEFAULT_VALUE: &str = "1.2.840";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0:?} is not a valid UID root: {1}")]
pub struct UidRootError(String, &'static str);

/// Dotted numeric prefix used for every generated StudyInstanceUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidRoot(String);

impl UidRoot {
    pub fn new(root: &str) -> Result<Self, UidRootError> {
        let root = root.trim().trim_end_matches('.');
        let fail = |reason| Err(UidRootError(root.to_string(), reason));

        if root.is_empty() {
            return fail("it is empty");
        }
        if root.len() > UID_ROOT_MAX_LENGTH {
            return fail("it is longer than 24 characters");
        }
        if !root.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return fail("only digits and dots are allowed");
        }
        for component in root.split('.') {
            if component.is_empty() {
                return fail("it contains an empty component");
            }
            if component.len() > 1 && component.starts_with('0') {
                return fail("components must not have leading zeros");
            }
        }

        Ok(Self(root.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UidRoot {
    fn default() -> Self {
        Self(UID_ROOT_DEFAULT_VALUE.into())
    }
}

impl FromStr for UidRoot {
    type Err = UidRootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UidRoot::new(s)
    }
}

impl fmt::Display for UidRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Settings for one run. The core never reads files or the environment; everything comes from here.
#[derive(Debug, Clone, Default)]
pub struct AnonymizerConfig {
    /// Replace annotation text and detection summaries in derived results with a failure message.
    pub redact_results: bool,
    pub uid_root: UidRoot,
    /// Use this name instead of drawing a synthetic one.
    pub patient_name: Option<String>,
    /// Seed for the random parts of generated identifiers; `None` draws from the OS.
    pub seed: Option<u64>,
}

impl AnonymizerConfig {
    pub fn with_redaction(mut self, enabled: bool) -> Self {
        self.redact_results = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_patient_name(mut self, name: impl Into<String>) -> Self {
        self.patient_name = Some(name.into());
        self
    }

    pub fn with_uid_root(mut self, root: UidRoot) -> Self {
        self.uid_root = root;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_root_is_valid() {
        assert_eq!(UidRoot::default().as_str(), "1.2.840");
        assert!(UidRoot::new(UidRoot::default().as_str()).is_ok());
    }

    #[test]
    fn trailing_dot_is_dropped() {
        let root: UidRoot = "2.16.840.".parse().unwrap();
        assert_eq!(root.as_str(), "2.16.840");
    }

    #[test]
    fn invalid_roots_are_rejected() {
        for bad in ["", "1..2", "1.2a", "1.02", "1.2.3.4.5.6.7.8.9.10.11.12.13"] {
            assert!(bad.parse::<UidRoot>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn builder_sets_fields() {
        let config = AnonymizerConfig::default()
            .with_redaction(true)
            .with_seed(42)
            .with_patient_name("Doe^Jane");
        assert!(config.redact_results);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.patient_name.as_deref(), Some("Doe^Jane"));
    }
}
