//
// lib.rs
// dicom-ai-randomize
//
// Exposes the anonymization core, the folder collaborator and the CLI entry point for both binary and
// library consumers.
//
// Thales Matheus Mendonça Santos - November 2025

pub mod cli;
pub mod config;
pub mod dicom_access;
pub mod error;
pub mod hasher;
pub mod identity;
pub mod mapping;
pub mod models;
pub mod randomize;
pub mod redaction;
pub mod references;
pub mod session;
pub mod storage;
pub mod study;
pub mod tags;

pub use cli::{run as run_cli, Cli, Commands};
pub use config::{AnonymizerConfig, UidRoot};
pub use error::{RewriteError, StudyError};
pub use mapping::{IdentifierKind, MappingTable};
pub use models::RunSummary;
pub use randomize::{anonymize_only, randomize, RandomizedStudy};
pub use session::AnonymizationSession;
pub use study::AnonymizedStudy;
