//
// session.rs
// dicom-ai-randomize
//
// Owns the mapping table, random source and study identity for the lifetime of one run.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::object::InMemDicomObject;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::AnonymizerConfig;
use crate::dicom_access::ElementAccess;
use crate::error::StudyError;
use crate::identity::{Sex, SyntheticIdentity};
use crate::mapping::MappingTable;
use crate::references::{self, ResultsRewrite};
use crate::study::{self, AnonymizedStudy};
use crate::tags;

/// State shared by every phase of one run.
///
/// Phases borrow the session mutably, so there is only ever one writer of the mapping table.
#[derive(Debug)]
pub struct AnonymizationSession {
    config: AnonymizerConfig,
    table: MappingTable,
    rng: StdRng,
    identity: Option<SyntheticIdentity>,
}

impl AnonymizationSession {
    pub fn new(config: AnonymizerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            table: MappingTable::new(),
            rng,
            identity: None,
        }
    }

    pub fn config(&self) -> &AnonymizerConfig {
        &self.config
    }

    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    pub fn into_table(self) -> MappingTable {
        self.table
    }

    pub fn identity(&self) -> Option<&SyntheticIdentity> {
        self.identity.as_ref()
    }

    /// Anonymize the records of the run's study. See [`study::anonymize_study`].
    pub fn anonymize_study(
        &mut self,
        records: &[InMemDicomObject],
    ) -> Result<AnonymizedStudy, StudyError> {
        study::anonymize_study(self, records)
    }

    /// Rewrite derived results against the anonymized reference record. See
    /// [`references::rewrite_results`].
    pub fn rewrite_results(
        &mut self,
        reference: &InMemDicomObject,
        results: Vec<InMemDicomObject>,
    ) -> ResultsRewrite {
        references::rewrite_results(self, reference, results)
    }

    /// The identity for this run, drawn from `first` on the first call and reused afterwards.
    pub(crate) fn study_identity(&mut self, first: &InMemDicomObject) -> SyntheticIdentity {
        if let Some(identity) = &self.identity {
            return identity.clone();
        }

        let identity = match &self.config.patient_name {
            Some(name) => SyntheticIdentity::from_name(name.clone()),
            None => {
                let sex = Sex::from_code(first.element_str(tags::PATIENT_SEX).as_deref());
                let modality = first.element_str(tags::MODALITY);
                SyntheticIdentity::generate(sex, modality.as_deref(), &mut self.rng)
            }
        };
        tracing::debug!(name = %identity.name, patient_id = %identity.patient_id, "drew study identity");
        self.identity = Some(identity.clone());
        identity
    }

    pub(crate) fn table_and_rng(&mut self) -> (&mut MappingTable, &mut StdRng) {
        (&mut self.table, &mut self.rng)
    }
}
