//
// study.rs
// dicom-ai-randomize
//
// Replaces the identity and identifiers of every record of a study and splits it into prior/current exams.
//
// Thales Matheus Mendonça Santos - November 2025

use chrono::NaiveDate;
use dicom::core::{Tag, VR};
use dicom::object::InMemDicomObject;
use rand::Rng;

use crate::dicom_access::ElementAccess;
use crate::error::{RewriteError, StudyError};
use crate::hasher::hash_digits;
use crate::identity::PATIENT_ID_LEN;
use crate::mapping::IdentifierKind;
use crate::references;
use crate::session::AnonymizationSession;
use crate::tags;

/// Length of generated AccessionNumber and StudyID values.
pub const STUDY_KEY_LEN: usize = 16;

/// Anonymized study records, in input order, plus the prior/current split.
#[derive(Debug, Clone)]
pub struct AnonymizedStudy {
    pub records: Vec<InMemDicomObject>,
    /// Indices of records acquired on the earliest StudyDate.
    pub prior: Vec<usize>,
    /// Indices of the remaining records, or of every record when all share one date.
    pub current: Vec<usize>,
    /// Record whose identity derived results inherit: the first current record.
    pub reference_index: usize,
}

impl AnonymizedStudy {
    pub fn reference(&self) -> &InMemDicomObject {
        &self.records[self.reference_index]
    }

    /// Whether the input mixed exam dates, i.e. a prior exam was found.
    pub fn has_prior(&self) -> bool {
        self.prior.len() < self.records.len() && !self.prior.is_empty()
    }

    pub fn prior_records(&self) -> impl Iterator<Item = &InMemDicomObject> {
        self.prior.iter().map(|&i| &self.records[i])
    }

    pub fn current_records(&self) -> impl Iterator<Item = &InMemDicomObject> {
        self.current.iter().map(|&i| &self.records[i])
    }
}

/// Identifiers read from one input record before anything is replaced.
struct OriginalIds {
    patient_id: Option<String>,
    study_uid: String,
    accession: String,
    study_id: String,
    series_uid: String,
    sop_uid: Option<String>,
}

impl OriginalIds {
    fn read(index: usize, record: &InMemDicomObject) -> Result<Self, StudyError> {
        let text = |tag: Tag, attribute: &'static str| {
            record
                .text(tag)
                .map_err(|_| StudyError::UnsupportedValue { index, attribute })
        };
        let required = |tag: Tag, attribute: &'static str| -> Result<String, StudyError> {
            text(tag, attribute)?.ok_or(StudyError::MissingAttribute { index, attribute })
        };

        let study_uid = required(tags::STUDY_INSTANCE_UID, "StudyInstanceUID")?;
        let series_uid = required(tags::SERIES_INSTANCE_UID, "SeriesInstanceUID")?;
        let sop_uid = text(tags::SOP_INSTANCE_UID, "SOPInstanceUID")?;
        let patient_id = text(tags::PATIENT_ID, "PatientID")?;

        // Records of one study that lack these keys must still converge on the same replacement.
        let accession = text(tags::ACCESSION_NUMBER, "AccessionNumber")?
            .unwrap_or_else(|| hash_digits(&study_uid, STUDY_KEY_LEN));
        let study_id = text(tags::STUDY_ID, "StudyID")?
            .unwrap_or_else(|| hash_digits(&accession, STUDY_KEY_LEN));

        Ok(Self {
            patient_id,
            study_uid,
            accession,
            study_id,
            series_uid,
            sop_uid,
        })
    }
}

/// Anonymize every record of one study.
///
/// All mapping-table changes are staged and only committed once every record succeeded, so a
/// failing study leaves the session table as it was.
pub fn anonymize_study(
    session: &mut AnonymizationSession,
    records: &[InMemDicomObject],
) -> Result<AnonymizedStudy, StudyError> {
    let first = records.first().ok_or(StudyError::EmptyStudy)?;
    let identity = session.study_identity(first);
    let root = session.config().uid_root.to_string();
    let name_hash = hash_digits(&identity.name, PATIENT_ID_LEN);

    let (table, rng) = session.table_and_rng();
    let mut staged = table.clone();
    let mut anonymized = Vec::with_capacity(records.len());
    let mut study_uids = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let original = OriginalIds::read(index, record)?;

        if let Some(patient_id) = &original.patient_id {
            staged.register(IdentifierKind::PatientId, patient_id, identity.patient_id.clone());
        }

        let study_uid =
            staged.get_or_insert_unique(IdentifierKind::StudyInstanceUid, &original.study_uid, || {
                format!(
                    "{root}.{name_hash}.{}",
                    rng.random_range(10_000_000..=99_999_999u32)
                )
            });
        let accession =
            staged.get_or_insert_with(IdentifierKind::AccessionNumber, &original.accession, || {
                hash_digits(&study_uid, STUDY_KEY_LEN)
            });
        let study_id = staged.get_or_insert_with(IdentifierKind::StudyId, &original.study_id, || {
            hash_digits(&accession, STUDY_KEY_LEN)
        });
        let series_uid =
            staged.get_or_insert_unique(IdentifierKind::SeriesInstanceUid, &original.series_uid, || {
                format!(
                    "{study_uid}.{}",
                    rng.random_range(1_000_000_000..=9_999_999_999u64)
                )
            });

        // Always fresh, so duplicated inputs still come out unique within their series.
        let sop_uid =
            staged.issue_positional(IdentifierKind::SopInstanceUid, &series_uid, index);
        if let Some(original_sop) = &original.sop_uid {
            staged.register(IdentifierKind::SopInstanceUid, original_sop, sop_uid.clone());
        }

        let mut out = record.clone();
        out.put_text(tags::PATIENT_NAME, VR::PN, &identity.name);
        out.put_text(tags::PATIENT_ID, VR::LO, &identity.patient_id);
        out.put_text(tags::STUDY_INSTANCE_UID, VR::UI, &study_uid);
        out.put_text(tags::ACCESSION_NUMBER, VR::SH, &accession);
        out.put_text(tags::STUDY_ID, VR::SH, &study_id);
        out.put_text(tags::SERIES_INSTANCE_UID, VR::UI, &series_uid);
        out.put_text(tags::SOP_INSTANCE_UID, VR::UI, &sop_uid);
        anonymized.push(out);
        study_uids.push(study_uid);
    }

    // Images may cite each other (or instances that were not exported), so references are
    // rewritten only once every record of the study is in the table.
    for (index, record) in anonymized.iter_mut().enumerate() {
        let study_uid = &study_uids[index];
        let mut resolve = |kind: IdentifierKind, original: &str| {
            Some(staged.get_or_insert_unique(kind, original, || match kind {
                IdentifierKind::StudyInstanceUid => format!(
                    "{root}.{name_hash}.{}",
                    rng.random_range(10_000_000..=99_999_999u32)
                ),
                IdentifierKind::SeriesInstanceUid => format!(
                    "{study_uid}.{}",
                    rng.random_range(1_000_000_000..=9_999_999_999u64)
                ),
                _ => format!(
                    "{study_uid}.{}.0",
                    rng.random_range(1_000_000_000..=9_999_999_999u64)
                ),
            }))
        };
        references::rewrite_with(index, record, &mut resolve).map_err(|e| match e {
            RewriteError::MissingAttribute { attribute, .. } => {
                StudyError::MissingAttribute { index, attribute }
            }
            RewriteError::MissingMapping { location, .. }
            | RewriteError::UnsupportedValue { location, .. } => StudyError::UnsupportedValue {
                index,
                attribute: location,
            },
        })?;
    }

    *table = staged;

    let (prior, current) = partition_by_date(&anonymized);
    let reference_index = current.first().copied().unwrap_or(0);
    tracing::info!(
        records = anonymized.len(),
        prior = prior.len(),
        current = current.len(),
        patient = %identity.name,
        "anonymized study"
    );

    Ok(AnonymizedStudy {
        records: anonymized,
        prior,
        current,
        reference_index,
    })
}

fn study_date(record: &InMemDicomObject) -> Option<NaiveDate> {
    let text = record.element_str(tags::STUDY_DATE)?;
    NaiveDate::parse_from_str(&text, "%Y%m%d").ok()
}

/// Split record indices into (prior, current) by StudyDate.
///
/// Prior records carry the earliest date. Undated records are always current. Without date
/// diversity every record is both prior and current.
pub fn partition_by_date(records: &[InMemDicomObject]) -> (Vec<usize>, Vec<usize>) {
    let dates: Vec<Option<NaiveDate>> = records.iter().map(study_date).collect();
    let all: Vec<usize> = (0..records.len()).collect();

    let Some(earliest) = dates.iter().flatten().min().copied() else {
        return (all.clone(), all);
    };

    let (prior, current): (Vec<usize>, Vec<usize>) =
        all.iter().copied().partition(|&i| dates[i] == Some(earliest));

    if current.is_empty() {
        (all.clone(), all)
    } else {
        (prior, current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnonymizerConfig;

    fn record(study: &str, series: &str, sop: &str, date: Option<&str>) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        obj.put_text(tags::PATIENT_NAME, VR::PN, "Real^Person");
        obj.put_text(tags::PATIENT_ID, VR::LO, "MRN-001");
        obj.put_text(tags::PATIENT_SEX, VR::CS, "F");
        obj.put_text(tags::MODALITY, VR::CS, "CT");
        obj.put_text(tags::STUDY_INSTANCE_UID, VR::UI, study);
        obj.put_text(tags::SERIES_INSTANCE_UID, VR::UI, series);
        obj.put_text(tags::SOP_INSTANCE_UID, VR::UI, sop);
        if let Some(date) = date {
            obj.put_text(tags::STUDY_DATE, VR::DA, date);
        }
        obj
    }

    fn session() -> AnonymizationSession {
        AnonymizationSession::new(AnonymizerConfig::default().with_seed(11))
    }

    #[test]
    fn empty_study_is_rejected() {
        let mut session = session();
        assert_eq!(
            anonymize_study(&mut session, &[]).unwrap_err(),
            StudyError::EmptyStudy
        );
    }

    #[test]
    fn missing_series_uid_aborts_without_touching_table() {
        let mut session = session();
        let good = record("1.1", "1.1.1", "1.1.1.1", None);
        let mut bad = record("1.1", "1.1.2", "1.1.2.1", None);
        bad.remove_element(tags::SERIES_INSTANCE_UID);

        let err = anonymize_study(&mut session, &[good, bad]).unwrap_err();
        assert_eq!(
            err,
            StudyError::MissingAttribute {
                index: 1,
                attribute: "SeriesInstanceUID"
            }
        );
        assert!(session.table().is_empty());
    }

    #[test]
    fn generated_identifiers_follow_the_documented_shapes() {
        let mut session = session();
        let study = anonymize_study(&mut session, &[record("1.1", "1.1.1", "1.1.1.1", None)])
            .expect("anonymize");
        let out = &study.records[0];

        let study_uid = out.element_str(tags::STUDY_INSTANCE_UID).unwrap();
        let parts: Vec<&str> = study_uid.split('.').collect();
        assert_eq!(&parts[..3], &["1", "2", "840"]);
        assert_eq!(parts[3].len(), 7);
        assert_eq!(parts[4].len(), 8);

        let series_uid = out.element_str(tags::SERIES_INSTANCE_UID).unwrap();
        let suffix = series_uid.strip_prefix(&format!("{study_uid}.")).unwrap();
        assert_eq!(suffix.len(), 10);

        let accession = out.element_str(tags::ACCESSION_NUMBER).unwrap();
        assert_eq!(accession, hash_digits(&study_uid, STUDY_KEY_LEN));
        let study_id = out.element_str(tags::STUDY_ID).unwrap();
        assert_eq!(study_id, hash_digits(&accession, STUDY_KEY_LEN));

        assert_eq!(
            out.element_str(tags::SOP_INSTANCE_UID).unwrap(),
            format!("{series_uid}.0")
        );
    }

    #[test]
    fn records_without_accession_number_converge() {
        let mut session = session();
        let study = anonymize_study(
            &mut session,
            &[
                record("1.1", "1.1.1", "1.1.1.1", None),
                record("1.1", "1.1.2", "1.1.2.1", None),
            ],
        )
        .expect("anonymize");

        let accessions: Vec<String> = study
            .records
            .iter()
            .map(|r| r.element_str(tags::ACCESSION_NUMBER).unwrap())
            .collect();
        assert_eq!(accessions[0], accessions[1]);
        assert!(session
            .table()
            .contains(IdentifierKind::AccessionNumber, &hash_digits("1.1", STUDY_KEY_LEN)));
    }

    #[test]
    fn original_patient_id_is_registered() {
        let mut session = session();
        let study = anonymize_study(&mut session, &[record("1.1", "1.1.1", "1.1.1.1", None)])
            .expect("anonymize");
        let new_id = study.records[0].element_str(tags::PATIENT_ID).unwrap();
        assert_eq!(
            session.table().get(IdentifierKind::PatientId, "MRN-001"),
            Some(new_id.as_str())
        );
    }

    #[test]
    fn prior_exam_is_split_from_current() {
        let records = vec![
            record("1.1", "1.1.1", "a", Some("20240301")),
            record("1.2", "1.2.1", "b", Some("20230110")),
            record("1.1", "1.1.1", "c", Some("20240301")),
            record("1.3", "1.3.1", "d", None),
        ];
        let (prior, current) = partition_by_date(&records);
        assert_eq!(prior, vec![1]);
        assert_eq!(current, vec![0, 2, 3]);

        let mut session = session();
        let study = anonymize_study(&mut session, &records).expect("anonymize");
        assert!(study.has_prior());
        assert_eq!(study.reference_index, 0);
        assert_eq!(study.prior_records().count(), 1);
    }

    #[test]
    fn single_date_means_everything_is_current() {
        let records = vec![
            record("1.1", "1.1.1", "a", Some("20240301")),
            record("1.1", "1.1.1", "b", Some("20240301")),
        ];
        let (prior, current) = partition_by_date(&records);
        assert_eq!(prior, vec![0, 1]);
        assert_eq!(current, vec![0, 1]);

        let undated = vec![record("1.1", "1.1.1", "a", None)];
        assert_eq!(partition_by_date(&undated), (vec![0], vec![0]));
    }

    #[test]
    fn references_between_images_are_rewritten() {
        let source = record("1.1", "1.1.1", "1.1.1.1", None);
        let mut derived = record("1.1", "1.1.2", "1.1.2.1", None);
        let mut cited = InMemDicomObject::new_empty();
        cited.put_text(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, "1.1.1.1");
        derived.put_items(tags::SOURCE_IMAGE_SEQUENCE, vec![cited]);
        let mut localizer = InMemDicomObject::new_empty();
        localizer.put_text(tags::SERIES_INSTANCE_UID, VR::UI, "1.1.5");
        let mut localizer_image = InMemDicomObject::new_empty();
        localizer_image.put_text(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, "1.1.5.1");
        localizer.put_items(tags::REFERENCED_IMAGE_SEQUENCE, vec![localizer_image]);
        derived.put_items(tags::REFERENCED_SERIES_SEQUENCE, vec![localizer]);

        let mut session = session();
        let study = anonymize_study(&mut session, &[source, derived]).expect("anonymize");
        let out = &study.records[1];

        let cited = &out.sequence_items(tags::SOURCE_IMAGE_SEQUENCE).unwrap().unwrap()[0];
        assert_eq!(
            cited.element_str(tags::REFERENCED_SOP_INSTANCE_UID),
            study.records[0].element_str(tags::SOP_INSTANCE_UID)
        );

        // The localizer was not part of the input; it still gets a fresh mapping.
        let study_uid = out.element_str(tags::STUDY_INSTANCE_UID).unwrap();
        let localizer = &out.sequence_items(tags::REFERENCED_SERIES_SEQUENCE).unwrap().unwrap()[0];
        let localizer_series = localizer.element_str(tags::SERIES_INSTANCE_UID).unwrap();
        assert!(localizer_series.starts_with(&format!("{study_uid}.")));
        assert_eq!(
            session.table().get(IdentifierKind::SeriesInstanceUid, "1.1.5"),
            Some(localizer_series.as_str())
        );
        let localizer_image =
            &localizer.sequence_items(tags::REFERENCED_IMAGE_SEQUENCE).unwrap().unwrap()[0];
        let localizer_sop = localizer_image.element_str(tags::REFERENCED_SOP_INSTANCE_UID).unwrap();
        assert_ne!(localizer_sop, "1.1.5.1");
        assert!(session
            .table()
            .contains(IdentifierKind::SopInstanceUid, "1.1.5.1"));
    }

    #[test]
    fn malformed_reference_in_an_image_fails_the_study() {
        let mut broken = record("1.1", "1.1.1", "1.1.1.1", None);
        broken.put_text(tags::SOURCE_IMAGE_SEQUENCE, VR::UI, "1.1.1.2");

        let mut session = session();
        let err = anonymize_study(&mut session, &[broken]).unwrap_err();
        assert_eq!(
            err,
            StudyError::UnsupportedValue {
                index: 0,
                attribute: "SourceImageSequence"
            }
        );
        assert!(session.table().is_empty());
    }
}
