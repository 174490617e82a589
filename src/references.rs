//
// references.rs
// dicom-ai-randomize
//
// Rewrites AI results (SEG, SR, PR, SC) so that every study/series/instance they cite points at the
// anonymized identifiers. Reference locations are described by a declarative schema.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::core::{Tag, VR};
use dicom::object::InMemDicomObject;
use rand::Rng;

use crate::dicom_access::{format_tag, ElementAccess};
use crate::error::RewriteError;
use crate::mapping::IdentifierKind::{
    self, SeriesInstanceUid as Series, SopInstanceUid as Sop, StudyInstanceUid as Study,
};
use crate::mapping::MappingTable;
use crate::redaction;
use crate::session::AnonymizationSession;
use crate::tags;

/// One place inside a derived result where an identifier of another record is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceLocation {
    pub name: &'static str,
    /// Sequences to descend through, outermost first. Every item of every level is visited.
    pub path: &'static [Tag],
    /// Element holding the identifier inside the innermost items.
    pub field: Tag,
    pub kind: IdentifierKind,
}

const fn location(
    name: &'static str,
    path: &'static [Tag],
    field: Tag,
    kind: IdentifierKind,
) -> ReferenceLocation {
    ReferenceLocation {
        name,
        path,
        field,
        kind,
    }
}

/// Every reference-bearing location known for derived results, in processing order.
///
/// Supporting a new kind of derived result means adding rows here.
pub const REFERENCE_SCHEMA: &[ReferenceLocation] = &[
    location(
        "ReferencedStudySequence",
        &[tags::REFERENCED_STUDY_SEQUENCE],
        tags::REFERENCED_SOP_INSTANCE_UID,
        Study,
    ),
    location(
        "ReferencedSeriesSequence",
        &[tags::REFERENCED_SERIES_SEQUENCE],
        tags::SERIES_INSTANCE_UID,
        Series,
    ),
    location(
        "ReferencedSeriesSequence/ReferencedImageSequence",
        &[tags::REFERENCED_SERIES_SEQUENCE, tags::REFERENCED_IMAGE_SEQUENCE],
        tags::REFERENCED_SOP_INSTANCE_UID,
        Sop,
    ),
    location(
        "ReferencedSeriesSequence/ReferencedInstanceSequence",
        &[tags::REFERENCED_SERIES_SEQUENCE, tags::REFERENCED_INSTANCE_SEQUENCE],
        tags::REFERENCED_SOP_INSTANCE_UID,
        Sop,
    ),
    location(
        "SourceImageSequence",
        &[tags::SOURCE_IMAGE_SEQUENCE],
        tags::REFERENCED_SOP_INSTANCE_UID,
        Sop,
    ),
    location(
        "RelatedSeriesSequence",
        &[tags::RELATED_SERIES_SEQUENCE],
        tags::STUDY_INSTANCE_UID,
        Study,
    ),
    location(
        "RelatedSeriesSequence",
        &[tags::RELATED_SERIES_SEQUENCE],
        tags::SERIES_INSTANCE_UID,
        Series,
    ),
    location(
        "SoftcopyVOILUTSequence/ReferencedImageSequence",
        &[tags::SOFTCOPY_VOI_LUT_SEQUENCE, tags::REFERENCED_IMAGE_SEQUENCE],
        tags::REFERENCED_SOP_INSTANCE_UID,
        Sop,
    ),
    location(
        "GraphicAnnotationSequence/ReferencedImageSequence",
        &[tags::GRAPHIC_ANNOTATION_SEQUENCE, tags::REFERENCED_IMAGE_SEQUENCE],
        tags::REFERENCED_SOP_INSTANCE_UID,
        Sop,
    ),
    location(
        "DisplayedAreaSelectionSequence/ReferencedImageSequence",
        &[tags::DISPLAYED_AREA_SELECTION_SEQUENCE, tags::REFERENCED_IMAGE_SEQUENCE],
        tags::REFERENCED_SOP_INSTANCE_UID,
        Sop,
    ),
    location(
        "PerFrameFunctionalGroupsSequence/DerivationImageSequence/SourceImageSequence",
        &[
            tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE,
            tags::DERIVATION_IMAGE_SEQUENCE,
            tags::SOURCE_IMAGE_SEQUENCE,
        ],
        tags::REFERENCED_SOP_INSTANCE_UID,
        Sop,
    ),
    location(
        "CurrentRequestedProcedureEvidenceSequence",
        &[tags::CURRENT_REQUESTED_PROCEDURE_EVIDENCE_SEQUENCE],
        tags::STUDY_INSTANCE_UID,
        Study,
    ),
    location(
        "CurrentRequestedProcedureEvidenceSequence/ReferencedSeriesSequence",
        &[
            tags::CURRENT_REQUESTED_PROCEDURE_EVIDENCE_SEQUENCE,
            tags::REFERENCED_SERIES_SEQUENCE,
        ],
        tags::SERIES_INSTANCE_UID,
        Series,
    ),
    location(
        "CurrentRequestedProcedureEvidenceSequence/ReferencedSeriesSequence/ReferencedSOPSequence",
        &[
            tags::CURRENT_REQUESTED_PROCEDURE_EVIDENCE_SEQUENCE,
            tags::REFERENCED_SERIES_SEQUENCE,
            tags::REFERENCED_SOP_SEQUENCE,
        ],
        tags::REFERENCED_SOP_INSTANCE_UID,
        Sop,
    ),
    location(
        "ContentSequence/ContentSequence/ReferencedSOPSequence",
        &[
            tags::CONTENT_SEQUENCE,
            tags::CONTENT_SEQUENCE,
            tags::REFERENCED_SOP_SEQUENCE,
        ],
        tags::REFERENCED_SOP_INSTANCE_UID,
        Sop,
    ),
];

/// Attributes a derived result inherits verbatim from the anonymized reference record.
const INHERITED_IDENTITY: [Tag; 4] = [
    tags::PATIENT_NAME,
    tags::PATIENT_ID,
    tags::ACCESSION_NUMBER,
    tags::STUDY_ID,
];

/// A derived result that made it through rewriting, with its position in the input.
#[derive(Debug, Clone)]
pub struct RewrittenResult {
    pub index: usize,
    pub record: InMemDicomObject,
}

/// Outcome of rewriting one batch of derived results.
#[derive(Debug, Clone, Default)]
pub struct ResultsRewrite {
    pub rewritten: Vec<RewrittenResult>,
    /// One entry per record that was withheld, ordered by record index.
    pub failures: Vec<RewriteError>,
}

/// Rewrite identity fields and nested references of every derived result.
///
/// Identity fields of all records are handled first, so a result may cite another result
/// (e.g. a presentation state pointing at a segmentation) regardless of input order. A record
/// that fails is reported and withheld; the others are still rewritten.
pub fn rewrite_results(
    session: &mut AnonymizationSession,
    reference: &InMemDicomObject,
    results: Vec<InMemDicomObject>,
) -> ResultsRewrite {
    let redact = session.config().redact_results;
    let mut failures = Vec::new();
    let mut staged = Vec::with_capacity(results.len());

    for (index, record) in results.into_iter().enumerate() {
        match apply_identity(session, reference, index, record) {
            Ok(record) => staged.push(RewrittenResult { index, record }),
            Err(e) => {
                tracing::warn!(error = %e, "withholding derived result");
                failures.push(e);
            }
        }
    }

    let table = session.table();
    let mut rewritten = Vec::with_capacity(staged.len());
    for RewrittenResult { index, mut record } in staged {
        match rewrite_references(table, index, &mut record) {
            Ok(count) => {
                tracing::debug!(record = index, references = count, "rewrote references");
                if redact {
                    redaction::redact_result(&mut record);
                }
                rewritten.push(RewrittenResult { index, record });
            }
            Err(e) => {
                tracing::warn!(error = %e, "withholding derived result");
                failures.push(e);
            }
        }
    }

    failures.sort_by_key(RewriteError::record);
    ResultsRewrite {
        rewritten,
        failures,
    }
}

/// Phase A: inherit the current identity and map the record's own identifiers.
///
/// Everything that can fail is checked before the table is touched.
fn apply_identity(
    session: &mut AnonymizationSession,
    reference: &InMemDicomObject,
    index: usize,
    mut record: InMemDicomObject,
) -> Result<InMemDicomObject, RewriteError> {
    let unsupported = |location: &'static str, tag: Tag| RewriteError::UnsupportedValue {
        record: index,
        location,
        tag: format_tag(tag),
    };
    let read = |record: &InMemDicomObject, tag: Tag, location: &'static str| {
        record.text(tag).map_err(|_| unsupported(location, tag))
    };

    let original_study = read(&record, tags::STUDY_INSTANCE_UID, "StudyInstanceUID")?.ok_or(
        RewriteError::MissingAttribute {
            record: index,
            attribute: "StudyInstanceUID",
        },
    )?;
    let original_series = read(&record, tags::SERIES_INSTANCE_UID, "SeriesInstanceUID")?.ok_or(
        RewriteError::MissingAttribute {
            record: index,
            attribute: "SeriesInstanceUID",
        },
    )?;
    let original_sop = read(&record, tags::SOP_INSTANCE_UID, "SOPInstanceUID")?;

    let (table, rng) = session.table_and_rng();
    let study_uid = table
        .get(Study, &original_study)
        .ok_or_else(|| RewriteError::MissingMapping {
            record: index,
            location: "StudyInstanceUID",
            kind: Study,
            identifier: original_study.clone(),
        })?
        .to_string();

    // Derived series have no counterpart in the study, so they are minted on first sight.
    let series_uid = table.get_or_insert_unique(Series, &original_series, || {
        format!("{study_uid}.{}", rng.random_range(1..=99_999u32))
    });
    // A result filed into a study series must not reuse a position the images already hold.
    let sop_uid = table.issue_positional(Sop, &series_uid, index);
    if let Some(original_sop) = &original_sop {
        table.register(Sop, original_sop, sop_uid.clone());
    }

    for tag in INHERITED_IDENTITY {
        match reference.element(tag) {
            Ok(element) => {
                record.put(element.clone());
            }
            Err(_) => {
                record.remove_element(tag);
            }
        }
    }
    record.put_text(tags::STUDY_INSTANCE_UID, VR::UI, &study_uid);
    record.put_text(tags::SERIES_INSTANCE_UID, VR::UI, &series_uid);
    record.put_text(tags::SOP_INSTANCE_UID, VR::UI, &sop_uid);

    Ok(record)
}

/// Phase B: rewrite every identifier found at the schema locations.
///
/// Returns how many identifiers were replaced. Locations missing from the record are skipped.
pub fn rewrite_references(
    table: &MappingTable,
    index: usize,
    record: &mut InMemDicomObject,
) -> Result<usize, RewriteError> {
    rewrite_with(index, record, &mut |kind: IdentifierKind, original: &str| {
        table.get(kind, original).map(str::to_string)
    })
}

/// Walk every schema location, replacing each identifier with what `resolve` returns for it.
/// `None` means the identifier has no replacement.
pub(crate) fn rewrite_with<R>(
    index: usize,
    record: &mut InMemDicomObject,
    resolve: &mut R,
) -> Result<usize, RewriteError>
where
    R: FnMut(IdentifierKind, &str) -> Option<String>,
{
    let mut total = 0;
    for location in REFERENCE_SCHEMA {
        let count = rewrite_location(index, location, location.path, record, resolve)?;
        if count > 0 {
            tracing::debug!(record = index, location = location.name, count, "updated references");
        }
        total += count;
    }
    Ok(total)
}

fn rewrite_location<R>(
    index: usize,
    location: &ReferenceLocation,
    path: &[Tag],
    obj: &mut InMemDicomObject,
    resolve: &mut R,
) -> Result<usize, RewriteError>
where
    R: FnMut(IdentifierKind, &str) -> Option<String>,
{
    let unsupported = |tag: Tag| RewriteError::UnsupportedValue {
        record: index,
        location: location.name,
        tag: format_tag(tag),
    };

    let Some((&sequence, rest)) = path.split_first() else {
        let Some(original) = obj.text(location.field).map_err(|s| unsupported(s.tag))? else {
            return Ok(0);
        };
        let replacement =
            resolve(location.kind, &original).ok_or_else(|| RewriteError::MissingMapping {
                record: index,
                location: location.name,
                kind: location.kind,
                identifier: original.clone(),
            })?;
        obj.put_text(location.field, VR::UI, &replacement);
        return Ok(1);
    };

    let Some(items) = obj.sequence_items(sequence).map_err(|s| unsupported(s.tag))? else {
        return Ok(0);
    };
    let mut items = items.to_vec();
    let mut count = 0;
    for item in &mut items {
        count += rewrite_location(index, location, rest, item, resolve)?;
    }
    if count > 0 {
        obj.put_items(sequence, items);
    }
    Ok(count)
}
