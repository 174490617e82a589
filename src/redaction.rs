//
// redaction.rs
// dicom-ai-randomize
//
// Turns rewritten presentation states and structured reports into "scan failed" results.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::core::VR;
use dicom::object::InMemDicomObject;

use crate::dicom_access::ElementAccess;
use crate::tags;

pub const FAILURE_TEXT: &str = "Failed to scan the study";
pub const FAILED_CODE_VALUE: &str = "111224";
pub const FAILED_CODE_MEANING: &str = "Failed";
pub const SUMMARY_OF_DETECTIONS: &str = "Summary of Detections";

/// What [`redact_result`] changed in one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedactionReport {
    pub annotations: usize,
    pub detection_summaries: usize,
}

/// Redact annotation content and detection summaries of a derived result in place.
pub fn redact_result(record: &mut InMemDicomObject) -> RedactionReport {
    let report = RedactionReport {
        annotations: redact_annotations(record),
        detection_summaries: redact_detection_summaries(record),
    };
    if report != RedactionReport::default() {
        tracing::debug!(
            annotations = report.annotations,
            detection_summaries = report.detection_summaries,
            "redacted derived result"
        );
    }
    report
}

/// Every text object under a graphic annotation gets the failure text; the images and graphics
/// it pointed at are dropped.
fn redact_annotations(record: &mut InMemDicomObject) -> usize {
    let Ok(Some(annotations)) = record.sequence_items(tags::GRAPHIC_ANNOTATION_SEQUENCE) else {
        return 0;
    };
    let mut annotations = annotations.to_vec();

    for annotation in &mut annotations {
        if let Ok(Some(texts)) = annotation.sequence_items(tags::TEXT_OBJECT_SEQUENCE) {
            let mut texts = texts.to_vec();
            for text in &mut texts {
                text.put_text(tags::UNFORMATTED_TEXT_VALUE, VR::ST, FAILURE_TEXT);
            }
            annotation.put_items(tags::TEXT_OBJECT_SEQUENCE, texts);
        }
        annotation.remove_element(tags::REFERENCED_IMAGE_SEQUENCE);
        annotation.remove_element(tags::GRAPHIC_OBJECT_SEQUENCE);
    }

    let count = annotations.len();
    record.put_items(tags::GRAPHIC_ANNOTATION_SEQUENCE, annotations);
    count
}

fn is_detection_summary(entry: &InMemDicomObject) -> bool {
    entry
        .sequence_items(tags::CONCEPT_NAME_CODE_SEQUENCE)
        .ok()
        .flatten()
        .and_then(|codes| codes.first())
        .and_then(|code| code.element_str(tags::CODE_MEANING))
        .is_some_and(|meaning| meaning == SUMMARY_OF_DETECTIONS)
}

/// Top-level content items coded "Summary of Detections" report a failed result instead.
fn redact_detection_summaries(record: &mut InMemDicomObject) -> usize {
    let Ok(Some(entries)) = record.sequence_items(tags::CONTENT_SEQUENCE) else {
        return 0;
    };
    let mut entries = entries.to_vec();
    let mut count = 0;

    for entry in entries.iter_mut().filter(|e| is_detection_summary(e)) {
        let mut codes = match entry.sequence_items(tags::CONCEPT_CODE_SEQUENCE) {
            Ok(Some(codes)) => codes.to_vec(),
            _ => Vec::new(),
        };
        if codes.is_empty() {
            codes.push(InMemDicomObject::new_empty());
        }
        codes[0].put_text(tags::CODE_VALUE, VR::SH, FAILED_CODE_VALUE);
        codes[0].put_text(tags::CODE_MEANING, VR::LO, FAILED_CODE_MEANING);
        entry.put_items(tags::CONCEPT_CODE_SEQUENCE, codes);
        count += 1;
    }

    if count > 0 {
        record.put_items(tags::CONTENT_SEQUENCE, entries);
    }
    count
}
