//
// tags.rs
// dicom-ai-randomize
//
// Named attribute tags touched by the anonymizer, the reference rewriter and the redaction step.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::core::Tag;

// Patient / study identity
pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
pub const PATIENT_SEX: Tag = Tag(0x0010, 0x0040);
pub const ACCESSION_NUMBER: Tag = Tag(0x0008, 0x0050);
pub const STUDY_ID: Tag = Tag(0x0020, 0x0010);
pub const STUDY_DATE: Tag = Tag(0x0008, 0x0020);
pub const MODALITY: Tag = Tag(0x0008, 0x0060);

// Unique identifiers
pub const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);
pub const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);
pub const STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);
pub const SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);
pub const REFERENCED_SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x1155);

// Reference-bearing sequences
pub const REFERENCED_STUDY_SEQUENCE: Tag = Tag(0x0008, 0x1110);
pub const REFERENCED_SERIES_SEQUENCE: Tag = Tag(0x0008, 0x1115);
pub const REFERENCED_IMAGE_SEQUENCE: Tag = Tag(0x0008, 0x1140);
pub const REFERENCED_INSTANCE_SEQUENCE: Tag = Tag(0x0008, 0x114A);
pub const REFERENCED_SOP_SEQUENCE: Tag = Tag(0x0008, 0x1199);
pub const RELATED_SERIES_SEQUENCE: Tag = Tag(0x0008, 0x1250);
pub const SOURCE_IMAGE_SEQUENCE: Tag = Tag(0x0008, 0x2112);
pub const DERIVATION_IMAGE_SEQUENCE: Tag = Tag(0x0008, 0x9124);
pub const SOFTCOPY_VOI_LUT_SEQUENCE: Tag = Tag(0x0028, 0x3110);
pub const CURRENT_REQUESTED_PROCEDURE_EVIDENCE_SEQUENCE: Tag = Tag(0x0040, 0xA375);
pub const CONTENT_SEQUENCE: Tag = Tag(0x0040, 0xA730);
pub const PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE: Tag = Tag(0x5200, 0x9230);

// Presentation state annotations
pub const GRAPHIC_ANNOTATION_SEQUENCE: Tag = Tag(0x0070, 0x0001);
pub const UNFORMATTED_TEXT_VALUE: Tag = Tag(0x0070, 0x0006);
pub const TEXT_OBJECT_SEQUENCE: Tag = Tag(0x0070, 0x0008);
pub const GRAPHIC_OBJECT_SEQUENCE: Tag = Tag(0x0070, 0x0009);
pub const DISPLAYED_AREA_SELECTION_SEQUENCE: Tag = Tag(0x0070, 0x005A);

// Structured report codes
pub const CODE_VALUE: Tag = Tag(0x0008, 0x0100);
pub const CODE_MEANING: Tag = Tag(0x0008, 0x0104);
pub const CONCEPT_NAME_CODE_SEQUENCE: Tag = Tag(0x0040, 0xA043);
pub const CONCEPT_CODE_SEQUENCE: Tag = Tag(0x0040, 0xA168);
