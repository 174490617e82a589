//
// storage.rs
// dicom-ai-randomize
//
// Loads study and result folders into memory and writes randomized records back out, named by
// modality and carrying a file meta group that matches their new identifiers.
//
// Thales Matheus Mendonça Santos - November 2025

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{open_file, FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::dicom_access::ElementAccess;
use crate::randomize::modality_of;
use crate::tags;

/// Secondary Capture, used when a record carries no SOPClassUID.
const FALLBACK_SOP_CLASS_UID: &str = "1.2.840.10008.5.1.4.1.1.7";

/// One decoded DICOM file.
#[derive(Debug, Clone)]
pub struct LoadedRecord {
    pub path: PathBuf,
    pub transfer_syntax: String,
    pub object: InMemDicomObject,
}

/// Result of reading a folder: decoded records sorted by path plus files that could not be read.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub records: Vec<LoadedRecord>,
    pub skipped: Vec<(PathBuf, String)>,
}

impl LoadReport {
    pub fn objects(&self) -> Vec<InMemDicomObject> {
        self.records.iter().map(|r| r.object.clone()).collect()
    }
}

fn is_sidecar(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Decode every file under `dir` (only its direct children unless `recursive`).
///
/// JSON side-car files are ignored; anything else that fails to decode ends up in
/// [`LoadReport::skipped`] with the reason.
pub fn load_directory(dir: &Path, recursive: bool) -> Result<LoadReport> {
    if !dir.is_dir() {
        return Err(anyhow!("{} is not a directory", dir.display()));
    }

    let mut walker = WalkDir::new(dir).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }
    let files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| !is_sidecar(p))
        .collect();

    let decoded: Vec<_> = files
        .par_iter()
        .map(|path| {
            open_file(path)
                .map(|obj| LoadedRecord {
                    path: path.clone(),
                    transfer_syntax: obj.meta().transfer_syntax().to_string(),
                    object: obj.into_inner(),
                })
                .map_err(|e| (path.clone(), e.to_string()))
        })
        .collect();

    let mut report = LoadReport::default();
    for outcome in decoded {
        match outcome {
            Ok(record) => report.records.push(record),
            Err((path, reason)) => {
                tracing::warn!(path = %path.display(), %reason, "skipping undecodable file");
                report.skipped.push((path, reason));
            }
        }
    }
    report.records.sort_by(|a, b| a.path.cmp(&b.path));
    report.skipped.sort();

    tracing::debug!(
        dir = %dir.display(),
        records = report.records.len(),
        skipped = report.skipped.len(),
        "loaded folder"
    );
    Ok(report)
}

/// Write `record` to `path`, regenerating the file meta group from its current SOP identifiers.
pub fn write_record(path: &Path, record: &InMemDicomObject, transfer_syntax: &str) -> Result<()> {
    let sop_class_uid = record
        .element_str(tags::SOP_CLASS_UID)
        .map(Cow::Owned)
        .unwrap_or(Cow::Borrowed(FALLBACK_SOP_CLASS_UID));
    let sop_instance_uid = record
        .element_str(tags::SOP_INSTANCE_UID)
        .ok_or_else(|| anyhow!("record has no SOPInstanceUID"))?;
    let transfer_syntax = match transfer_syntax.trim_end_matches('\0').trim() {
        "" => EXPLICIT_VR_LITTLE_ENDIAN.uid(),
        ts => ts,
    };

    let file_meta = FileMetaTableBuilder::new()
        .transfer_syntax(transfer_syntax)
        .media_storage_sop_class_uid(sop_class_uid.as_ref())
        .media_storage_sop_instance_uid(sop_instance_uid.as_str())
        .build()
        .context("Failed to build file meta group")?;

    let mut file_obj =
        FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, file_meta);
    for elem in record.clone() {
        file_obj.put(elem);
    }

    file_obj
        .write_to_file(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Write records into `dir` as `<Modality><n>.dcm`, counting from zero per modality.
///
/// Returns the written paths in input order.
pub fn write_records<'a, I>(dir: &Path, records: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = (&'a InMemDicomObject, &'a str)>,
{
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut written = Vec::new();
    for (record, transfer_syntax) in records {
        let prefix = file_prefix(&modality_of(record));
        let counter = counters.entry(prefix.clone()).or_insert(0);
        let path = dir.join(format!("{prefix}{counter}.dcm"));
        *counter += 1;

        write_record(&path, record, transfer_syntax)?;
        written.push(path);
    }
    Ok(written)
}

/// Modality codes end up in file and folder names; keep only safe characters.
pub fn file_prefix(modality: &str) -> String {
    let cleaned = sanitize_filename(modality);
    if cleaned.is_empty() {
        crate::randomize::UNKNOWN_MODALITY.to_string()
    } else {
        cleaned
    }
}

fn sanitize_filename(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::VR;
    use tempfile::tempdir;

    fn record(modality: Option<&str>, sop_uid: &str) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        obj.put_text(tags::SOP_CLASS_UID, VR::UI, "1.2.840.10008.5.1.4.1.1.88.22");
        obj.put_text(tags::SOP_INSTANCE_UID, VR::UI, sop_uid);
        obj.put_text(tags::PATIENT_NAME, VR::PN, "Rivera^Ana");
        if let Some(modality) = modality {
            obj.put_text(tags::MODALITY, VR::CS, modality);
        }
        obj
    }

    #[test]
    fn sanitize_strips_dangerous_characters() {
        assert_eq!(sanitize_filename("../weird name 123.dcm"), "weirdname123dcm");
        assert_eq!(file_prefix("../"), "IMG");
        assert_eq!(file_prefix("SR"), "SR");
    }

    #[test]
    fn records_are_named_per_modality_and_read_back() {
        let dir = tempdir().expect("tmpdir");
        let sr = record(Some("SR"), "2.25.1");
        let first_img = record(None, "2.25.2");
        let second_img = record(None, "2.25.3");
        let ts = EXPLICIT_VR_LITTLE_ENDIAN.uid();

        let written = write_records(
            dir.path(),
            [(&sr, ts), (&first_img, ts), (&second_img, ts)],
        )
        .expect("write");
        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["SR0.dcm", "IMG0.dcm", "IMG1.dcm"]);

        let reopened = open_file(&written[0]).expect("reopen");
        assert_eq!(
            reopened.meta().media_storage_sop_instance_uid(),
            "2.25.1"
        );
        assert_eq!(
            reopened.element_str(tags::PATIENT_NAME).as_deref(),
            Some("Rivera^Ana")
        );
    }

    #[test]
    fn load_skips_sidecars_and_reports_garbage() {
        let dir = tempdir().expect("tmpdir");
        let sr = record(Some("SR"), "2.25.9");
        write_records(dir.path(), [(&sr, EXPLICIT_VR_LITTLE_ENDIAN.uid())]).expect("write");
        fs::write(dir.path().join("metadata.json"), b"{}").expect("write json");
        fs::write(dir.path().join("notes.txt"), b"not a dicom file").expect("write garbage");

        let report = load_directory(dir.path(), false).expect("load");
        assert_eq!(report.records.len(), 1);
        assert_eq!(
            report.records[0].object.element_str(tags::SOP_INSTANCE_UID).as_deref(),
            Some("2.25.9")
        );
        assert_eq!(report.records[0].transfer_syntax, EXPLICIT_VR_LITTLE_ENDIAN.uid());
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].0.ends_with("notes.txt"));
    }

    #[test]
    fn load_rejects_missing_directory() {
        let dir = tempdir().expect("tmpdir");
        assert!(load_directory(&dir.path().join("absent"), true).is_err());
    }
}
