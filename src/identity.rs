//
// identity.rs
// dicom-ai-randomize
//
// Picks a synthetic patient name (respecting sex and gender-specific modalities) and derives its patient ID.
//
// Thales Matheus Mendonça Santos - November 2025

use rand::Rng;
use serde::Serialize;

use crate::hasher::hash_digits;

/// Length of the generated PatientID.
pub const PATIENT_ID_LEN: usize = 7;

/// Modalities whose subjects are almost exclusively female.
const GENDER_SPECIFIC_MODALITIES: &[&str] = &["MG"];

pub const FEMALE_FIRST_NAMES: &[&str] = &[
    "Alice", "Beatrice", "Carmen", "Diana", "Elena", "Fiona", "Grace", "Helen", "Irene", "Julia",
    "Karen", "Laura", "Maria", "Nora", "Olivia", "Paula", "Rachel", "Sarah", "Teresa", "Vera",
];

pub const MALE_FIRST_NAMES: &[&str] = &[
    "Adam", "Bruno", "Carlos", "Daniel", "Edward", "Felix", "George", "Henry", "Ivan", "James",
    "Kevin", "Lucas", "Martin", "Nathan", "Oscar", "Peter", "Robert", "Samuel", "Thomas", "Victor",
];

pub const LAST_NAMES: &[&str] = &[
    "Anderson", "Barnes", "Carter", "Dawson", "Ellis", "Fisher", "Garcia", "Hughes", "Irving",
    "Jensen", "Keller", "Lawson", "Morales", "Norton", "Owens", "Parker", "Quinn", "Reyes",
    "Sullivan", "Turner", "Vaughn", "Walsh", "Young", "Zimmerman",
];

/// Patient sex as recorded in (0010,0040).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Female,
    Male,
    Other,
}

impl Sex {
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(str::trim) {
            Some("F") => Sex::Female,
            Some("M") => Sex::Male,
            _ => Sex::Other,
        }
    }
}

/// Which first-name list a synthetic name is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NameGender {
    Female,
    Male,
    Neutral,
}

impl NameGender {
    pub fn select(sex: Sex, modality: Option<&str>) -> Self {
        let gender_specific = modality
            .map(str::trim)
            .is_some_and(|m| GENDER_SPECIFIC_MODALITIES.contains(&m));

        if sex == Sex::Female || gender_specific {
            NameGender::Female
        } else if sex == Sex::Male {
            NameGender::Male
        } else {
            NameGender::Neutral
        }
    }
}

/// The single patient identity applied to every record of one study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntheticIdentity {
    pub name: String,
    pub patient_id: String,
}

impl SyntheticIdentity {
    /// Draw a random `Last^First` name for the given sex/modality and hash it into a PatientID.
    pub fn generate<R: Rng>(sex: Sex, modality: Option<&str>, rng: &mut R) -> Self {
        let first_names: Vec<&str> = match NameGender::select(sex, modality) {
            NameGender::Female => FEMALE_FIRST_NAMES.to_vec(),
            NameGender::Male => MALE_FIRST_NAMES.to_vec(),
            NameGender::Neutral => FEMALE_FIRST_NAMES
                .iter()
                .chain(MALE_FIRST_NAMES)
                .copied()
                .collect(),
        };

        let last = LAST_NAMES[rng.random_range(0..LAST_NAMES.len())];
        let first = first_names[rng.random_range(0..first_names.len())];
        Self::from_name(format!("{last}^{first}"))
    }

    /// Use a caller-chosen name; the PatientID is still derived from it.
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let patient_id = hash_digits(&name, PATIENT_ID_LEN);
        Self { name, patient_id }
    }

    pub fn first_name(&self) -> &str {
        self.name.split_once('^').map(|(_, first)| first).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn female_sex_or_mammography_selects_female_names() {
        assert_eq!(NameGender::select(Sex::Female, Some("CT")), NameGender::Female);
        assert_eq!(NameGender::select(Sex::Male, Some("MG")), NameGender::Female);
        assert_eq!(NameGender::select(Sex::Male, Some("CT")), NameGender::Male);
        assert_eq!(NameGender::select(Sex::Other, None), NameGender::Neutral);
    }

    #[test]
    fn sex_code_parsing_defaults_to_other() {
        assert_eq!(Sex::from_code(Some("F")), Sex::Female);
        assert_eq!(Sex::from_code(Some("M ")), Sex::Male);
        assert_eq!(Sex::from_code(Some("O")), Sex::Other);
        assert_eq!(Sex::from_code(None), Sex::Other);
    }

    #[test]
    fn generated_identity_matches_requested_gender() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let female = SyntheticIdentity::generate(Sex::Female, None, &mut rng);
            assert!(FEMALE_FIRST_NAMES.contains(&female.first_name()));
            let male = SyntheticIdentity::generate(Sex::Male, Some("CT"), &mut rng);
            assert!(MALE_FIRST_NAMES.contains(&male.first_name()));
        }
    }

    #[test]
    fn patient_id_is_seven_digit_hash_of_name() {
        let identity = SyntheticIdentity::from_name("Parker^Grace");
        assert_eq!(identity.patient_id, hash_digits("Parker^Grace", 7));
        assert_eq!(identity.patient_id.len(), 7);
        assert!(identity.patient_id.chars().all(|c| c.is_ascii_digit()));
    }
}
