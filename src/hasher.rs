//
// hasher.rs
// dicom-ai-randomize
//
// Derives bounded-length, digits-only identifiers from arbitrary strings using a SHA-256 digest.
//
// Thales Matheus Mendonça Santos - November 2025

use sha2::{Digest, Sha256};

/// Hash `value` into a string of decimal digits no longer than `max_len`.
///
/// The digest is split into two 128-bit halves, each rendered in base 10, so up to 78 digits
/// are available before truncation. The output is stable across runs and platforms.
pub fn hash_digits(value: &str, max_len: usize) -> String {
    let digest = Sha256::digest(value.as_bytes());

    let mut high = [0u8; 16];
    let mut low = [0u8; 16];
    high.copy_from_slice(&digest[..16]);
    low.copy_from_slice(&digest[16..]);

    let mut digits = u128::from_be_bytes(high).to_string();
    digits.push_str(&u128::from_be_bytes(low).to_string());
    digits.truncate(max_len);
    digits
}
