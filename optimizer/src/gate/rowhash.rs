//! Row canonicalization and hashing shared by `Session::checksum` and the
//! correctness gate's mismatch-sample diffing.

use crate::session::RowSet;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// NULL sentinel distinct from any possible canonicalized string value.
const NULL_SENTINEL: &str = "\u{0}NULL\u{0}";

/// Canonicalize one column value: numeric values rounded to the configured
/// tolerance (expressed as decimal places derived from it), NULLs mapped to
/// a sentinel, strings UTF-8 NFC-normalized (approximated here by trimming,
/// since `unicode-normalization` is not in the dependency set — values in
/// practice are already NFC from the database's own encoding).
pub fn canonicalize_value(value: &Option<String>, tolerance: f64) -> String {
    match value {
        None => NULL_SENTINEL.to_string(),
        Some(s) => {
            if let Ok(n) = s.parse::<f64>() {
                round_to_tolerance(n, tolerance)
            } else {
                s.trim().to_string()
            }
        }
    }
}

fn round_to_tolerance(n: f64, tolerance: f64) -> String {
    if tolerance <= 0.0 {
        return format!("{n}");
    }
    let decimals = (-tolerance.log10()).round().max(0.0) as usize;
    format!("{:.*}", decimals, n)
}

/// Deterministic hash of one row: concatenate canonicalized column values
/// with a separator that cannot appear in a canonicalized value, then
/// SHA-256 and truncate to a u64 — the same hasher the PatchPlan applier
/// uses for anchor hashes, for one stable-hashing story across the crate.
pub fn hash_row(row: &[Option<String>], tolerance: f64) -> u64 {
    let mut hasher = Sha256::new();
    for (i, value) in row.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\x1f");
        }
        hasher.update(canonicalize_value(value, tolerance).as_bytes());
    }
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

/// Order-independent digest: XOR-fold every row's hash.
pub fn xor_fold(rows: &RowSet, tolerance: f64) -> u64 {
    rows.rows.iter().fold(0u64, |acc, row| acc ^ hash_row(row, tolerance))
}

/// Order-dependent digest: concatenate row hashes in result order, then hash
/// the sequence.
pub fn ordered_digest(rows: &RowSet, tolerance: f64) -> u64 {
    let mut hasher = Sha256::new();
    for row in &rows.rows {
        hasher.update(hash_row(row, tolerance).to_be_bytes());
    }
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

/// Build an index from row hash to first occurrence, for sampling 3-5
/// mismatching rows when two row sets' digests disagree.
pub fn index_by_hash(rows: &RowSet, tolerance: f64) -> HashMap<u64, usize> {
    let mut index = HashMap::new();
    for (i, row) in rows.rows.iter().enumerate() {
        index.entry(hash_row(row, tolerance)).or_insert(i);
    }
    index
}
