// src/dedup.rs
//! Deduplication engine: source-id canonicalization + content fingerprints.
//!
//! Fingerprints are derived from immutable source identity only, never from
//! titles or content, so an upstream edit neither creates a duplicate nor
//! misses an existing row.

use sha2::{Digest, Sha256};

use crate::signal::SourceApi;

/// Canonicalize a raw source-native identifier prior to fingerprinting.
/// Pure and total; unknown shapes fall through to trim-only.
pub fn normalize(source_api: SourceApi, raw_id: &str) -> String {
    let trimmed = raw_id.trim();
    match source_api {
        // Reddit fullnames carry a `t3_` post-type prefix; the bare id is the
        // stable identity.
        SourceApi::Reddit => trimmed
            .strip_prefix("t3_")
            .unwrap_or(trimmed)
            .to_string(),
        // USPTO serials appear with and without dashes/spaces depending on the
        // endpoint.
        SourceApi::UsptoTm => trimmed
            .chars()
            .filter(|c| *c != '-' && *c != ' ')
            .collect(),
        // HN ids and RSS GUIDs are used as-is.
        SourceApi::Hn | SourceApi::BevnetRss | SourceApi::NoshRss => trimmed.to_string(),
    }
}

/// 32 lowercase hex chars: the first 128 bits of SHA-256 over
/// `"{source_api}|{normalized_id}"`. Deterministic; collision risk is
/// negligible at this system's scale.
pub fn fingerprint(source_api: SourceApi, normalized_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_api.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(normalized_id.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Convenience: normalize then fingerprint in one step.
pub fn fingerprint_raw(source_api: SourceApi, raw_id: &str) -> String {
    fingerprint(source_api, &normalize(source_api, raw_id))
}
