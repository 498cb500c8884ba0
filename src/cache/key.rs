//! Thought signature key derivation.

use crate::types::ModelFamily;
use sha2::{Digest, Sha256};

/// Reasoning text normalization: trim only. The signature is bound to the exact text,
/// so case and inner whitespace are preserved.
pub fn normalize_reasoning(text: &str) -> &str {
    text.trim()
}

/// Hex SHA-256 of `family:session:normalized_text`.
pub fn signature_key(family: ModelFamily, session_id: &str, reasoning: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(family.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(session_id.as_bytes());
    hasher.update(b":");
    hasher.update(normalize_reasoning(reasoning).as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
