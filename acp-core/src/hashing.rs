// acp-core/src/hashing.rs
// ============================================================================
// Module: Canonical Hashing
// Description: RFC 8785 JSON canonicalization and the event hash chain.
// Purpose: Give every event a deterministic, replayable hash so the audit
//          layer can detect tampering independent of storage engine.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! All content hashes in the control plane are computed over RFC 8785 (JCS)
//! canonical JSON. Canonicalization guarantees sorted object keys and a
//! stable numeric encoding, so two independent implementations hashing the
//! same logical event converge on the same digest.

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

/// Errors raised while computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Computes the hash chain link for an event: `SHA256(canonical(envelope) || prev_event_hash)`.
///
/// `prev_event_hash` is the raw hex string of the predecessor event in the
/// same `(stream_type, stream_id)` stream, or the empty string for the first
/// event in a stream.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when `envelope` cannot be
/// canonicalized.
pub fn compute_event_hash<T: Serialize + ?Sized>(
    envelope: &T,
    prev_event_hash: &str,
) -> Result<String, HashError> {
    let mut bytes = canonical_json_bytes(envelope)?;
    bytes.extend_from_slice(prev_event_hash.as_bytes());
    Ok(sha256_hex(&bytes))
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalization_sorts_keys() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(
            canonical_json_bytes(&a).expect("canon a"),
            canonical_json_bytes(&b).expect("canon b"),
        );
    }

    #[test]
    fn hash_chain_links_to_predecessor() {
        let e1 = json!({"x": 1});
        let e2 = json!({"x": 2});
        let h1 = compute_event_hash(&e1, "").expect("hash e1");
        let h2a = compute_event_hash(&e2, &h1).expect("hash e2 a");
        let h2b = compute_event_hash(&e2, &h1).expect("hash e2 b");
        assert_eq!(h2a, h2b, "hashing is deterministic");
        assert_ne!(h1, h2a, "different payload and chain position diverge");
    }

    #[test]
    fn differing_prev_hash_changes_digest() {
        let e = json!({"x": 1});
        let h_a = compute_event_hash(&e, "aaa").expect("hash a");
        let h_b = compute_event_hash(&e, "bbb").expect("hash b");
        assert_ne!(h_a, h_b);
    }

    proptest::proptest! {
        #[test]
        fn sha256_hex_is_64_lowercase_hex_chars(input: Vec<u8>) {
            let digest = sha256_hex(&input);
            proptest::prop_assert_eq!(digest.len(), 64);
            proptest::prop_assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }
}
