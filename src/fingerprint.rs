use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of the submitted payload.
///
/// The analyzer never keeps the image; this digest is what callers log and
/// store to tie a verdict back to the exact bytes that were judged. A single
/// changed byte (metadata included) produces an unrelated digest.
pub fn document_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
