//! Generic SHA-256 hex digest helper, shared by `audit::hash_ip` (for
//! addresses) and the L5 semantic-retrieval cache (for source digests).

use sha2::{Digest, Sha256};

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
