//! Short, stable hex identifiers derived from a download's URL/destination.

use sha2::{Digest, Sha256};

/// `sha256(url ‖ "|" ‖ dest_path)[:8]` as 16 lowercase hex characters.
/// Identifies one (url, destination) pair across resume attempts.
pub fn state_hash(url: &str, dest_path: &str) -> String {
    short_hex(&format!("{url}|{dest_path}"))
}

/// `sha256(url)[:8]` as 16 lowercase hex characters. Used as a fallback key
/// for legacy master-list entries that predate `state_hash`.
pub fn url_hash(url: &str) -> String {
    short_hex(url)
}

fn short_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}
