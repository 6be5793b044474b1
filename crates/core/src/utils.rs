//! Hex and address helpers

use crate::error::{Error, Result};

/// Strips a leading `0x`/`0X` prefix
pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Lower-cases an address and ensures a `0x` prefix. All cache keys and storage
/// lookups go through this so mixed-case input never forks an entry.
pub fn normalize_address(address: &str) -> String {
    format!("0x{}", strip_0x(address.trim()).to_ascii_lowercase())
}

/// Checks that `address` is 20 bytes of hex, with or without prefix
pub fn is_valid_address(address: &str) -> bool {
    let raw = strip_0x(address.trim());
    raw.len() == 40 && raw.chars().all(|c| c.is_ascii_hexdigit())
}

/// Decodes an optionally prefixed hex string
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(strip_0x(s.trim())).map_err(|e| Error::Decode(format!("invalid hex: {e}")))
}

pub fn hash_bytes(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(data))
}
