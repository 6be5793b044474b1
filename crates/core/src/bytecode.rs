//! Deployed vs compiled runtime bytecode comparison
//!
//! Solidity appends `<CBOR map><u16 big-endian length>` to runtime code. The
//! map holds a content hash of the metadata JSON, so two builds of identical
//! source can differ only there (different file paths, comments, compiler
//! commit). The executable prefix before that segment must match exactly.

use crate::artifacts::MetadataHash;
use serde::{Deserialize, Serialize};

/// Outcome of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BytecodeMatch {
    /// Byte-for-byte identical, metadata included
    Full,
    /// Identical executable code, differing metadata segment
    Partial,
    None,
}

impl BytecodeMatch {
    pub fn is_match(self) -> bool {
        !matches!(self, BytecodeMatch::None)
    }
}

/// Keys solc may put in the metadata map. Values are not inspected, the
/// decode only proves the segment is well formed.
#[derive(Debug, Default, Deserialize)]
struct CborMetadata {
    ipfs: Option<Vec<u8>>,
    bzzr0: Option<Vec<u8>>,
    bzzr1: Option<Vec<u8>>,
    experimental: Option<bool>,
    solc: Option<Vec<u8>>,
}

impl CborMetadata {
    fn is_empty(&self) -> bool {
        self.ipfs.is_none()
            && self.bzzr0.is_none()
            && self.bzzr1.is_none()
            && self.experimental.is_none()
            && self.solc.is_none()
    }
}

/// Splits runtime code into `(executable, metadata)` where `metadata`
/// includes the two length bytes. Returns `None` when the trailing segment is
/// not a decodable metadata map.
pub fn split_metadata(code: &[u8]) -> Option<(&[u8], &[u8])> {
    if code.len() < 2 {
        return None;
    }
    let len = u16::from_be_bytes([code[code.len() - 2], code[code.len() - 1]]) as usize;
    let full_len = len + 2;
    if len == 0 || full_len >= code.len() {
        return None;
    }

    let (executable, suffix) = code.split_at(code.len() - full_len);
    let raw = &suffix[..len];
    let metadata: CborMetadata = match ciborium::from_reader(raw) {
        Ok(metadata) => metadata,
        Err(_) => return None,
    };
    if metadata.is_empty() {
        return None;
    }

    Some((executable, suffix))
}

/// Compares compiled against deployed runtime code.
///
/// With `marker` other than [`MetadataHash::None`], each side's own metadata
/// segment is stripped and the executable prefixes compared. If either side
/// has no decodable segment the full byte strings are compared, so code with
/// metadata never matches code without it.
pub fn compare(compiled: &[u8], deployed: &[u8], marker: MetadataHash) -> BytecodeMatch {
    if compiled == deployed {
        return if compiled.is_empty() {
            BytecodeMatch::None
        } else {
            BytecodeMatch::Full
        };
    }
    if !marker.is_embedded() {
        return BytecodeMatch::None;
    }

    match (split_metadata(compiled), split_metadata(deployed)) {
        (Some((compiled_code, _)), Some((deployed_code, _))) if compiled_code == deployed_code => {
            tracing::debug!(
                "Executable code matches ({} bytes), metadata differs",
                compiled_code.len()
            );
            BytecodeMatch::Partial
        }
        _ => BytecodeMatch::None,
    }
}
