//! Compiler metadata embedded in each compiled contract
//!
//! Only the parts that influence bytecode comparison are read: the compiler
//! version and which content hash (if any) the compiler appended to the
//! runtime code.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content hash kind appended to runtime bytecode, from
/// `settings.metadata.bytecodeHash`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MetadataHash {
    #[default]
    Ipfs,
    Bzzr0,
    Bzzr1,
    /// No CBOR suffix is emitted
    None,
}

impl MetadataHash {
    /// Whether runtime bytecode ends with a CBOR metadata segment
    pub fn is_embedded(&self) -> bool {
        !matches!(self, MetadataHash::None)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContractMetadata {
    #[serde(default)]
    pub compiler: CompilerInfo,
    #[serde(default)]
    pub settings: MetadataSettings,
    /// Source unit name to its content hashes
    #[serde(default)]
    pub sources: BTreeMap<String, SourceHashes>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompilerInfo {
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataSettings {
    #[serde(default)]
    pub metadata: MetadataOptions,
    #[serde(default, rename = "evmVersion", skip_serializing_if = "Option::is_none")]
    pub evm_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataOptions {
    #[serde(default, rename = "bytecodeHash")]
    pub bytecode_hash: MetadataHash,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceHashes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keccak256: Option<String>,
}

impl ContractMetadata {
    /// Parses the metadata string of a compiled contract. An empty string
    /// yields defaults, which is what compilers emit when metadata output
    /// was not selected.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
            .map_err(|e| Error::MalformedOutput(format!("contract metadata: {e}")))
    }

    pub fn bytecode_hash(&self) -> MetadataHash {
        self.settings.metadata.bytecode_hash
    }
}
