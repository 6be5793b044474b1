//! Compiler output model and per-contract artifacts

use crate::{
    error::{Error, Result},
    utils,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod abi;
pub mod metadata;

pub use abi::{ContractAbi, EventDescriptor, MethodDescriptor, ParamDescriptor};
pub use metadata::{ContractMetadata, MetadataHash};

/// Standard JSON output of the compiler, restricted to the fields used for
/// matching and ABI extraction. This is also the blob persisted on the
/// verification request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompilerOutput {
    /// Source unit name to contract name to output
    #[serde(default)]
    pub contracts: BTreeMap<String, BTreeMap<String, ContractOutput>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<CompilerDiagnostic>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContractOutput {
    #[serde(default)]
    pub abi: serde_json::Value,
    /// Metadata JSON, as a string
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub evm: EvmOutput,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvmOutput {
    #[serde(default, rename = "deployedBytecode")]
    pub deployed_bytecode: BytecodeOutput,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BytecodeOutput {
    #[serde(default)]
    pub object: String,
}

/// A warning or error reported by the compiler
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompilerDiagnostic {
    #[serde(default)]
    pub severity: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(
        default,
        rename = "formattedMessage",
        skip_serializing_if = "Option::is_none"
    )]
    pub formatted_message: Option<String>,
}

impl CompilerDiagnostic {
    pub fn is_error(&self) -> bool {
        self.severity.eq_ignore_ascii_case("error")
    }
}

/// One compiled contract ready for bytecode comparison
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledArtifact {
    pub file_name: String,
    pub contract_name: String,
    pub deployed_bytecode: Vec<u8>,
    pub metadata_hash: MetadataHash,
}

impl CompilerOutput {
    /// Parses a stored or freshly produced output blob
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::MalformedOutput(format!("compiler output: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::MalformedOutput(format!("compiler output: {e}")))
    }

    /// Diagnostics with error severity
    pub fn errors(&self) -> impl Iterator<Item = &CompilerDiagnostic> {
        self.errors.iter().filter(|d| d.is_error())
    }

    /// Turns reported errors into a [`Error::Compile`] carrying the full
    /// diagnostic list.
    pub fn check_errors(&self) -> Result<()> {
        let Some(first) = self.errors().next() else {
            return Ok(());
        };
        let message = first
            .formatted_message
            .clone()
            .unwrap_or_else(|| format!("{}: {}", first.kind, first.message));
        Err(Error::Compile {
            message: message.trim().to_string(),
            payload: serde_json::to_value(&self.errors).ok(),
        })
    }

    /// Contracts considered for a request, in output order.
    ///
    /// `primary_file` limits the search to the source unit whose base name is
    /// `<primary_file>.sol`; `contract_name` limits it to one contract name.
    pub fn locate<'a>(
        &'a self,
        primary_file: Option<&'a str>,
        contract_name: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a str, &'a str, &'a ContractOutput)> + 'a {
        self.contracts
            .iter()
            .filter(move |(file, _)| match primary_file {
                Some(primary) => is_primary_unit(file, primary),
                None => true,
            })
            .flat_map(|(file, contracts)| {
                contracts
                    .iter()
                    .map(move |(name, output)| (file.as_str(), name.as_str(), output))
            })
            .filter(move |(_, name, _)| contract_name.map_or(true, |wanted| *name == wanted))
    }

    /// Deployable candidates for bytecode matching. Interfaces and abstract
    /// contracts (empty runtime code) are skipped.
    pub fn candidates(
        &self,
        primary_file: Option<&str>,
        contract_name: Option<&str>,
    ) -> Result<Vec<CompiledArtifact>> {
        self.locate(primary_file, contract_name)
            .filter(|(_, _, output)| {
                !utils::strip_0x(&output.evm.deployed_bytecode.object).is_empty()
            })
            .map(|(file, name, output)| {
                let deployed_bytecode = utils::decode_hex(&output.evm.deployed_bytecode.object)
                    .map_err(|e| {
                        Error::MalformedOutput(format!("deployed bytecode of {name}: {e}"))
                    })?;
                let metadata = ContractMetadata::parse(&output.metadata)?;
                Ok(CompiledArtifact {
                    file_name: file.to_string(),
                    contract_name: name.to_string(),
                    deployed_bytecode,
                    metadata_hash: metadata.bytecode_hash(),
                })
            })
            .collect()
    }

    /// Interface of the contract a successful verification resolved to
    pub fn contract_abi(
        &self,
        primary_file: Option<&str>,
        contract_name: Option<&str>,
    ) -> Result<ContractAbi> {
        let (_, name, output) = self
            .locate(primary_file, contract_name)
            .next()
            .ok_or_else(|| {
                Error::MalformedOutput(format!(
                    "contract {} missing from compiler output",
                    contract_name.unwrap_or("<first>")
                ))
            })?;
        if output.abi.is_null() {
            return Err(Error::MalformedOutput(format!("contract {name} has no ABI")));
        }
        ContractAbi::from_value(&output.abi)
    }
}

fn is_primary_unit(source_unit: &str, primary: &str) -> bool {
    let base = source_unit.rsplit('/').next().unwrap_or(source_unit);
    base.strip_suffix(".sol") == Some(primary) || base == primary
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn contract(abi: serde_json::Value, bytecode: &str) -> ContractOutput {
        ContractOutput {
            abi,
            metadata: r#"{"settings":{"metadata":{"bytecodeHash":"ipfs"}}}"#.to_string(),
            evm: EvmOutput {
                deployed_bytecode: BytecodeOutput {
                    object: bytecode.to_string(),
                },
            },
        }
    }

    fn output() -> CompilerOutput {
        let mut token = BTreeMap::new();
        token.insert("IToken".to_string(), contract(json!([]), ""));
        token.insert("Token".to_string(), contract(json!([]), "6080"));
        let mut lib = BTreeMap::new();
        lib.insert("SafeMath".to_string(), contract(json!([]), "6001"));

        let mut contracts = BTreeMap::new();
        contracts.insert("contracts/Token.sol".to_string(), token);
        contracts.insert("lib/SafeMath.sol".to_string(), lib);
        CompilerOutput {
            contracts,
            errors: vec![],
        }
    }

    #[test]
    fn test_candidates_skip_empty_bytecode() {
        let names: Vec<_> = output()
            .candidates(None, None)
            .unwrap()
            .into_iter()
            .map(|a| a.contract_name)
            .collect();
        assert_eq!(names, vec!["Token", "SafeMath"]);
    }

    #[test]
    fn test_candidates_limited_to_primary_file() {
        let artifacts = output().candidates(Some("Token"), None).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].file_name, "contracts/Token.sol");
        assert_eq!(artifacts[0].deployed_bytecode, vec![0x60, 0x80]);
        assert_eq!(artifacts[0].metadata_hash, MetadataHash::Ipfs);

        assert!(output().candidates(Some("Missing"), None).unwrap().is_empty());
    }

    #[test]
    fn test_candidates_by_contract_name() {
        let artifacts = output().candidates(None, Some("SafeMath")).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].file_name, "lib/SafeMath.sol");
    }

    #[test]
    fn test_invalid_bytecode_is_malformed() {
        let mut out = output();
        out.contracts
            .get_mut("lib/SafeMath.sol")
            .unwrap()
            .insert("Linked".to_string(), contract(json!([]), "__$abc$__"));
        let err = out.candidates(None, Some("Linked")).unwrap_err();
        assert!(matches!(err, Error::MalformedOutput(_)));
    }

    #[test]
    fn test_check_errors_keeps_payload() {
        let out = CompilerOutput::from_json(
            r#"{"errors": [
                {"severity": "warning", "type": "Warning", "message": "unused variable"},
                {"severity": "error", "type": "ParserError", "message": "Expected ';'",
                 "formattedMessage": "ParserError: Expected ';'\n"}
            ]}"#,
        )
        .unwrap();

        match out.check_errors().unwrap_err() {
            Error::Compile { message, payload } => {
                assert_eq!(message, "ParserError: Expected ';'");
                assert_eq!(payload.unwrap().as_array().unwrap().len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_warnings_only_pass() {
        let out = CompilerOutput::from_json(
            r#"{"errors": [{"severity": "warning", "message": "shadowing"}], "contracts": {}}"#,
        )
        .unwrap();
        out.check_errors().unwrap();
    }

    #[test]
    fn test_round_trip_keeps_abi() {
        let mut out = output();
        out.contracts
            .get_mut("contracts/Token.sol")
            .unwrap()
            .insert(
                "Token".to_string(),
                contract(
                    json!([{"type": "function", "name": "ping", "inputs": [], "outputs": [], "stateMutability": "view"}]),
                    "6080",
                ),
            );
        let stored = out.to_json().unwrap();
        let abi = CompilerOutput::from_json(&stored)
            .unwrap()
            .contract_abi(Some("Token"), Some("Token"))
            .unwrap();
        assert_eq!(abi.methods()[0].signature, "ping()");
    }
}
