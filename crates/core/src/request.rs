//! Verification request model and submission validation

use crate::{
    compiler::CompilerVersion,
    error::{Error, Result},
    utils,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the submitted source is shaped
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CompilerType {
    /// One inline source file
    SingleFile,
    /// Several files fetched from remote URLs, main contract first
    MultiPart,
    /// A pre-built compiler standard JSON input. Accepted by the model but
    /// rejected at submission.
    StdJsonInput,
}

impl std::fmt::Display for CompilerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CompilerType::SingleFile => "single_file",
            CompilerType::MultiPart => "multi_part",
            CompilerType::StdJsonInput => "std_json_input",
        };
        f.write_str(name)
    }
}

/// A remote source file of a multi-part submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourcePart {
    pub filename: String,
    pub url: String,
}

/// Submitted source content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourcePayload {
    Inline(String),
    Parts(Vec<SourcePart>),
}

/// Lifecycle of a verification request. Every status other than `Pending`
/// is terminal and written once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Successful,
    BytecodeMismatch,
    /// Compiler resolution, fetch or compile-time failure
    Unknown,
}

impl VerificationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerificationStatus::Pending)
    }

    /// Check if verification was successful
    pub fn is_success(&self) -> bool {
        matches!(self, VerificationStatus::Successful)
    }
}

/// Parameters of a verification submission, before it is stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitVerification {
    pub address: String,
    pub compiler_type: CompilerType,
    /// Full version string, e.g. `v0.8.10+commit.fc410830`
    pub compiler_version: String,
    pub license: String,
    pub optimize: bool,
    #[serde(default)]
    pub optimize_runs: u32,
    #[serde(default)]
    pub evm_version: Option<String>,
    /// Restricts matching to one contract name. Any emitted contract may
    /// match when absent.
    #[serde(default)]
    pub contract_name: Option<String>,
    pub sources: SourcePayload,
}

impl SubmitVerification {
    /// Rejects malformed submissions before anything is stored
    pub fn validate(&self) -> Result<()> {
        if !utils::is_valid_address(&self.address) {
            return Err(Error::invalid(format!(
                "address {:?} is not a 20-byte hex string",
                self.address
            )));
        }

        CompilerVersion::parse(&self.compiler_version)?;

        if self.optimize && self.optimize_runs == 0 {
            return Err(Error::invalid(
                "optimize_runs must be greater than 0 when the optimizer is enabled",
            ));
        }

        if let Some(name) = &self.contract_name {
            if name.trim().is_empty() {
                return Err(Error::invalid("contract_name must not be blank"));
            }
        }

        match (self.compiler_type, &self.sources) {
            (CompilerType::StdJsonInput, _) => Err(Error::invalid(
                "std_json_input submissions are not supported",
            )),
            (CompilerType::SingleFile, SourcePayload::Inline(code)) => {
                if code.trim().is_empty() {
                    return Err(Error::invalid("source code must not be empty"));
                }
                Ok(())
            }
            (CompilerType::MultiPart, SourcePayload::Parts(parts)) => {
                if parts.is_empty() {
                    return Err(Error::invalid("at least one source part is required"));
                }
                for part in parts {
                    validate_part(part)?;
                }
                Ok(())
            }
            (compiler_type, _) => Err(Error::invalid(format!(
                "source payload does not match compiler type {compiler_type}"
            ))),
        }
    }
}

fn validate_part(part: &SourcePart) -> Result<()> {
    let base = part.filename.rsplit('/').next().unwrap_or_default();
    if base.len() <= ".sol".len() || !base.ends_with(".sol") {
        return Err(Error::invalid(format!(
            "source part {:?} must be a .sol file",
            part.filename
        )));
    }
    if !(part.url.starts_with("http://") || part.url.starts_with("https://")) {
        return Err(Error::invalid(format!(
            "source part {:?} must have an http(s) url",
            part.filename
        )));
    }
    Ok(())
}

/// A stored verification request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationRequest {
    pub id: u64,
    /// Lower-cased contract address
    pub address: String,
    pub compiler_type: CompilerType,
    pub compiler_version: String,
    pub license: String,
    pub optimize: bool,
    pub optimize_runs: u32,
    pub evm_version: Option<String>,
    /// Requested name on submission, resolved name once terminal
    pub contract_name: Option<String>,
    pub sources: SourcePayload,
    pub status: VerificationStatus,
    /// Raw compiler output, kept on mismatch for diagnostics
    pub output: Option<String>,
    pub error_message: Option<String>,
    /// Compiler-reported error list, when the compiler produced one
    pub error_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationRequest {
    /// Builds the Pending row for a validated submission. The id is assigned by storage.
    pub fn pending(submission: SubmitVerification) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            address: utils::normalize_address(&submission.address),
            compiler_type: submission.compiler_type,
            compiler_version: submission.compiler_version,
            license: submission.license,
            optimize: submission.optimize,
            optimize_runs: submission.optimize_runs,
            evm_version: submission.evm_version,
            contract_name: submission.contract_name,
            sources: submission.sources,
            status: VerificationStatus::Pending,
            output: None,
            error_message: None,
            error_payload: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Terminal result written by the worker, exactly once per request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationOutcome {
    pub status: VerificationStatus,
    pub contract_name: Option<String>,
    pub output: Option<String>,
    pub error_message: Option<String>,
    pub error_payload: Option<serde_json::Value>,
}

impl VerificationOutcome {
    pub fn unknown(error: &Error) -> Self {
        let error_payload = match error {
            Error::Compile { payload, .. } => payload.clone(),
            _ => None,
        };
        Self {
            status: VerificationStatus::Unknown,
            contract_name: None,
            output: None,
            error_message: Some(error.to_string()),
            error_payload,
        }
    }
}
