//! Solidity compiler invocation through the standard JSON interface

use crate::{
    artifacts::CompilerOutput,
    error::{Error, Result},
    request::VerificationRequest,
    source::SourceBundle,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};
use tokio::io::AsyncWriteExt;

/// Binary name inside each version directory
const SOLC_BINARY: &str = "solc";

/// A compiler version as submitted, e.g. `v0.8.10+commit.fc410830`. Only the
/// semantic version selects the build; the commit tag is informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerVersion {
    pub version: semver::Version,
    pub commit: Option<String>,
    pub raw: String,
}

impl CompilerVersion {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let without_v = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let (release, commit) = match without_v.split_once('+') {
            Some((release, commit)) => (release, Some(commit.to_string())),
            None => (without_v, None),
        };
        let version = semver::Version::parse(release).map_err(|e| {
            Error::InvalidInput(format!("invalid compiler version {raw:?}: {e}"))
        })?;
        Ok(Self {
            version,
            commit,
            raw: raw.to_string(),
        })
    }

    /// Directory name the build is installed under
    pub fn release(&self) -> String {
        self.version.to_string()
    }
}

impl std::fmt::Display for CompilerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Standard JSON input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompilerInput {
    pub language: String,
    pub sources: BTreeMap<String, SourceContent>,
    pub settings: CompilerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceContent {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompilerSettings {
    pub optimizer: Optimizer,
    #[serde(rename = "evmVersion", skip_serializing_if = "Option::is_none")]
    pub evm_version: Option<String>,
    #[serde(rename = "outputSelection")]
    pub output_selection: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Optimizer {
    pub enabled: bool,
    pub runs: u32,
}

impl CompilerInput {
    /// Builds the input for a request: Solidity, its optimizer settings and
    /// full output selection.
    pub fn new(bundle: &SourceBundle, request: &VerificationRequest) -> Self {
        let sources = bundle
            .sources
            .iter()
            .map(|(name, content)| {
                (
                    name.clone(),
                    SourceContent {
                        content: content.clone(),
                    },
                )
            })
            .collect();

        Self {
            language: "Solidity".to_string(),
            sources,
            settings: CompilerSettings {
                optimizer: Optimizer {
                    enabled: request.optimize,
                    runs: if request.optimize {
                        request.optimize_runs
                    } else {
                        200
                    },
                },
                evm_version: request
                    .evm_version
                    .clone()
                    .filter(|v| !v.is_empty() && v != "default"),
                output_selection: json!({"*": {"*": ["*"], "": ["*"]}}),
            },
        }
    }
}

/// A compiler toolchain able to build standard JSON input for a version
#[async_trait]
pub trait SolidityCompiler: Send + Sync {
    /// Compiles `input` with exactly `version`. Fails with
    /// [`Error::CompilerNotFound`] when that build is not installed and
    /// [`Error::Compile`] when the compiler reports errors.
    async fn compile(
        &self,
        version: &CompilerVersion,
        input: &CompilerInput,
    ) -> Result<CompilerOutput>;

    /// Installed versions, newest first
    async fn available_versions(&self) -> Result<Vec<String>>;
}

/// Runs pre-installed `solc` builds laid out as `<bin_dir>/<version>/solc`
#[derive(Debug, Clone)]
pub struct SolcCompiler {
    bin_dir: PathBuf,
    timeout: Duration,
}

impl SolcCompiler {
    pub fn new(bin_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            bin_dir: bin_dir.into(),
            timeout,
        }
    }

    pub fn binary_path(&self, version: &CompilerVersion) -> PathBuf {
        self.bin_dir.join(version.release()).join(SOLC_BINARY)
    }

    async fn resolve(&self, version: &CompilerVersion) -> Result<PathBuf> {
        let path = self.binary_path(version);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Ok(path),
            _ => Err(Error::CompilerNotFound(version.release())),
        }
    }

    async fn run(&self, solc: &Path, input: &CompilerInput) -> Result<Vec<u8>> {
        let content = serde_json::to_vec(input).map_err(|e| Error::Compile {
            message: format!("cannot encode standard JSON input: {e}"),
            payload: None,
        })?;

        let mut command = tokio::process::Command::new(solc);
        command
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Running solc command: {:?}", command);

        let mut child = command.spawn().map_err(|e| Error::Compile {
            message: format!("failed spawning {}: {e}", solc.display()),
            payload: None,
        })?;

        let mut stdin = child.stdin.take().ok_or_else(|| Error::Compile {
            message: "solc stdin is not available".to_string(),
            payload: None,
        })?;
        stdin
            .write_all(&content)
            .await
            .map_err(|e| Error::Compile {
                message: format!("failed writing standard JSON to solc: {e}"),
                payload: None,
            })?;
        drop(stdin);

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Compile {
                message: format!("solc timed out after {}s", self.timeout.as_secs()),
                payload: None,
            })?
            .map_err(|e| Error::Compile {
                message: format!("solc failed: {e}"),
                payload: None,
            })?;

        if !output.status.success() {
            return Err(Error::Compile {
                message: format!(
                    "solc exited with {:?}: {}",
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                payload: None,
            });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl SolidityCompiler for SolcCompiler {
    async fn compile(
        &self,
        version: &CompilerVersion,
        input: &CompilerInput,
    ) -> Result<CompilerOutput> {
        let start = Instant::now();
        let solc = self.resolve(version).await?;

        tracing::info!(
            "Compiling {} source file(s) with solc {}",
            input.sources.len(),
            version.release()
        );

        let stdout = self.run(&solc, input).await?;
        let output: CompilerOutput = serde_json::from_slice(&stdout)
            .map_err(|e| Error::MalformedOutput(format!("solc output is not valid JSON: {e}")))?;
        output.check_errors()?;

        tracing::info!(
            "Compilation completed in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        Ok(output)
    }

    async fn available_versions(&self) -> Result<Vec<String>> {
        Ok(installed_versions(&self.bin_dir))
    }
}

/// Lists version directories under `bin_dir` that hold a compiler binary,
/// newest first. A missing directory yields an empty list.
pub fn installed_versions(bin_dir: &Path) -> Vec<String> {
    let mut versions: Vec<semver::Version> = walkdir::WalkDir::new(bin_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() && e.path().join(SOLC_BINARY).is_file())
        .filter_map(|e| e.file_name().to_str().and_then(|n| semver::Version::parse(n).ok()))
        .collect();

    versions.sort_by(|a, b| b.cmp(a));
    tracing::debug!("Found {} installed compiler versions", versions.len());
    versions.into_iter().map(|v| v.to_string()).collect()
}
