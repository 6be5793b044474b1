//! Contract verification: build sources, compile, compare against deployed code

use crate::{
    artifacts::CompiledArtifact,
    bytecode::{self, BytecodeMatch},
    compiler::{CompilerInput, CompilerVersion, SolidityCompiler},
    error::{Error, Result},
    request::{VerificationOutcome, VerificationRequest, VerificationStatus},
    source::{SourceBundle, SourceFetcher},
};
use std::{sync::Arc, time::Instant};

/// Runs one verification attempt end to end. Never retries; every failure
/// becomes a terminal outcome.
#[derive(Clone)]
pub struct VerificationPipeline {
    compiler: Arc<dyn SolidityCompiler>,
    fetcher: Arc<dyn SourceFetcher>,
}

impl VerificationPipeline {
    pub fn new(compiler: Arc<dyn SolidityCompiler>, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self { compiler, fetcher }
    }

    /// Verifies `request` against `deployed_bytecode`. Fetch, compiler
    /// resolution and compile failures yield `Unknown` with the error kept
    /// for display.
    pub async fn run(
        &self,
        request: &VerificationRequest,
        deployed_bytecode: &[u8],
    ) -> VerificationOutcome {
        let start = Instant::now();
        let outcome = match self.try_run(request, deployed_bytecode).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Verification {} of {} failed: {}", request.id, request.address, e);
                VerificationOutcome::unknown(&e)
            }
        };

        tracing::info!(
            "Verification {} of {} finished as {:?} in {:.2}s",
            request.id,
            request.address,
            outcome.status,
            start.elapsed().as_secs_f64()
        );
        outcome
    }

    async fn try_run(
        &self,
        request: &VerificationRequest,
        deployed_bytecode: &[u8],
    ) -> Result<VerificationOutcome> {
        let version = CompilerVersion::parse(&request.compiler_version)?;
        let bundle = SourceBundle::build(request, self.fetcher.as_ref()).await?;
        tracing::debug!(
            "Built {} source unit(s), digest {}",
            bundle.sources.len(),
            bundle.digest()
        );

        let input = CompilerInput::new(&bundle, request);
        let output = self.compiler.compile(&version, &input).await?;
        let raw_output = output.to_json()?;

        let candidates =
            output.candidates(bundle.primary_file(), request.contract_name.as_deref())?;

        let outcome = match find_match(&candidates, deployed_bytecode) {
            Some((artifact, kind)) => {
                tracing::info!("Contract {} matched ({:?})", artifact.contract_name, kind);
                VerificationOutcome {
                    status: VerificationStatus::Successful,
                    contract_name: Some(artifact.contract_name.clone()),
                    output: Some(raw_output),
                    error_message: None,
                    error_payload: None,
                }
            }
            None => {
                let contract = request
                    .contract_name
                    .clone()
                    .or_else(|| candidates.first().map(|a| a.contract_name.clone()));
                let error_message = match &contract {
                    Some(name) if !candidates.is_empty() => Error::BytecodeMismatch {
                        contract: name.clone(),
                    }
                    .to_string(),
                    _ => format!(
                        "no deployable contract{} in compiler output",
                        contract
                            .as_deref()
                            .map(|n| format!(" named {n}"))
                            .unwrap_or_default()
                    ),
                };
                VerificationOutcome {
                    status: VerificationStatus::BytecodeMismatch,
                    contract_name: contract,
                    output: Some(raw_output),
                    error_message: Some(error_message),
                    error_payload: None,
                }
            }
        };
        Ok(outcome)
    }
}

/// First candidate whose runtime code matches the deployed code
pub fn find_match<'a>(
    candidates: &'a [CompiledArtifact],
    deployed_bytecode: &[u8],
) -> Option<(&'a CompiledArtifact, BytecodeMatch)> {
    candidates.iter().find_map(|artifact| {
        let kind = bytecode::compare(
            &artifact.deployed_bytecode,
            deployed_bytecode,
            artifact.metadata_hash,
        );
        kind.is_match().then_some((artifact, kind))
    })
}
