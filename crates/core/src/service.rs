//! Write side: accept submissions, hand them to the worker pool, report status

use crate::{
    compiler::SolidityCompiler,
    config::VerifierConfig,
    error::{Error, Result},
    request::{CompilerType, SubmitVerification, VerificationRequest, VerificationStatus},
    source::SourceFetcher,
    storage::Storage,
    utils,
    verify::VerificationPipeline,
    worker::{Job, Worker, WorkerPool},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Returned by [`Verifier::submit`] once the Pending row is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub id: u64,
    pub status: VerificationStatus,
}

/// Fields shared by every verification status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSummary {
    pub id: u64,
    pub address: String,
    pub compiler_type: CompilerType,
    pub compiler_version: String,
    pub license: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status view of a verification request, one variant per status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationDetail {
    Pending {
        #[serde(flatten)]
        request: RequestSummary,
    },
    Successful {
        #[serde(flatten)]
        request: RequestSummary,
        contract_name: String,
    },
    /// The submitted source compiled but does not produce the deployed code
    BytecodeMismatch {
        #[serde(flatten)]
        request: RequestSummary,
        contract_name: Option<String>,
        message: String,
    },
    /// Verification could not be carried out
    Unknown {
        #[serde(flatten)]
        request: RequestSummary,
        message: String,
        compiler_errors: Option<serde_json::Value>,
    },
}

impl VerificationDetail {
    pub fn status(&self) -> VerificationStatus {
        match self {
            VerificationDetail::Pending { .. } => VerificationStatus::Pending,
            VerificationDetail::Successful { .. } => VerificationStatus::Successful,
            VerificationDetail::BytecodeMismatch { .. } => VerificationStatus::BytecodeMismatch,
            VerificationDetail::Unknown { .. } => VerificationStatus::Unknown,
        }
    }

    /// `true` when the submitter can fix the failure by changing the source
    pub fn is_actionable_failure(&self) -> bool {
        matches!(self, VerificationDetail::BytecodeMismatch { .. })
    }
}

impl From<VerificationRequest> for VerificationDetail {
    fn from(request: VerificationRequest) -> Self {
        let summary = RequestSummary {
            id: request.id,
            address: request.address,
            compiler_type: request.compiler_type,
            compiler_version: request.compiler_version,
            license: request.license,
            created_at: request.created_at,
            updated_at: request.updated_at,
        };
        let message = request.error_message.unwrap_or_default();

        match request.status {
            VerificationStatus::Pending => VerificationDetail::Pending { request: summary },
            VerificationStatus::Successful => VerificationDetail::Successful {
                request: summary,
                contract_name: request.contract_name.unwrap_or_default(),
            },
            VerificationStatus::BytecodeMismatch => VerificationDetail::BytecodeMismatch {
                request: summary,
                contract_name: request.contract_name,
                message,
            },
            VerificationStatus::Unknown => VerificationDetail::Unknown {
                request: summary,
                message,
                compiler_errors: request.error_payload,
            },
        }
    }
}

/// Entry point for verification. Owns the worker pool.
pub struct Verifier {
    storage: Arc<dyn Storage>,
    compiler: Arc<dyn SolidityCompiler>,
    pool: WorkerPool,
}

impl Verifier {
    /// Starts the worker pool. Must be called within a Tokio runtime.
    pub fn start(
        config: &VerifierConfig,
        storage: Arc<dyn Storage>,
        compiler: Arc<dyn SolidityCompiler>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Self {
        let pipeline = VerificationPipeline::new(compiler.clone(), fetcher);
        let worker = Worker::new(storage.clone(), pipeline);
        let pool = WorkerPool::start(worker, &config.worker);
        Self {
            storage,
            compiler,
            pool,
        }
    }

    /// Validates and stores a submission, then queues it. Returns as soon as
    /// the Pending row is written; poll [`Verifier::verification`] for the
    /// outcome.
    pub async fn submit(&self, submission: SubmitVerification) -> Result<SubmitReceipt> {
        submission.validate()?;
        let address = utils::normalize_address(&submission.address);

        let contract = self
            .storage
            .get_contract(&address)
            .await?
            .ok_or_else(|| Error::NotFound(format!("contract {address}")))?;

        if self.storage.find_successful(&address).await?.is_some() {
            return Err(Error::Conflict { address });
        }

        let deployed_bytecode = utils::decode_hex(&contract.deployed_bytecode)?;

        // reserve before writing so a full queue leaves no Pending row behind
        let slot = self.pool.reserve()?;
        let mut request = VerificationRequest::pending(submission);
        request.id = self.storage.insert_request(request.clone()).await?;
        let id = request.id;

        slot.send(Job {
            request,
            deployed_bytecode,
        });
        tracing::info!("Verification {} of {} queued", id, address);

        Ok(SubmitReceipt {
            id,
            status: VerificationStatus::Pending,
        })
    }

    pub async fn verification(&self, id: u64) -> Result<VerificationDetail> {
        self.storage
            .get_request(id)
            .await?
            .map(VerificationDetail::from)
            .ok_or_else(|| Error::NotFound(format!("verification {id}")))
    }

    /// Installed compiler versions, newest first
    pub async fn compiler_versions(&self) -> Result<Vec<String>> {
        self.compiler.available_versions().await
    }

    /// Drains the queue and waits for running verifications
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}
