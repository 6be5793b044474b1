//! Storage boundary: verification requests plus the indexed chain data the
//! read paths decode.

use crate::{
    config::PaginationConfig,
    error::{Error, Result},
    request::{VerificationOutcome, VerificationRequest},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod memory;

pub use memory::MemoryStorage;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("verification request {0} does not exist")]
    MissingRequest(u64),

    #[error("verification request {0} already has a terminal status")]
    AlreadyTerminal(u64),

    #[error("address {address} already has a successful verification")]
    Conflict { address: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A deployed contract as indexed from the chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractRecord {
    /// Lower-cased address
    pub address: String,
    pub creator: Option<String>,
    pub creation_tx_hash: Option<String>,
    /// Runtime bytecode, 0x-hex
    pub deployed_bytecode: String,
    pub block_number: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    pub hash: String,
    pub block_number: u64,
    pub block_hash: String,
    pub transaction_index: u64,
    pub from: String,
    /// `None` for contract creation
    pub to: Option<String>,
    /// Wei, decimal string
    pub value: String,
    /// Call-data, 0x-hex
    pub input: String,
    pub gas_used: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InternalTransactionRecord {
    pub parent_hash: String,
    pub block_number: u64,
    pub from: String,
    pub to: Option<String>,
    pub value: String,
    pub call_type: String,
}

/// A transaction receipt. `logs` is the stored JSON array of [`RawLog`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptRecord {
    pub transaction_hash: String,
    pub block_number: u64,
    /// Contract the receipt is indexed under
    pub address: String,
    pub logs: String,
}

/// One log entry as returned by the node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(default)]
    pub block_number: u64,
    #[serde(default)]
    pub block_hash: String,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub transaction_index: u64,
    #[serde(default)]
    pub log_index: u64,
    #[serde(default)]
    pub removed: bool,
}

/// Paging parameters as supplied by callers
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Validated paging window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl ListQuery {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// Applies defaults and rejects limits outside `1..=max_limit`
    pub fn resolve(&self, config: &PaginationConfig) -> Result<Page> {
        let limit = self.limit.unwrap_or(config.default_limit);
        if limit == 0 || limit > config.max_limit {
            return Err(Error::InvalidInput(format!(
                "limit must be between 1 and {}",
                config.max_limit
            )));
        }
        Ok(Page {
            limit,
            offset: self.offset.unwrap_or(0),
        })
    }
}

impl Page {
    /// Applies the window to an already ordered iterator
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}

/// Persistence consumed by the verifier and read API. Implementations must
/// enforce the single-terminal-write rule and the one-`Successful`-per-address
/// rule atomically.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Durably stores a Pending request and returns its id
    async fn insert_request(&self, request: VerificationRequest) -> Result<u64, StorageError>;

    /// Writes the terminal status of a Pending request
    async fn finish_request(
        &self,
        id: u64,
        outcome: &VerificationOutcome,
    ) -> Result<(), StorageError>;

    async fn get_request(&self, id: u64) -> Result<Option<VerificationRequest>, StorageError>;

    /// The `Successful` request for `address`, if any
    async fn find_successful(
        &self,
        address: &str,
    ) -> Result<Option<VerificationRequest>, StorageError>;

    async fn get_contract(&self, address: &str) -> Result<Option<ContractRecord>, StorageError>;

    async fn list_contracts(&self, page: Page) -> Result<Vec<ContractRecord>, StorageError>;

    /// Number of transactions whose `from` or `to` is `address`
    async fn count_transactions(&self, address: &str) -> Result<u64, StorageError>;

    /// Transactions touching `address`, newest block first
    async fn list_transactions(
        &self,
        address: &str,
        page: Page,
    ) -> Result<Vec<TransactionRecord>, StorageError>;

    async fn get_transaction(&self, hash: &str)
        -> Result<Option<TransactionRecord>, StorageError>;

    async fn list_internal_transactions(
        &self,
        address: &str,
        page: Page,
    ) -> Result<Vec<InternalTransactionRecord>, StorageError>;

    /// Receipts indexed under `address`, newest block first
    async fn list_receipts(&self, address: &str) -> Result<Vec<ReceiptRecord>, StorageError>;

    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<ReceiptRecord>, StorageError>;
}
