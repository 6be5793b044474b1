use super::{
    ContractRecord, InternalTransactionRecord, Page, ReceiptRecord, Storage, StorageError,
    TransactionRecord,
};
use crate::{
    request::{VerificationOutcome, VerificationRequest, VerificationStatus},
    utils::normalize_address,
};
use async_trait::async_trait;
use chrono::Utc;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    requests: BTreeMap<u64, VerificationRequest>,
    contracts: BTreeMap<String, ContractRecord>,
    transactions: Vec<TransactionRecord>,
    internal_transactions: Vec<InternalTransactionRecord>,
    receipts: Vec<ReceiptRecord>,
}

/// Thread-safe in-memory [`Storage`]. Cloning shares the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_contract(&self, mut contract: ContractRecord) {
        contract.address = normalize_address(&contract.address);
        let mut inner = self.inner.write().await;
        inner.contracts.insert(contract.address.clone(), contract);
    }

    pub async fn insert_transaction(&self, mut tx: TransactionRecord) {
        tx.from = normalize_address(&tx.from);
        tx.to = tx.to.as_deref().map(normalize_address);
        self.inner.write().await.transactions.push(tx);
    }

    pub async fn insert_internal_transaction(&self, mut tx: InternalTransactionRecord) {
        tx.from = normalize_address(&tx.from);
        tx.to = tx.to.as_deref().map(normalize_address);
        self.inner.write().await.internal_transactions.push(tx);
    }

    pub async fn insert_receipt(&self, mut receipt: ReceiptRecord) {
        receipt.address = normalize_address(&receipt.address);
        self.inner.write().await.receipts.push(receipt);
    }
}

fn touches(from: &str, to: Option<&str>, address: &str) -> bool {
    from == address || to == Some(address)
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert_request(&self, mut request: VerificationRequest) -> Result<u64, StorageError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        request.id = id;
        request.address = normalize_address(&request.address);
        inner.requests.insert(id, request);
        Ok(id)
    }

    async fn finish_request(
        &self,
        id: u64,
        outcome: &VerificationOutcome,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;

        let address = match inner.requests.get(&id) {
            None => return Err(StorageError::MissingRequest(id)),
            Some(request) if request.status.is_terminal() => {
                return Err(StorageError::AlreadyTerminal(id))
            }
            Some(request) => request.address.clone(),
        };

        if outcome.status == VerificationStatus::Successful
            && inner
                .requests
                .values()
                .any(|r| r.address == address && r.status == VerificationStatus::Successful)
        {
            return Err(StorageError::Conflict { address });
        }

        let request = inner
            .requests
            .get_mut(&id)
            .ok_or(StorageError::MissingRequest(id))?;
        request.status = outcome.status;
        if outcome.contract_name.is_some() {
            request.contract_name = outcome.contract_name.clone();
        }
        request.output = outcome.output.clone();
        request.error_message = outcome.error_message.clone();
        request.error_payload = outcome.error_payload.clone();
        request.updated_at = Utc::now();
        Ok(())
    }

    async fn get_request(&self, id: u64) -> Result<Option<VerificationRequest>, StorageError> {
        Ok(self.inner.read().await.requests.get(&id).cloned())
    }

    async fn find_successful(
        &self,
        address: &str,
    ) -> Result<Option<VerificationRequest>, StorageError> {
        let address = normalize_address(address);
        let inner = self.inner.read().await;
        Ok(inner
            .requests
            .values()
            .find(|r| r.address == address && r.status == VerificationStatus::Successful)
            .cloned())
    }

    async fn get_contract(&self, address: &str) -> Result<Option<ContractRecord>, StorageError> {
        let address = normalize_address(address);
        Ok(self.inner.read().await.contracts.get(&address).cloned())
    }

    async fn list_contracts(&self, page: Page) -> Result<Vec<ContractRecord>, StorageError> {
        let inner = self.inner.read().await;
        let mut contracts: Vec<_> = inner.contracts.values().cloned().collect();
        contracts.sort_by(|a, b| b.block_number.cmp(&a.block_number));
        Ok(page.apply(contracts))
    }

    async fn count_transactions(&self, address: &str) -> Result<u64, StorageError> {
        let address = normalize_address(address);
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .iter()
            .filter(|tx| touches(&tx.from, tx.to.as_deref(), &address))
            .count() as u64)
    }

    async fn list_transactions(
        &self,
        address: &str,
        page: Page,
    ) -> Result<Vec<TransactionRecord>, StorageError> {
        let address = normalize_address(address);
        let inner = self.inner.read().await;
        let mut txs: Vec<_> = inner
            .transactions
            .iter()
            .filter(|tx| touches(&tx.from, tx.to.as_deref(), &address))
            .cloned()
            .collect();
        txs.sort_by(|a, b| {
            (b.block_number, b.transaction_index).cmp(&(a.block_number, a.transaction_index))
        });
        Ok(page.apply(txs))
    }

    async fn get_transaction(
        &self,
        hash: &str,
    ) -> Result<Option<TransactionRecord>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .iter()
            .find(|tx| tx.hash.eq_ignore_ascii_case(hash))
            .cloned())
    }

    async fn list_internal_transactions(
        &self,
        address: &str,
        page: Page,
    ) -> Result<Vec<InternalTransactionRecord>, StorageError> {
        let address = normalize_address(address);
        let inner = self.inner.read().await;
        let mut txs: Vec<_> = inner
            .internal_transactions
            .iter()
            .filter(|tx| touches(&tx.from, tx.to.as_deref(), &address))
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.block_number.cmp(&a.block_number));
        Ok(page.apply(txs))
    }

    async fn list_receipts(&self, address: &str) -> Result<Vec<ReceiptRecord>, StorageError> {
        let address = normalize_address(address);
        let inner = self.inner.read().await;
        let mut receipts: Vec<_> = inner
            .receipts
            .iter()
            .filter(|r| r.address == address)
            .cloned()
            .collect();
        receipts.sort_by(|a, b| b.block_number.cmp(&a.block_number));
        Ok(receipts)
    }

    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<ReceiptRecord>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .receipts
            .iter()
            .find(|r| r.transaction_hash.eq_ignore_ascii_case(tx_hash))
            .cloned())
    }
}
