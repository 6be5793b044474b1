//! Read API over indexed chain data, annotated with decoded calls and events

use crate::{
    abi_cache::AbiSource,
    config::PaginationConfig,
    decoder::{CallDecoder, DecodePolicy, DecodedCall, DecodedEvent, EventDecoder},
    error::{Error, Result},
    storage::{
        ContractRecord, InternalTransactionRecord, ListQuery, Page, Storage, TransactionRecord,
    },
    utils,
};
use serde::Serialize;
use std::sync::Arc;

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub limit: usize,
    pub offset: usize,
}

impl<T> Listing<T> {
    fn new(items: Vec<T>, page: Page) -> Self {
        Self {
            items,
            limit: page.limit,
            offset: page.offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractSummary {
    #[serde(flatten)]
    pub contract: ContractRecord,
    pub transaction_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: TransactionRecord,
    pub decoded: DecodedCall,
}

/// Answers explorer queries. Calls decode best-effort and events strictly
/// unless configured otherwise.
pub struct Explorer {
    storage: Arc<dyn Storage>,
    abis: Arc<dyn AbiSource>,
    pagination: PaginationConfig,
    calls: CallDecoder,
    events: EventDecoder,
}

impl Explorer {
    pub fn new(
        storage: Arc<dyn Storage>,
        abis: Arc<dyn AbiSource>,
        pagination: PaginationConfig,
    ) -> Self {
        Self {
            storage,
            abis,
            pagination,
            calls: CallDecoder::default(),
            events: EventDecoder::default(),
        }
    }

    pub fn with_policies(mut self, calls: DecodePolicy, events: DecodePolicy) -> Self {
        self.calls = CallDecoder::new(calls);
        self.events = EventDecoder::new(events);
        self
    }

    pub async fn list_contracts(&self, query: ListQuery) -> Result<Listing<ContractSummary>> {
        let page = query.resolve(&self.pagination)?;
        let contracts = self.storage.list_contracts(page).await?;

        let mut items = Vec::with_capacity(contracts.len());
        for contract in contracts {
            items.push(self.summarize(contract).await?);
        }
        Ok(Listing::new(items, page))
    }

    pub async fn get_contract(&self, address: &str) -> Result<ContractSummary> {
        let address = checked_address(address)?;
        let contract = self
            .storage
            .get_contract(&address)
            .await?
            .ok_or_else(|| Error::NotFound(format!("contract {address}")))?;
        self.summarize(contract).await
    }

    /// Transactions sent from or to `address`, newest first
    pub async fn list_transactions(
        &self,
        address: &str,
        query: ListQuery,
    ) -> Result<Listing<TransactionView>> {
        let address = checked_address(address)?;
        let page = query.resolve(&self.pagination)?;
        let transactions = self.storage.list_transactions(&address, page).await?;

        let mut items = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            items.push(self.annotate(transaction).await?);
        }
        Ok(Listing::new(items, page))
    }

    pub async fn get_transaction(&self, hash: &str) -> Result<TransactionView> {
        let transaction = self
            .storage
            .get_transaction(hash)
            .await?
            .ok_or_else(|| Error::NotFound(format!("transaction {hash}")))?;
        self.annotate(transaction).await
    }

    pub async fn list_internal_transactions(
        &self,
        address: &str,
        query: ListQuery,
    ) -> Result<Listing<InternalTransactionRecord>> {
        let address = checked_address(address)?;
        let page = query.resolve(&self.pagination)?;
        let items = self
            .storage
            .list_internal_transactions(&address, page)
            .await?;
        Ok(Listing::new(items, page))
    }

    /// Events of the receipts indexed under `address`, newest receipt first.
    /// Receipts are decoded one by one until the page is covered.
    pub async fn list_events(
        &self,
        address: &str,
        query: ListQuery,
    ) -> Result<Listing<DecodedEvent>> {
        let address = checked_address(address)?;
        let page = query.resolve(&self.pagination)?;
        let wanted = page.offset.saturating_add(page.limit);

        let mut events = Vec::new();
        for receipt in self.storage.list_receipts(&address).await? {
            let decoded = self
                .events
                .decode_receipt(self.abis.as_ref(), &address, &receipt.logs)
                .await
                .inspect_err(|e| {
                    tracing::error!(
                        "Event extraction failed for receipt {}: {}",
                        receipt.transaction_hash,
                        e
                    )
                })?;
            events.extend(decoded);
            if events.len() >= wanted {
                break;
            }
        }
        Ok(Listing::new(page.apply(events), page))
    }

    /// Events emitted by one transaction
    pub async fn list_transaction_events(&self, hash: &str) -> Result<Vec<DecodedEvent>> {
        let receipt = self
            .storage
            .get_receipt(hash)
            .await?
            .ok_or_else(|| Error::NotFound(format!("receipt of transaction {hash}")))?;
        self.events
            .decode_receipt(self.abis.as_ref(), &receipt.address, &receipt.logs)
            .await
    }

    async fn summarize(&self, contract: ContractRecord) -> Result<ContractSummary> {
        let transaction_count = self.storage.count_transactions(&contract.address).await?;
        Ok(ContractSummary {
            contract,
            transaction_count,
        })
    }

    async fn annotate(&self, transaction: TransactionRecord) -> Result<TransactionView> {
        let decoded = match utils::decode_hex(&transaction.input) {
            Ok(input) => {
                self.calls
                    .decode(self.abis.as_ref(), transaction.to.as_deref(), &input)
                    .await?
            }
            Err(e) if self.calls.policy().is_strict() => return Err(e),
            Err(e) => {
                tracing::warn!("Transaction {} has unreadable input: {}", transaction.hash, e);
                DecodedCall::default()
            }
        };
        Ok(TransactionView {
            transaction,
            decoded,
        })
    }
}

fn checked_address(address: &str) -> Result<String> {
    if !utils::is_valid_address(address) {
        return Err(Error::InvalidInput(format!(
            "address {address:?} is not a 20-byte hex string"
        )));
    }
    Ok(utils::normalize_address(address))
}
