//! Per-address interface cache backed by successful verifications

use crate::{
    artifacts::{CompilerOutput, ContractAbi},
    error::{Error, Result},
    source::primary_file_name,
    storage::Storage,
    utils,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::{collections::HashMap, sync::Arc};

/// Anything that can map a contract address to its interface.
/// `Ok(None)` means the address has no known ABI.
#[async_trait]
pub trait AbiSource: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<Option<Arc<ContractAbi>>>;
}

/// Lazily loads ABIs from the `Successful` verification of each address.
///
/// Entries never expire: a verified interface does not change. Absence and
/// parse failures are not cached, so a verification finishing later is
/// picked up on the next call.
pub struct AbiResolver {
    storage: Arc<dyn Storage>,
    cache: DashMap<String, Arc<ContractAbi>>,
}

impl AbiResolver {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            cache: DashMap::new(),
        }
    }

    /// Number of cached interfaces
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    async fn load(&self, address: &str) -> Result<Option<ContractAbi>> {
        let Some(request) = self.storage.find_successful(address).await? else {
            return Ok(None);
        };
        let raw = request.output.as_deref().ok_or_else(|| {
            Error::MalformedOutput(format!(
                "verification {} of {} has no compiler output",
                request.id, address
            ))
        })?;

        let output = CompilerOutput::from_json(raw)?;
        let primary = primary_file_name(&request.sources);
        let primary = (!primary.is_empty()).then_some(primary.as_str());
        let abi = output.contract_abi(primary, request.contract_name.as_deref())?;
        Ok(Some(abi))
    }
}

#[async_trait]
impl AbiSource for AbiResolver {
    async fn resolve(&self, address: &str) -> Result<Option<Arc<ContractAbi>>> {
        let key = utils::normalize_address(address);
        if let Some(abi) = self.cache.get(&key) {
            tracing::debug!("ABI cache hit for {}", key);
            return Ok(Some(abi.clone()));
        }

        tracing::debug!("ABI cache miss for {}", key);
        let Some(abi) = self.load(&key).await? else {
            return Ok(None);
        };

        // a concurrent loader may have stored first; keep its value
        let stored = self.cache.entry(key).or_insert(Arc::new(abi)).clone();
        Ok(Some(stored))
    }
}

/// Fixed address-to-ABI table, for offline decoding
#[derive(Debug, Clone, Default)]
pub struct StaticAbi {
    entries: HashMap<String, Arc<ContractAbi>>,
}

impl StaticAbi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: &str, abi: ContractAbi) -> Self {
        self.entries.insert(utils::normalize_address(address), Arc::new(abi));
        self
    }
}

#[async_trait]
impl AbiSource for StaticAbi {
    async fn resolve(&self, address: &str) -> Result<Option<Arc<ContractAbi>>> {
        Ok(self.entries.get(&utils::normalize_address(address)).cloned())
    }
}
