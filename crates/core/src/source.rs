//! Normalizes a verification request into the source map handed to the compiler

use crate::{
    config::FetchConfig,
    error::{Error, Result},
    request::{CompilerType, SourcePayload, VerificationRequest},
    utils,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Source unit name used for an inline single-file submission without a
/// contract name
pub const SINGLE_FILE_UNIT: &str = "contract.sol";

/// Sources ready for compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBundle {
    /// Source unit name to content
    pub sources: BTreeMap<String, String>,
    /// Base name (without `.sol`) of the file holding the main contract.
    /// Empty for single-file submissions.
    pub primary_file_name: String,
}

impl SourceBundle {
    pub fn single_file(code: &str, contract_name: Option<&str>) -> Self {
        let unit = contract_name
            .map(|name| format!("{name}.sol"))
            .unwrap_or_else(|| SINGLE_FILE_UNIT.to_string());
        let mut sources = BTreeMap::new();
        sources.insert(unit, code.to_string());
        Self {
            sources,
            primary_file_name: String::new(),
        }
    }

    /// Primary file, if the submission designated one
    pub fn primary_file(&self) -> Option<&str> {
        (!self.primary_file_name.is_empty()).then_some(self.primary_file_name.as_str())
    }

    /// SHA256 over all unit names and contents, in name order
    pub fn digest(&self) -> String {
        let mut buf = Vec::new();
        for (name, content) in &self.sources {
            buf.extend_from_slice(name.as_bytes());
            buf.push(0);
            buf.extend_from_slice(content.as_bytes());
            buf.push(0);
        }
        utils::hash_bytes(&buf)
    }

    /// Builds the bundle for a stored request. Multi-part sources are fetched
    /// in order and the first failure aborts the whole bundle.
    pub async fn build(request: &VerificationRequest, fetcher: &dyn SourceFetcher) -> Result<Self> {
        match (request.compiler_type, &request.sources) {
            (CompilerType::SingleFile, SourcePayload::Inline(code)) => {
                Ok(Self::single_file(code, request.contract_name.as_deref()))
            }
            (CompilerType::MultiPart, SourcePayload::Parts(parts)) => {
                let mut sources = BTreeMap::new();
                for part in parts {
                    tracing::debug!("Fetching {} from {}", part.filename, part.url);
                    let content = fetcher.fetch(&part.url).await?;
                    sources.insert(part.filename.clone(), content);
                }
                Ok(Self {
                    sources,
                    primary_file_name: primary_file_name(&request.sources),
                })
            }
            (CompilerType::StdJsonInput, _) => Err(Error::InvalidInput(
                "std_json_input submissions are not supported".to_string(),
            )),
            (compiler_type, _) => Err(Error::InvalidInput(format!(
                "source payload does not match compiler type {compiler_type}"
            ))),
        }
    }
}

/// Base name of the first part without its `.sol` extension. Empty for
/// inline sources.
pub fn primary_file_name(sources: &SourcePayload) -> String {
    match sources {
        SourcePayload::Parts(parts) => parts
            .first()
            .map(|part| {
                let base = part.filename.rsplit('/').next().unwrap_or(&part.filename);
                base.strip_suffix(".sol").unwrap_or(base).to_string()
            })
            .unwrap_or_default(),
        SourcePayload::Inline(_) => String::new(),
    }
}

/// Retrieves remote source files
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Plain HTTP GET fetcher. No retries.
#[derive(Debug, Clone)]
pub struct HttpSourceFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpSourceFetcher {
    pub fn new(config: &FetchConfig) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| eyre::eyre!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            max_bytes: config.max_source_bytes,
        })
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let fetch_error = |reason: String| Error::UpstreamFetch {
            url: url.to_string(),
            reason,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_error(e.to_string()))?;

        let too_large = || fetch_error(format!("source exceeds {} bytes", self.max_bytes));
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(too_large());
        }

        // the declared length is optional, so the cap is enforced while reading
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| fetch_error(e.to_string()))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        String::from_utf8(body)
            .map_err(|e| fetch_error(format!("source is not valid UTF-8: {e}")))
    }
}
