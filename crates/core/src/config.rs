//! Configuration for the verifier: compiler location, worker pool, fetching and paging

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for concurrently running compilations
pub const MAX_WORKERS: usize = 1024;

/// Upper bound for submissions waiting in the verification queue
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Main configuration for the verification engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VerifierConfig {
    /// Compiler toolchain settings
    pub compiler: CompilerConfig,

    /// Background verification pool
    pub worker: WorkerConfig,

    /// Remote source fetching for multi-part submissions
    pub fetch: FetchConfig,

    /// Page size limits for read endpoints
    pub pagination: PaginationConfig,
}

/// Where compiler builds live and how long one invocation may run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Directory holding one sub-directory per version, each with a `solc` binary
    pub bin_dir: PathBuf,

    /// Per-invocation timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum compilations running at once
    pub concurrency: usize,

    /// Maximum submissions waiting for a worker
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,

    /// Largest accepted source file, in bytes
    pub max_source_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            bin_dir: PathBuf::from("compilers"),
            timeout_secs: 120,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            queue_capacity: 64,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_source_bytes: 2 * 1024 * 1024,
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            compiler: CompilerConfig::default(),
            worker: WorkerConfig::default(),
            fetch: FetchConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

impl CompilerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl VerifierConfig {
    /// Reads a TOML file, applies environment overrides and validates the result
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_toml_file(path)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML file. Missing sections fall back to defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies `VERIFIER_*` environment variables on top of the current values
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup, so callers and tests do not
    /// need to touch the process environment.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("VERIFIER_COMPILER_DIR") {
            self.compiler.bin_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("VERIFIER_COMPILER_TIMEOUT_SECS") {
            self.compiler.timeout_secs = parse_env("VERIFIER_COMPILER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("VERIFIER_WORKERS") {
            self.worker.concurrency = parse_env("VERIFIER_WORKERS", &value)?;
        }
        if let Some(value) = lookup("VERIFIER_QUEUE_CAPACITY") {
            self.worker.queue_capacity = parse_env("VERIFIER_QUEUE_CAPACITY", &value)?;
        }
        if let Some(value) = lookup("VERIFIER_FETCH_TIMEOUT_SECS") {
            self.fetch.timeout_secs = parse_env("VERIFIER_FETCH_TIMEOUT_SECS", &value)?;
        }
        Ok(())
    }

    /// Validates the entire configuration
    pub fn validate(&self) -> Result<()> {
        if self.compiler.timeout_secs == 0 {
            return Err(eyre::eyre!("compiler.timeout_secs must be greater than 0"));
        }
        if self.worker.concurrency == 0 || self.worker.concurrency > MAX_WORKERS {
            return Err(eyre::eyre!(
                "worker.concurrency must be between 1 and {}",
                MAX_WORKERS
            ));
        }
        if self.worker.queue_capacity == 0 || self.worker.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(eyre::eyre!(
                "worker.queue_capacity must be between 1 and {}",
                MAX_QUEUE_CAPACITY
            ));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(eyre::eyre!("fetch.timeout_secs must be greater than 0"));
        }
        if self.pagination.max_limit == 0 {
            return Err(eyre::eyre!("pagination.max_limit must be greater than 0"));
        }
        if self.pagination.default_limit == 0
            || self.pagination.default_limit > self.pagination.max_limit
        {
            return Err(eyre::eyre!(
                "pagination.default_limit must be between 1 and {}",
                self.pagination.max_limit
            ));
        }
        Ok(())
    }

    /// Create a new builder for VerifierConfig
    pub fn builder() -> VerifierConfigBuilder {
        VerifierConfigBuilder::default()
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| eyre::eyre!("Invalid value for {}: {:?} ({})", key, value, e))
}

/// Builder for creating VerifierConfig with a fluent API
#[derive(Default)]
pub struct VerifierConfigBuilder {
    config: VerifierConfig,
}

impl VerifierConfigBuilder {
    /// Set the compiler binary directory
    pub fn compiler_dir(mut self, path: PathBuf) -> Self {
        self.config.compiler.bin_dir = path;
        self
    }

    pub fn compiler_timeout(mut self, timeout: Duration) -> Self {
        self.config.compiler.timeout_secs = timeout.as_secs();
        self
    }

    /// Set the number of compilations allowed to run at once
    pub fn workers(mut self, concurrency: usize) -> Self {
        self.config.worker.concurrency = concurrency;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.worker.queue_capacity = capacity;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch.timeout_secs = timeout.as_secs();
        self
    }

    /// Set default and maximum page sizes
    pub fn pagination(mut self, default_limit: usize, max_limit: usize) -> Self {
        self.config.pagination = PaginationConfig {
            default_limit,
            max_limit,
        };
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<VerifierConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
