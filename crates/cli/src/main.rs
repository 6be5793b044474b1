//! CLI for the evm-verifier library
//!
//! Verifies Solidity sources against deployed bytecode and decodes call-data
//! and logs with a known ABI.

use clap::{Parser, Subcommand};
use evm_verifier::{
    storage::ContractRecord, AbiSource, CallDecoder, CompilerType, ContractAbi, DecodePolicy,
    DecodedCall, DecodedEvent, EventDecoder, HttpSourceFetcher, MemoryStorage, SolcCompiler,
    SolidityCompiler, SourcePart, SourcePayload, StaticAbi, SubmitVerification, VerificationDetail,
    Verifier, VerifierConfig,
};
use eyre::{Context, Result};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing_subscriber::EnvFilter;

/// Solidity contract verifier and ABI decoder
#[derive(Parser, Debug)]
#[command(name = "evm-verifier")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML). VERIFIER_* variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all logging except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Compiler settings of a verification
#[derive(Parser, Debug, Clone)]
struct CompileSettings {
    /// Compiler version, e.g. 0.8.10+commit.fc410830
    #[arg(long)]
    compiler_version: String,

    /// Only match this contract
    #[arg(long)]
    contract: Option<String>,

    /// Enable the optimizer
    #[arg(long)]
    optimize: bool,

    /// Optimizer runs
    #[arg(long, default_value_t = 200)]
    runs: u32,

    /// Target EVM version
    #[arg(long)]
    evm_version: Option<String>,

    /// SPDX license identifier
    #[arg(long, default_value = "UNLICENSED")]
    license: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify source code against deployed runtime bytecode
    Verify {
        /// Contract address
        #[arg(long)]
        address: String,

        /// Deployed runtime bytecode as hex, or @<file> holding it
        #[arg(long)]
        bytecode: String,

        /// Single source file
        #[arg(long, conflicts_with = "part", required_unless_present = "part")]
        source: Option<PathBuf>,

        /// Remote source file as <filename>=<url>, main contract first
        #[arg(long)]
        part: Vec<String>,

        /// Output JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        compile: CompileSettings,
    },

    /// Decode transaction call-data
    DecodeCall {
        /// ABI file: a JSON ABI array or an artifact with an `abi` field
        #[arg(long)]
        abi: PathBuf,

        /// Recipient; omit for contract creation
        #[arg(long)]
        to: Option<String>,

        /// Call-data as hex
        #[arg(long)]
        input: String,

        /// Fail on malformed arguments instead of returning an empty result
        #[arg(long)]
        strict: bool,
    },

    /// Decode a receipt's log array
    DecodeLogs {
        /// ABI file: a JSON ABI array or an artifact with an `abi` field
        #[arg(long)]
        abi: PathBuf,

        /// Emitting contract address
        #[arg(long)]
        address: String,

        /// File holding the JSON log array
        #[arg(long)]
        logs: PathBuf,

        /// Skip malformed logs instead of failing
        #[arg(long)]
        best_effort: bool,
    },

    /// List installed compiler versions
    Compilers {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum Output {
    #[serde(rename = "success")]
    Success {
        #[serde(flatten)]
        data: SuccessData,
    },

    #[serde(rename = "error")]
    Error { error_type: String, message: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "command")]
enum SuccessData {
    #[serde(rename = "verify")]
    Verify { verification: VerificationDetail },

    #[serde(rename = "decode_call")]
    DecodeCall { call: DecodedCall },

    #[serde(rename = "decode_logs")]
    DecodeLogs { events: Vec<DecodedEvent> },

    #[serde(rename = "compilers")]
    Compilers {
        bin_dir: String,
        versions: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = tokio::runtime::Runtime::new()
        .context("Failed to create async runtime")
        .and_then(|runtime| runtime.block_on(run(cli)));

    if let Err(e) = result {
        output_error(e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Verify {
            address,
            bytecode,
            source,
            part,
            json,
            compile,
        } => run_verify(&config, address, bytecode, source, part, compile, json).await,
        Commands::DecodeCall {
            abi,
            to,
            input,
            strict,
        } => {
            let policy = if strict {
                DecodePolicy::Strict
            } else {
                DecodePolicy::BestEffort
            };
            let call = decode_call(&abi, to.as_deref(), &input, policy).await?;
            print_success(SuccessData::DecodeCall { call })
        }
        Commands::DecodeLogs {
            abi,
            address,
            logs,
            best_effort,
        } => {
            let policy = if best_effort {
                DecodePolicy::BestEffort
            } else {
                DecodePolicy::Strict
            };
            let events = decode_logs(&abi, &address, &logs, policy).await?;
            print_success(SuccessData::DecodeLogs { events })
        }
        Commands::Compilers { json } => {
            let compiler = SolcCompiler::new(&config.compiler.bin_dir, config.compiler.timeout());
            let versions = compiler.available_versions().await?;
            let bin_dir = config.compiler.bin_dir.display().to_string();
            if json {
                print_success(SuccessData::Compilers { bin_dir, versions })
            } else {
                if versions.is_empty() {
                    println!("No compilers installed in {}", bin_dir);
                } else {
                    println!("📦 Installed compilers ({}):", bin_dir);
                    for version in versions {
                        println!("   - {}", version);
                    }
                }
                Ok(())
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<VerifierConfig> {
    match path {
        Some(path) => VerifierConfig::load(path),
        None => {
            let mut config = VerifierConfig::default();
            config.apply_env()?;
            config.validate()?;
            Ok(config)
        }
    }
}

async fn run_verify(
    config: &VerifierConfig,
    address: String,
    bytecode: String,
    source: Option<PathBuf>,
    parts: Vec<String>,
    settings: CompileSettings,
    json: bool,
) -> Result<()> {
    let deployed = read_hex_arg(&bytecode)?;
    let (compiler_type, sources) = match source {
        Some(path) => {
            let code = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read source file: {}", path.display()))?;
            (CompilerType::SingleFile, SourcePayload::Inline(code))
        }
        None => {
            let parts = parts
                .iter()
                .map(|p| parse_part(p))
                .collect::<Result<Vec<_>>>()?;
            (CompilerType::MultiPart, SourcePayload::Parts(parts))
        }
    };

    // one-shot run: the deployed code is the only contract known to storage
    let storage = MemoryStorage::new();
    storage
        .insert_contract(ContractRecord {
            address: address.clone(),
            creator: None,
            creation_tx_hash: None,
            deployed_bytecode: format!("0x{}", hex::encode(&deployed)),
            block_number: 0,
        })
        .await;

    tracing::info!(
        "Verifying {} with solc {} from {}",
        address,
        settings.compiler_version,
        config.compiler.bin_dir.display()
    );
    let compiler = SolcCompiler::new(&config.compiler.bin_dir, config.compiler.timeout());
    let fetcher = HttpSourceFetcher::new(&config.fetch)?;
    let verifier = Verifier::start(
        config,
        Arc::new(storage),
        Arc::new(compiler),
        Arc::new(fetcher),
    );

    let receipt = verifier
        .submit(SubmitVerification {
            address,
            compiler_type,
            compiler_version: settings.compiler_version,
            license: settings.license,
            optimize: settings.optimize,
            optimize_runs: settings.runs,
            evm_version: settings.evm_version,
            contract_name: settings.contract,
            sources,
        })
        .await?;

    let detail = loop {
        let detail = verifier.verification(receipt.id).await?;
        if detail.status().is_terminal() {
            break detail;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    };
    verifier.shutdown().await;

    let verified = detail.status().is_success();
    if json {
        print_success(SuccessData::Verify {
            verification: detail,
        })?;
    } else {
        print_detail(&detail);
    }

    if !verified {
        std::process::exit(1);
    }
    Ok(())
}

fn print_detail(detail: &VerificationDetail) {
    match detail {
        VerificationDetail::Successful {
            request,
            contract_name,
        } => {
            println!("✅ Contract verified successfully!");
            println!("📝 Contract name: {}", contract_name);
            println!("\n📋 Contract details:");
            println!("   Address: {}", request.address);
            println!("   Compiler: {}", request.compiler_version);
        }
        VerificationDetail::BytecodeMismatch {
            contract_name,
            message,
            ..
        } => {
            println!("❌ Verification failed!");
            if let Some(name) = contract_name {
                println!("📝 Contract name: {}", name);
            }
            println!("🔍 {}", message);
        }
        VerificationDetail::Unknown {
            message,
            compiler_errors,
            ..
        } => {
            println!("⚠️  Verification could not be completed: {}", message);
            if let Some(errors) = compiler_errors.as_ref().and_then(|e| e.as_array()) {
                for error in errors {
                    if let Some(text) = error
                        .get("formattedMessage")
                        .or_else(|| error.get("message"))
                        .and_then(|m| m.as_str())
                    {
                        println!("   {}", text.trim());
                    }
                }
            }
        }
        VerificationDetail::Pending { request } => {
            println!("⏳ Verification {} is still pending", request.id);
        }
    }
}

/// Parses `<filename>=<url>`
fn parse_part(raw: &str) -> Result<SourcePart> {
    let (filename, url) = raw
        .split_once('=')
        .ok_or_else(|| eyre::eyre!("Invalid source part {:?}, expected <filename>=<url>", raw))?;
    Ok(SourcePart {
        filename: filename.trim().to_string(),
        url: url.trim().to_string(),
    })
}

/// Hex given inline, or `@path` to a file holding it
fn read_hex_arg(raw: &str) -> Result<Vec<u8>> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bytecode file: {}", path))?,
        None => raw.to_string(),
    };
    Ok(evm_verifier::decode_hex(&text)?)
}

fn load_abi(path: &Path) -> Result<ContractAbi> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ABI file: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse ABI file: {}", path.display()))?;
    let abi = match value.get("abi") {
        Some(abi) => abi,
        None => &value,
    };
    Ok(ContractAbi::from_value(abi)?)
}

async fn decode_call(
    abi_path: &Path,
    to: Option<&str>,
    input: &str,
    policy: DecodePolicy,
) -> Result<DecodedCall> {
    let abi = load_abi(abi_path)?;
    let input = evm_verifier::decode_hex(input)?;
    let abis = match to {
        Some(to) => StaticAbi::new().with(to, abi),
        None => StaticAbi::new(),
    };
    Ok(CallDecoder::new(policy).decode(&abis, to, &input).await?)
}

async fn decode_logs(
    abi_path: &Path,
    address: &str,
    logs_path: &Path,
    policy: DecodePolicy,
) -> Result<Vec<DecodedEvent>> {
    let abis: Arc<dyn AbiSource> = Arc::new(StaticAbi::new().with(address, load_abi(abi_path)?));
    let logs = std::fs::read_to_string(logs_path)
        .with_context(|| format!("Failed to read logs file: {}", logs_path.display()))?;
    Ok(EventDecoder::new(policy)
        .decode_receipt(abis.as_ref(), address, &logs)
        .await?)
}

fn print_success(data: SuccessData) -> Result<()> {
    let output = Output::Success { data };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn error_type(error: &eyre::Report) -> &'static str {
    use evm_verifier::ErrorKind;

    let Some(error) = error.downcast_ref::<evm_verifier::Error>() else {
        return "unknown_error";
    };
    match error.kind() {
        ErrorKind::NotFound => "not_found",
        ErrorKind::InvalidInput => "invalid_input",
        ErrorKind::Conflict => "conflict",
        ErrorKind::UpstreamFetch => "network_error",
        ErrorKind::CompilerNotFound => "compiler_not_found",
        ErrorKind::Compile => "compilation_failed",
        ErrorKind::BytecodeMismatch => "bytecode_mismatch",
        ErrorKind::Decode | ErrorKind::MalformedOutput => "decode_error",
        ErrorKind::QueueFull => "queue_full",
        ErrorKind::Internal => "internal_error",
    }
}

fn output_error(error: eyre::Report) {
    let output = Output::Error {
        error_type: error_type(&error).to_string(),
        message: format!("{:#}", error),
    };

    match serde_json::to_string(&output) {
        Ok(json) => eprintln!("{}", json),
        Err(_) => eprintln!("{:?}", error),
    }
}
