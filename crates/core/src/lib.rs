//! Solidity source verification and ABI-driven decoding for EVM explorers
pub mod abi_cache;
pub mod artifacts;
pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod decoder;
mod error;
pub mod explorer;
pub mod request;
pub mod service;
pub mod source;
pub mod storage;
mod utils;
pub mod verify;
pub mod worker;

pub use abi_cache::{AbiResolver, AbiSource, StaticAbi};
pub use artifacts::{CompiledArtifact, CompilerOutput, ContractAbi, MetadataHash};
pub use bytecode::BytecodeMatch;
pub use compiler::{installed_versions, CompilerVersion, SolcCompiler, SolidityCompiler};
pub use config::VerifierConfig;
pub use decoder::{CallDecoder, DecodePolicy, DecodedCall, DecodedEvent, EventDecoder};
pub use error::{Error, ErrorKind, Result};
pub use explorer::{ContractSummary, Explorer, Listing, TransactionView};
pub use request::{
    CompilerType, SourcePart, SourcePayload, SubmitVerification, VerificationRequest,
    VerificationStatus,
};
pub use service::{SubmitReceipt, VerificationDetail, Verifier};
pub use source::{HttpSourceFetcher, SourceFetcher};
pub use storage::{ListQuery, MemoryStorage, Storage};
pub use utils::{decode_hex, normalize_address};
