//! Submit, poll and decode against in-memory storage and a scripted compiler

use async_trait::async_trait;
use evm_verifier::{
    compiler::{CompilerInput, CompilerVersion},
    config::PaginationConfig,
    storage::{ContractRecord, TransactionRecord},
    AbiResolver, AbiSource, CompilerOutput, CompilerType, Error, Explorer, ListQuery, MemoryStorage,
    Result, SolidityCompiler, SourcePayload, SubmitVerification, VerificationDetail,
    VerificationStatus, Verifier, VerifierConfig,
};
use serde_json::json;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

const ADDRESS: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
const SENDER: &str = "0x00000000000000000000000000000000000000cc";
const RUNTIME: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x34, 0x80, 0x15, 0x61, 0x00, 0x10];
const TRANSFER_INPUT: &str = "0xa9059cbb\
    0000000000000000000000002222222222222222222222222222222222222222\
    0000000000000000000000000000000000000000000000000000000000000064";

/// solc's `{"ipfs": <multihash>, "solc": <version>}` trailer for `hash`
fn with_metadata(code: &[u8], hash: u8) -> Vec<u8> {
    let mut out = code.to_vec();
    out.extend_from_slice(&[0xa2, 0x64, b'i', b'p', b'f', b's', 0x58, 0x22, 0x12, 0x20]);
    out.extend_from_slice(&[hash; 32]);
    out.extend_from_slice(&[0x64, b's', b'o', b'l', b'c', 0x43, 0x00, 0x08, 0x0a]);
    out.extend_from_slice(&[0x00, 0x33]);
    out
}

fn token_output(runtime: &[u8]) -> CompilerOutput {
    CompilerOutput::from_json(
        &json!({
            "contracts": {
                "Token.sol": {
                    "Token": {
                        "abi": [{
                            "type": "function",
                            "name": "transfer",
                            "stateMutability": "nonpayable",
                            "inputs": [
                                {"name": "to", "type": "address"},
                                {"name": "amount", "type": "uint256"}
                            ],
                            "outputs": [{"name": "", "type": "bool"}]
                        }],
                        "metadata": "{\"settings\":{\"metadata\":{\"bytecodeHash\":\"ipfs\"}}}",
                        "evm": {"deployedBytecode": {"object": hex::encode(runtime)}}
                    }
                }
            }
        })
        .to_string(),
    )
    .unwrap()
}

/// Replays a fixed output, or fails like a compiler reporting a syntax error
struct ScriptedCompiler {
    output: Option<CompilerOutput>,
    calls: AtomicUsize,
}

#[async_trait]
impl SolidityCompiler for ScriptedCompiler {
    async fn compile(
        &self,
        version: &CompilerVersion,
        input: &CompilerInput,
    ) -> Result<CompilerOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(version.release(), "0.8.10");
        assert!(input.sources.contains_key("Token.sol"));
        self.output.clone().ok_or_else(|| Error::Compile {
            message: "ParserError: Expected ';' but got '}'".to_string(),
            payload: Some(json!([{"severity": "error", "type": "ParserError"}])),
        })
    }

    async fn available_versions(&self) -> Result<Vec<String>> {
        Ok(vec!["0.8.10".to_string()])
    }
}

struct Harness {
    storage: MemoryStorage,
    compiler: Arc<ScriptedCompiler>,
    verifier: Verifier,
    resolver: Arc<AbiResolver>,
    explorer: Explorer,
}

async fn harness(compiled: Option<CompilerOutput>) -> Harness {
    let storage = MemoryStorage::new();
    storage
        .insert_contract(ContractRecord {
            address: ADDRESS.to_string(),
            creator: Some(SENDER.to_string()),
            creation_tx_hash: None,
            deployed_bytecode: format!("0x{}", hex::encode(with_metadata(RUNTIME, 0x01))),
            block_number: 1,
        })
        .await;
    storage
        .insert_transaction(TransactionRecord {
            hash: "0xabc1".to_string(),
            block_number: 2,
            block_hash: "0xb2".to_string(),
            transaction_index: 0,
            from: SENDER.to_string(),
            to: Some(ADDRESS.to_string()),
            value: "0".to_string(),
            input: TRANSFER_INPUT.to_string(),
            gas_used: 51_000,
        })
        .await;

    let compiler = Arc::new(ScriptedCompiler {
        output: compiled,
        calls: AtomicUsize::new(0),
    });
    let verifier = Verifier::start(
        &VerifierConfig::default(),
        Arc::new(storage.clone()),
        compiler.clone(),
        Arc::new(NoRemoteSources),
    );
    let resolver = Arc::new(AbiResolver::new(Arc::new(storage.clone())));
    let explorer = Explorer::new(
        Arc::new(storage.clone()),
        resolver.clone(),
        PaginationConfig::default(),
    );

    Harness {
        storage,
        compiler,
        verifier,
        resolver,
        explorer,
    }
}

struct NoRemoteSources;

#[async_trait]
impl evm_verifier::SourceFetcher for NoRemoteSources {
    async fn fetch(&self, url: &str) -> Result<String> {
        Err(Error::UpstreamFetch {
            url: url.to_string(),
            reason: "offline".to_string(),
        })
    }
}

fn submission() -> SubmitVerification {
    SubmitVerification {
        address: ADDRESS.to_string(),
        compiler_type: CompilerType::SingleFile,
        compiler_version: "0.8.10+commit.fc410830".to_string(),
        license: "MIT".to_string(),
        optimize: true,
        optimize_runs: 200,
        evm_version: None,
        contract_name: Some("Token".to_string()),
        sources: SourcePayload::Inline("contract Token { /* ... */ }".to_string()),
    }
}

async fn wait_terminal(verifier: &Verifier, id: u64) -> VerificationDetail {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let detail = verifier.verification(id).await.unwrap();
            if detail.status().is_terminal() {
                return detail;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("verification did not reach a terminal status")
}

async fn first_method(explorer: &Explorer) -> String {
    let listing = explorer
        .list_transactions(ADDRESS, ListQuery::default())
        .await
        .unwrap();
    listing.items[0].decoded.method_name.clone()
}

#[tokio::test]
async fn verified_contract_becomes_decodable() {
    // same executable code, different metadata hash
    let h = harness(Some(token_output(&with_metadata(RUNTIME, 0x02)))).await;

    // before verification only the selector is known
    assert_eq!(first_method(&h.explorer).await, "0xa9059cbb");
    assert!(h.resolver.resolve(ADDRESS).await.unwrap().is_none());

    let receipt = h.verifier.submit(submission()).await.unwrap();
    assert_eq!(receipt.status, VerificationStatus::Pending);

    match wait_terminal(&h.verifier, receipt.id).await {
        VerificationDetail::Successful {
            contract_name,
            request,
        } => {
            assert_eq!(contract_name, "Token");
            assert_eq!(request.address, ADDRESS.to_lowercase());
        }
        other => panic!("expected a successful verification, got {other:?}"),
    }

    let stored = h.storage_request(receipt.id).await;
    assert!(stored.output.is_some());

    assert!(h.resolver.resolve(ADDRESS).await.unwrap().is_some());
    let view = h.explorer.get_transaction("0xabc1").await.unwrap();
    assert_eq!(view.decoded.method_name, "transfer");
    assert_eq!(view.decoded.signature, "transfer(address,uint256)");
    assert_eq!(view.decoded.params["amount"], json!("100"));

    // a verified address cannot be verified again, and nothing is queued or compiled
    let compiled = h.compiler.calls.load(Ordering::SeqCst);
    assert_eq!(compiled, 1);
    let err = h.verifier.submit(submission()).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
    assert_eq!(err.kind().http_status(), 409);
    let next = h.verifier.verification(receipt.id + 1).await.unwrap_err();
    assert!(matches!(next, Error::NotFound(_)));

    h.verifier.shutdown().await;
    assert_eq!(h.compiler.calls.load(Ordering::SeqCst), compiled);
}

#[tokio::test]
async fn opcode_mismatch_keeps_contract_unverified() {
    let mut tampered = RUNTIME.to_vec();
    tampered[2] = 0x61;
    let h = harness(Some(token_output(&with_metadata(&tampered, 0x01)))).await;

    let receipt = h.verifier.submit(submission()).await.unwrap();
    let detail = wait_terminal(&h.verifier, receipt.id).await;
    assert_eq!(detail.status(), VerificationStatus::BytecodeMismatch);
    assert!(detail.is_actionable_failure());

    // compiler output is kept for diagnostics
    assert!(h.storage_request(receipt.id).await.output.is_some());

    assert!(h.resolver.resolve(ADDRESS).await.unwrap().is_none());
    assert_eq!(first_method(&h.explorer).await, "0xa9059cbb");

    // resubmission is allowed after a mismatch
    let retry = h.verifier.submit(submission()).await.unwrap();
    assert_ne!(retry.id, receipt.id);
    h.verifier.shutdown().await;
}

#[tokio::test]
async fn compile_failure_is_distinct_from_mismatch() {
    let h = harness(None).await;

    let receipt = h.verifier.submit(submission()).await.unwrap();
    let detail = wait_terminal(&h.verifier, receipt.id).await;
    assert_eq!(detail.status(), VerificationStatus::Unknown);
    assert!(!detail.is_actionable_failure());

    let value = serde_json::to_value(&detail).unwrap();
    assert_eq!(value["status"], "unknown");
    assert_eq!(value["compiler_errors"][0]["type"], "ParserError");
    assert!(value["message"].as_str().unwrap().contains("ParserError"));

    assert!(h.resolver.resolve(ADDRESS).await.unwrap().is_none());
    h.verifier.shutdown().await;
}

impl Harness {
    async fn storage_request(&self, id: u64) -> evm_verifier::VerificationRequest {
        use evm_verifier::Storage;
        self.storage.get_request(id).await.unwrap().unwrap()
    }
}
