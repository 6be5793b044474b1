use super::{decode_params, resolved, to_json, DecodePolicy, Params};
use crate::{
    abi_cache::AbiSource,
    artifacts::{ContractAbi, EventDescriptor},
    error::{Error, Result},
    storage::RawLog,
    utils,
};
use alloy_dyn_abi::DynSolType;
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decoded view of one log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub event_name: String,
    pub signature: String,
    pub address: String,
    pub topics: Vec<String>,
    /// Parameters read from topics 1..
    pub indexed: Params,
    /// Raw data, 0x-hex
    pub data: String,
    /// Parameters read from the data payload
    pub params: Params,
    pub block_number: u64,
    pub block_hash: String,
    pub transaction_hash: String,
    pub transaction_index: u64,
    pub log_index: u64,
    pub removed: bool,
}

/// Dispatches logs to events by topic-0
#[derive(Debug, Clone, Copy)]
pub struct EventDecoder {
    policy: DecodePolicy,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new(DecodePolicy::Strict)
    }
}

impl EventDecoder {
    pub fn new(policy: DecodePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    /// Decodes the stored log array of one receipt.
    ///
    /// Each log is resolved against the ABI of its own emitter, `address` is
    /// used when a log carries none. Logs without a resolvable ABI or with an
    /// unknown topic-0 are skipped.
    pub async fn decode_receipt(
        &self,
        abis: &dyn AbiSource,
        address: &str,
        logs: &str,
    ) -> Result<Vec<DecodedEvent>> {
        let logs = match parse_logs(logs) {
            Ok(logs) => logs,
            Err(e) => return self.degrade(e, "unreadable receipt logs").map(|_| Vec::new()),
        };

        let mut events = Vec::new();
        for log in &logs {
            let emitter = if log.address.is_empty() {
                address
            } else {
                log.address.as_str()
            };

            let abi = match abis.resolve(emitter).await {
                Ok(Some(abi)) => abi,
                Ok(None) => continue,
                Err(e) => {
                    self.degrade(e, "ABI resolution failed")?;
                    continue;
                }
            };

            match decode_log(&abi, log) {
                Ok(Some(mut event)) => {
                    event.address = utils::normalize_address(emitter);
                    events.push(event)
                }
                Ok(None) => {}
                Err(e) => self.degrade(e, "malformed log")?,
            }
        }
        Ok(events)
    }

    fn degrade(&self, error: Error, context: &str) -> Result<()> {
        if self.policy.is_strict() {
            return Err(error);
        }
        tracing::warn!("Skipping {}: {}", context, error);
        Ok(())
    }
}

fn parse_logs(logs: &str) -> Result<Vec<RawLog>> {
    let trimmed = logs.trim();
    if trimmed.is_empty() || trimmed == "[]" || trimmed == "null" {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(|e| Error::Decode(format!("invalid log array: {e}")))
}

/// Decodes one log. `Ok(None)` when topic-0 is missing or not an event of `abi`.
pub fn decode_log(abi: &ContractAbi, log: &RawLog) -> Result<Option<DecodedEvent>> {
    let Some(topic0) = log.topics.first() else {
        return Ok(None);
    };
    let Some(event) = abi.event(&parse_topic(topic0)?) else {
        return Ok(None);
    };

    let indexed = decode_indexed(event, &log.topics[1..])?;
    let data_inputs: Vec<_> = event.data_inputs().collect();
    let params = decode_params(&data_inputs, &utils::decode_hex(&log.data)?)
        .map_err(|e| Error::Decode(format!("data of {}: {}", event.signature, e)))?;

    Ok(Some(DecodedEvent {
        event_name: event.name.clone(),
        signature: event.signature.clone(),
        address: utils::normalize_address(&log.address),
        topics: log.topics.clone(),
        indexed,
        data: log.data.clone(),
        params,
        block_number: log.block_number,
        block_hash: log.block_hash.clone(),
        transaction_hash: log.transaction_hash.clone(),
        transaction_index: log.transaction_index,
        log_index: log.log_index,
        removed: log.removed,
    }))
}

fn parse_topic(topic: &str) -> Result<B256> {
    let bytes = utils::decode_hex(topic)?;
    if bytes.len() != 32 {
        return Err(Error::Decode(format!(
            "topic {topic} is {} bytes, expected 32",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

/// Value types are stored in their topic as one padded word. Dynamic and
/// composite types are stored as the keccak256 of their encoding, so only
/// the hash is reported.
fn decode_indexed(event: &EventDescriptor, topics: &[String]) -> Result<Params> {
    let inputs: Vec<_> = event.indexed_inputs().collect();
    if inputs.len() != topics.len() {
        return Err(Error::Decode(format!(
            "{} declares {} indexed parameter(s), log has {} topic(s)",
            event.signature,
            inputs.len(),
            topics.len()
        )));
    }

    let mut indexed = Params::with_capacity(inputs.len());
    for (param, topic) in inputs.into_iter().zip(topics) {
        let word = parse_topic(topic)?;
        let ty = resolved(param)?;
        let value = match ty {
            DynSolType::String
            | DynSolType::Bytes
            | DynSolType::Array(_)
            | DynSolType::FixedArray(..)
            | DynSolType::Tuple(_) => Value::String(format!("{word:#x}")),
            _ => ty
                .abi_decode(word.as_slice())
                .map(|v| to_json(&v))
                .map_err(|e| {
                    Error::Decode(format!("topic {} of {}: {}", param.name, event.signature, e))
                })?,
        };
        indexed.insert(param.name.clone(), value);
    }
    Ok(indexed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi_cache::StaticAbi;
    use alloy_dyn_abi::DynSolValue;
    use alloy_primitives::{Address, U256};
    use serde_json::json;

    const TOKEN: &str = "0x00000000000000000000000000000000000000aa";
    const TOKEN_ABI: &str = r#"[
        {"type":"event","name":"Transfer","anonymous":false,"inputs":[
            {"name":"from","type":"address","indexed":true},
            {"name":"to","type":"address","indexed":true},
            {"name":"value","type":"uint256","indexed":false}]},
        {"type":"event","name":"Tagged","anonymous":false,"inputs":[
            {"name":"tag","type":"string","indexed":true},
            {"name":"note","type":"string","indexed":false}]}
    ]"#;

    fn abi() -> ContractAbi {
        ContractAbi::from_json(TOKEN_ABI).unwrap()
    }

    fn topic0(name: &str) -> String {
        let abi = abi();
        let event = abi.events().iter().find(|e| e.name == name).unwrap();
        format!("{:#x}", event.topic0)
    }

    fn word(byte: u8) -> String {
        format!("{:#x}", B256::left_padding_from(&[byte; 20]))
    }

    fn transfer_log() -> RawLog {
        RawLog {
            address: TOKEN.to_string(),
            topics: vec![topic0("Transfer"), word(0x11), word(0x22)],
            data: format!(
                "0x{}",
                hex::encode(DynSolValue::Uint(U256::from(750u64), 256).abi_encode())
            ),
            block_number: 9,
            log_index: 2,
            transaction_hash: "0xfeed".to_string(),
            ..RawLog::default()
        }
    }

    fn logs_json(logs: &[RawLog]) -> String {
        serde_json::to_string(logs).unwrap()
    }

    fn abis() -> StaticAbi {
        StaticAbi::new().with(TOKEN, abi())
    }

    #[tokio::test]
    async fn test_empty_receipts() {
        let decoder = EventDecoder::default();
        for logs in ["", "[]", " [] ", "null"] {
            assert!(decoder.decode_receipt(&abis(), TOKEN, logs).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_transfer_event() {
        let logs = logs_json(&[transfer_log()]);
        let events = EventDecoder::default()
            .decode_receipt(&abis(), TOKEN, &logs)
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_name, "Transfer");
        assert_eq!(event.signature, "Transfer(address,address,uint256)");
        assert_eq!(
            serde_json::to_value(&event.indexed).unwrap(),
            json!({
                "from": format!("{:#x}", Address::repeat_byte(0x11)),
                "to": format!("{:#x}", Address::repeat_byte(0x22)),
            })
        );
        assert_eq!(event.params["value"], json!("750"));
        assert_eq!(event.block_number, 9);
        assert_eq!(event.log_index, 2);
        assert_eq!(event.transaction_hash, "0xfeed");
        assert_eq!(event.topics.len(), 3);
    }

    #[tokio::test]
    async fn test_indexed_string_reports_hash() {
        let hash = B256::repeat_byte(0x77);
        let log = RawLog {
            address: TOKEN.to_string(),
            topics: vec![topic0("Tagged"), format!("{hash:#x}")],
            data: format!(
                "0x{}",
                hex::encode(
                    DynSolValue::Tuple(vec![DynSolValue::String("hello".to_string())])
                        .abi_encode_params()
                )
            ),
            ..RawLog::default()
        };

        let event = decode_log(&abi(), &log).unwrap().unwrap();
        assert_eq!(event.indexed["tag"], json!(format!("{hash:#x}")));
        assert_eq!(event.params["note"], json!("hello"));
    }

    #[tokio::test]
    async fn test_unverified_emitter_is_skipped() {
        let mut foreign = transfer_log();
        foreign.address = "0x00000000000000000000000000000000000000bb".to_string();
        let logs = logs_json(&[foreign, transfer_log()]);

        let events = EventDecoder::default()
            .decode_receipt(&abis(), TOKEN, &logs)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].address, TOKEN);
    }

    #[tokio::test]
    async fn test_no_abi_yields_no_events() {
        let logs = logs_json(&[transfer_log()]);
        let events = EventDecoder::default()
            .decode_receipt(&StaticAbi::new(), TOKEN, &logs)
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_topic_is_skipped() {
        let mut log = transfer_log();
        log.topics[0] = format!("{:#x}", B256::repeat_byte(0x01));
        let events = EventDecoder::default()
            .decode_receipt(&abis(), TOKEN, &logs_json(&[log]))
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_log_by_policy() {
        let mut log = transfer_log();
        log.topics.pop();
        let logs = logs_json(&[log, transfer_log()]);

        let err = EventDecoder::new(DecodePolicy::Strict)
            .decode_receipt(&abis(), TOKEN, &logs)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(err.public_message(), "internal server error");

        let events = EventDecoder::new(DecodePolicy::BestEffort)
            .decode_receipt(&abis(), TOKEN, &logs)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_log_blob_by_policy() {
        assert!(EventDecoder::new(DecodePolicy::Strict)
            .decode_receipt(&abis(), TOKEN, "{not json")
            .await
            .is_err());
        assert!(EventDecoder::new(DecodePolicy::BestEffort)
            .decode_receipt(&abis(), TOKEN, "{not json")
            .await
            .unwrap()
            .is_empty());
    }
}
