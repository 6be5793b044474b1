use super::{decode_params, DecodePolicy, Params};
use crate::{
    abi_cache::AbiSource,
    artifacts::ContractAbi,
    error::{Error, Result},
};
use serde::{Deserialize, Serialize};

/// Method name reported for contract-creation transactions
pub const CREATE_METHOD: &str = "create";
/// Method name reported when the selector cannot be dispatched
pub const UNKNOWN_METHOD: &str = "unknown";

/// Decoded view of one transaction's call-data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedCall {
    pub method_name: String,
    pub signature: String,
    pub params: Params,
}

impl DecodedCall {
    fn named(method_name: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            ..Self::default()
        }
    }
}

/// Dispatches call-data to a method by its 4-byte selector
#[derive(Debug, Clone, Copy)]
pub struct CallDecoder {
    policy: DecodePolicy,
}

impl Default for CallDecoder {
    fn default() -> Self {
        Self::new(DecodePolicy::BestEffort)
    }
}

impl CallDecoder {
    pub fn new(policy: DecodePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    /// Decodes the input of a transaction sent to `to`. A transaction without
    /// recipient, or with empty input, is a creation.
    pub async fn decode(
        &self,
        abis: &dyn AbiSource,
        to: Option<&str>,
        input: &[u8],
    ) -> Result<DecodedCall> {
        let Some(to) = to else {
            return Ok(DecodedCall::named(CREATE_METHOD));
        };
        if input.is_empty() {
            return Ok(DecodedCall::named(CREATE_METHOD));
        }
        if input.len() < 4 {
            return Ok(DecodedCall::named(UNKNOWN_METHOD));
        }

        let abi = match abis.resolve(to).await {
            Ok(abi) => abi,
            Err(e) if !self.policy.is_strict() => {
                tracing::warn!("Could not resolve ABI of {}, decoding without it: {}", to, e);
                None
            }
            Err(e) => return Err(e),
        };
        self.decode_with(abi.as_deref(), input)
    }

    /// Decodes `input` against a known interface, or none
    pub fn decode_with(&self, abi: Option<&ContractAbi>, input: &[u8]) -> Result<DecodedCall> {
        if input.is_empty() {
            return Ok(DecodedCall::named(CREATE_METHOD));
        }
        let Some(selector) = input.get(..4) else {
            return Ok(DecodedCall::named(UNKNOWN_METHOD));
        };
        let mut key = [0u8; 4];
        key.copy_from_slice(selector);

        // unverified contracts still show which function was called
        let Some(abi) = abi else {
            return Ok(DecodedCall::named(format!("0x{}", hex::encode(key))));
        };
        let Some(method) = abi.method(key) else {
            return Ok(DecodedCall::named(UNKNOWN_METHOD));
        };

        let inputs: Vec<_> = method.inputs.iter().collect();
        match decode_params(&inputs, &input[4..]) {
            Ok(params) => Ok(DecodedCall {
                method_name: method.name.clone(),
                signature: method.signature.clone(),
                params,
            }),
            Err(e) if self.policy.is_strict() => Err(Error::Decode(format!(
                "arguments of {}: {}",
                method.signature, e
            ))),
            Err(e) => {
                tracing::warn!("Malformed arguments for {}: {}", method.signature, e);
                Ok(DecodedCall::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi_cache::StaticAbi;
    use alloy_dyn_abi::DynSolValue;
    use alloy_primitives::{Address, U256};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    const TOKEN: &str = "0x00000000000000000000000000000000000000aa";
    const TOKEN_ABI: &str = r#"[
        {"type":"function","name":"transfer","stateMutability":"nonpayable",
         "inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],
         "outputs":[{"name":"","type":"bool"}]},
        {"type":"function","name":"setNote","stateMutability":"nonpayable",
         "inputs":[{"name":"","type":"string"}],"outputs":[]}
    ]"#;

    fn abis() -> StaticAbi {
        StaticAbi::new().with(TOKEN, ContractAbi::from_json(TOKEN_ABI).unwrap())
    }

    fn transfer_input() -> Vec<u8> {
        let mut input = vec![0xa9, 0x05, 0x9c, 0xbb];
        input.extend(
            DynSolValue::Tuple(vec![
                DynSolValue::Address(Address::repeat_byte(0x22)),
                DynSolValue::Uint(U256::from(5u64), 256),
            ])
            .abi_encode_params(),
        );
        input
    }

    struct FailingAbis;

    #[async_trait]
    impl AbiSource for FailingAbis {
        async fn resolve(&self, _address: &str) -> Result<Option<Arc<ContractAbi>>> {
            Err(Error::MalformedOutput("corrupt".to_string()))
        }
    }

    #[tokio::test]
    async fn test_creation() {
        let decoder = CallDecoder::default();
        let call = decoder.decode(&abis(), None, &transfer_input()).await.unwrap();
        assert_eq!(call.method_name, CREATE_METHOD);

        let call = decoder.decode(&abis(), Some(TOKEN), &[]).await.unwrap();
        assert_eq!(call.method_name, CREATE_METHOD);
        assert!(call.params.is_empty());
    }

    #[tokio::test]
    async fn test_short_input_is_unknown() {
        let call = CallDecoder::default()
            .decode(&abis(), Some(TOKEN), &[0xa9, 0x05, 0x9c])
            .await
            .unwrap();
        assert_eq!(call.method_name, UNKNOWN_METHOD);
    }

    #[tokio::test]
    async fn test_known_method() {
        let call = CallDecoder::default()
            .decode(&abis(), Some(TOKEN), &transfer_input())
            .await
            .unwrap();
        assert_eq!(call.method_name, "transfer");
        assert_eq!(call.signature, "transfer(address,uint256)");
        assert_eq!(
            serde_json::to_value(&call.params).unwrap(),
            json!({"to": "0x2222222222222222222222222222222222222222", "amount": "5"})
        );
    }

    #[test]
    fn test_unnamed_params_get_positional_names() {
        let mut input = vec![0u8; 4];
        let abi = ContractAbi::from_json(TOKEN_ABI).unwrap();
        let method = abi.methods().iter().find(|m| m.name == "setNote").unwrap();
        input.copy_from_slice(&method.selector);
        input.extend(
            DynSolValue::Tuple(vec![DynSolValue::String("gm".to_string())]).abi_encode_params(),
        );

        let call = CallDecoder::default().decode_with(Some(&abi), &input).unwrap();
        assert_eq!(call.params["arg0"], json!("gm"));
    }

    #[tokio::test]
    async fn test_unverified_contract_reports_selector() {
        let other = "0x00000000000000000000000000000000000000bb";
        let call = CallDecoder::default()
            .decode(&abis(), Some(other), &transfer_input())
            .await
            .unwrap();
        assert_eq!(call.method_name, "0xa9059cbb");
        assert!(call.signature.is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_selector_is_unknown() {
        let call = CallDecoder::default()
            .decode(&abis(), Some(TOKEN), &[0xde, 0xad, 0xbe, 0xef, 0x00])
            .await
            .unwrap();
        assert_eq!(call.method_name, UNKNOWN_METHOD);
    }

    #[tokio::test]
    async fn test_malformed_arguments_by_policy() {
        let mut input = transfer_input();
        input.truncate(4 + 40);

        let lenient = CallDecoder::new(DecodePolicy::BestEffort)
            .decode(&abis(), Some(TOKEN), &input)
            .await
            .unwrap();
        assert_eq!(lenient, DecodedCall::default());

        let err = CallDecoder::new(DecodePolicy::Strict)
            .decode(&abis(), Some(TOKEN), &input)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn test_resolver_failure_by_policy() {
        let call = CallDecoder::default()
            .decode(&FailingAbis, Some(TOKEN), &transfer_input())
            .await
            .unwrap();
        assert_eq!(call.method_name, "0xa9059cbb");

        assert!(CallDecoder::new(DecodePolicy::Strict)
            .decode(&FailingAbis, Some(TOKEN), &transfer_input())
            .await
            .is_err());
    }
}
