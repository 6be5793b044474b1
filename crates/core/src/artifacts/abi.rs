//! Parsed contract interface: methods by selector, events by topic-0

use crate::error::{Error, Result};
use alloy_dyn_abi::{DynSolType, Specifier};
use alloy_json_abi::{Event, Function, JsonAbi, Param};
use alloy_primitives::B256;
use std::collections::HashMap;

/// One method or event parameter
#[derive(Debug, Clone)]
pub struct ParamDescriptor {
    /// Declared name, or `arg<i>` when the ABI leaves it empty
    pub name: String,
    /// Canonical type as it appears in signatures, e.g. `(address,uint256)[]`
    pub kind: String,
    /// Event parameters only
    pub indexed: bool,
    /// `None` when the type cannot be resolved; decoding such a parameter fails
    pub resolved: Option<DynSolType>,
}

#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub signature: String,
    pub selector: [u8; 4],
    pub inputs: Vec<ParamDescriptor>,
}

#[derive(Debug, Clone)]
pub struct EventDescriptor {
    pub name: String,
    pub signature: String,
    pub topic0: B256,
    pub inputs: Vec<ParamDescriptor>,
}

impl MethodDescriptor {
    fn from_function(function: &Function) -> Self {
        Self {
            name: function.name.clone(),
            signature: function.signature(),
            selector: function.selector().0,
            inputs: params(&function.inputs),
        }
    }

    pub fn selector_hex(&self) -> String {
        format!("0x{}", hex::encode(self.selector))
    }
}

impl EventDescriptor {
    fn from_event(event: &Event) -> Self {
        let inputs = event
            .inputs
            .iter()
            .enumerate()
            .map(|(i, p)| ParamDescriptor {
                name: param_name(&p.name, i),
                kind: p.selector_type().into_owned(),
                indexed: p.indexed,
                resolved: p.resolve().ok(),
            })
            .collect();

        Self {
            name: event.name.clone(),
            signature: event.signature(),
            topic0: event.selector(),
            inputs,
        }
    }

    pub fn indexed_inputs(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.inputs.iter().filter(|p| p.indexed)
    }

    pub fn data_inputs(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.inputs.iter().filter(|p| !p.indexed)
    }
}

fn param_name(name: &str, index: usize) -> String {
    if name.is_empty() {
        format!("arg{index}")
    } else {
        name.to_string()
    }
}

fn params(inputs: &[Param]) -> Vec<ParamDescriptor> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, p)| ParamDescriptor {
            name: param_name(&p.name, i),
            kind: p.selector_type().into_owned(),
            indexed: false,
            resolved: p.resolve().ok(),
        })
        .collect()
}

/// Queryable interface of one verified contract. Immutable once built.
/// Methods and events are ordered by name, then declaration order.
#[derive(Debug, Clone)]
pub struct ContractAbi {
    methods: Vec<MethodDescriptor>,
    events: Vec<EventDescriptor>,
    by_selector: HashMap<[u8; 4], usize>,
    by_topic: HashMap<B256, usize>,
}

impl ContractAbi {
    /// Parses an ABI JSON document (the array form emitted by compilers)
    pub fn from_json(json: &str) -> Result<Self> {
        let abi: JsonAbi = serde_json::from_str(json)
            .map_err(|e| Error::MalformedOutput(format!("invalid ABI JSON: {e}")))?;
        Ok(Self::from_abi(&abi))
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let abi: JsonAbi = serde_json::from_value(value.clone())
            .map_err(|e| Error::MalformedOutput(format!("invalid ABI JSON: {e}")))?;
        Ok(Self::from_abi(&abi))
    }

    pub fn from_abi(abi: &JsonAbi) -> Self {
        let methods: Vec<_> = abi.functions().map(MethodDescriptor::from_function).collect();
        // Anonymous events have no topic-0 and cannot be dispatched
        let events: Vec<_> = abi
            .events()
            .filter(|e| !e.anonymous)
            .map(EventDescriptor::from_event)
            .collect();

        let mut by_selector = HashMap::with_capacity(methods.len());
        for (i, method) in methods.iter().enumerate() {
            by_selector.entry(method.selector).or_insert(i);
        }
        let mut by_topic = HashMap::with_capacity(events.len());
        for (i, event) in events.iter().enumerate() {
            by_topic.entry(event.topic0).or_insert(i);
        }

        Self {
            methods,
            events,
            by_selector,
            by_topic,
        }
    }

    pub fn method(&self, selector: [u8; 4]) -> Option<&MethodDescriptor> {
        self.by_selector.get(&selector).map(|&i| &self.methods[i])
    }

    pub fn event(&self, topic0: &B256) -> Option<&EventDescriptor> {
        self.by_topic.get(topic0).map(|&i| &self.events[i])
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn events(&self) -> &[EventDescriptor] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha3::{Digest, Keccak256};

    const ERC20_ABI: &str = r#"[
        {"type": "constructor", "inputs": [{"name": "supply", "type": "uint256"}], "stateMutability": "nonpayable"},
        {"type": "function", "name": "transfer", "stateMutability": "nonpayable",
         "inputs": [{"name": "to", "type": "address"}, {"name": "amount", "type": "uint256"}],
         "outputs": [{"name": "", "type": "bool"}]},
        {"type": "function", "name": "approve", "stateMutability": "nonpayable",
         "inputs": [{"name": "spender", "type": "address"}, {"name": "", "type": "uint256"}],
         "outputs": [{"name": "", "type": "bool"}]},
        {"type": "function", "name": "batch", "stateMutability": "nonpayable",
         "inputs": [{"name": "items", "type": "tuple[]", "components": [
            {"name": "to", "type": "address"}, {"name": "amount", "type": "uint256"}]}],
         "outputs": []},
        {"type": "event", "name": "Transfer", "anonymous": false, "inputs": [
            {"name": "from", "type": "address", "indexed": true},
            {"name": "to", "type": "address", "indexed": true},
            {"name": "value", "type": "uint256", "indexed": false}]},
        {"type": "event", "name": "Debug", "anonymous": true, "inputs": [
            {"name": "note", "type": "string", "indexed": false}]}
    ]"#;

    fn keccak(s: &str) -> Vec<u8> {
        Keccak256::digest(s.as_bytes()).to_vec()
    }

    #[test]
    fn test_method_signatures() {
        let abi = ContractAbi::from_json(ERC20_ABI).unwrap();
        let signatures: Vec<_> = abi.methods().iter().map(|m| m.signature.as_str()).collect();
        insta::assert_snapshot!(signatures.join("\n"), @r"
        approve(address,uint256)
        batch((address,uint256)[])
        transfer(address,uint256)
        ");
    }

    #[test]
    fn test_selector_lookup() {
        let abi = ContractAbi::from_json(ERC20_ABI).unwrap();
        let method = abi.method([0xa9, 0x05, 0x9c, 0xbb]).unwrap();
        assert_eq!(method.name, "transfer");
        assert_eq!(method.selector_hex(), "0xa9059cbb");
        assert_eq!(&keccak("transfer(address,uint256)")[..4], &method.selector);

        assert!(abi.method([0xde, 0xad, 0xbe, 0xef]).is_none());
    }

    #[test]
    fn test_unnamed_params_are_positional() {
        let abi = ContractAbi::from_json(ERC20_ABI).unwrap();
        let approve = abi.method([0x09, 0x5e, 0xa7, 0xb3]).unwrap();
        let names: Vec<_> = approve.inputs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["spender", "arg1"]);
    }

    #[test]
    fn test_event_lookup_skips_anonymous() {
        let abi = ContractAbi::from_json(ERC20_ABI).unwrap();
        assert_eq!(abi.events().len(), 1);

        let topic = B256::from_slice(&keccak("Transfer(address,address,uint256)"));
        let event = abi.event(&topic).unwrap();
        assert_eq!(event.signature, "Transfer(address,address,uint256)");
        assert_eq!(event.indexed_inputs().count(), 2);
        assert_eq!(event.data_inputs().next().unwrap().name, "value");
    }

    #[test]
    fn test_invalid_abi_json() {
        let err = ContractAbi::from_json(r#"{"not": "an abi"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedOutput(_)));
    }
}
