//! ABI-driven decoding of call-data and logs into JSON-friendly views

use crate::{
    artifacts::ParamDescriptor,
    error::{Error, Result},
};
use alloy_dyn_abi::{DynSolType, DynSolValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod call;
mod event;

pub use call::{CallDecoder, DecodedCall, CREATE_METHOD, UNKNOWN_METHOD};
pub use event::{DecodedEvent, EventDecoder};

/// How a decoder reacts to data it cannot decode.
///
/// `BestEffort` degrades to an empty or skipped value and logs a warning;
/// `Strict` returns the error to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    BestEffort,
    Strict,
}

impl DecodePolicy {
    pub fn is_strict(self) -> bool {
        matches!(self, DecodePolicy::Strict)
    }
}

/// Decoded parameters keyed by name, in declaration order
pub type Params = IndexMap<String, Value>;

/// Decodes an ABI-encoded parameter list (call arguments or log data)
pub(crate) fn decode_params(inputs: &[&ParamDescriptor], data: &[u8]) -> Result<Params> {
    if inputs.is_empty() {
        return Ok(Params::new());
    }

    let types = inputs
        .iter()
        .map(|p| resolved(p).cloned())
        .collect::<Result<Vec<_>>>()?;

    let decoded = DynSolType::Tuple(types)
        .abi_decode_params(data)
        .map_err(|e| Error::Decode(e.to_string()))?;
    let values = match decoded {
        DynSolValue::Tuple(values) => values,
        other => vec![other],
    };

    Ok(inputs
        .iter()
        .zip(values)
        .map(|(param, value)| (param.name.clone(), to_json(&value)))
        .collect())
}

pub(crate) fn resolved(param: &ParamDescriptor) -> Result<&DynSolType> {
    param
        .resolved
        .as_ref()
        .ok_or_else(|| Error::Decode(format!("unsupported parameter type {}", param.kind)))
}

/// Converts a decoded value to JSON. Integers become decimal strings so
/// 256-bit values survive JSON consumers; byte strings and addresses are
/// lower-case 0x-hex.
pub fn to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::Address(a) => Value::String(format!("{a:#x}")),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Function(f) => Value::String(format!("0x{}", hex::encode(f.as_slice()))),
        DynSolValue::Array(values)
        | DynSolValue::FixedArray(values)
        | DynSolValue::Tuple(values) => Value::Array(values.iter().map(to_json).collect()),
        #[allow(unreachable_patterns)]
        _ => Value::Null,
    }
}
