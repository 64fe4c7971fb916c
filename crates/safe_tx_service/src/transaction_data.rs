use std::str::FromStr;

use alloy_primitives::{hex, Address, TxHash, U256};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{
    consts::MAX_SAFE_INTEGER,
    error::{Result, SafeError},
    hex::{
        describe, parse_address, value_to_canonical_hex, HexMessages, Stringified,
        UNSTRINGIFIABLE,
    },
    utils::SafeTx,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OperationType {
    #[default]
    Call = 0,
    DelegateCall = 1,
}

impl OperationType {
    pub fn as_u8(self) -> u8 {
        match self {
            OperationType::Call => 0,
            OperationType::DelegateCall => 1,
        }
    }

    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(OperationType::Call),
            1 => Some(OperationType::DelegateCall),
            _ => None,
        }
    }
}

impl Serialize for OperationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

/// A single call, either built from user input or decoded from a MultiSend batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubCall {
    #[serde(serialize_with = "serialize_checksummed")]
    pub to: Address,
    /// Unsigned decimal string.
    pub value: String,
    /// Canonical lowercase `0x` hex.
    pub data: String,
    pub operation: OperationType,
}

/// A validated call plus the optional Safe transaction fields, which are passed through
/// exactly as supplied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeTransactionPayload {
    #[serde(flatten)]
    pub call: SubCall,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_tx_gas: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_gas: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_token: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_receiver: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Value>,
}

/// Body of the propose request. Every field is rendered in canonical form right before
/// serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeTransactionBody {
    pub to: String,
    pub value: String,
    pub data: String,
    pub operation: u8,
    pub safe_tx_gas: String,
    pub base_gas: String,
    pub gas_price: String,
    pub gas_token: String,
    pub refund_receiver: String,
    pub nonce: String,
    pub contract_transaction_hash: String,
    pub sender: String,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl ProposeTransactionBody {
    pub fn new(
        safe_tx: &SafeTx,
        safe_tx_hash: TxHash,
        sender: Address,
        signature: String,
        origin: Option<String>,
    ) -> Self {
        Self {
            to: safe_tx.to.to_checksum(None),
            value: safe_tx.value.to_string(),
            data: hex::encode_prefixed(&safe_tx.data),
            operation: safe_tx.operation,
            safe_tx_gas: safe_tx.safeTxGas.to_string(),
            base_gas: safe_tx.baseGas.to_string(),
            gas_price: safe_tx.gasPrice.to_string(),
            gas_token: safe_tx.gasToken.to_checksum(None),
            refund_receiver: safe_tx.refundReceiver.to_checksum(None),
            nonce: safe_tx.nonce.to_string(),
            contract_transaction_hash: hex::encode_prefixed(safe_tx_hash),
            sender: sender.to_checksum(None),
            signature,
            origin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTransactionBody {
    pub safe_tx_hash: String,
    pub signature: String,
}

/// Outcome of a successful proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedTransaction {
    pub safe_tx_hash: TxHash,
    pub sender: Address,
    pub signature: String,
}

/// Outcome of a best-effort cleanup of pending transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    pub deleted: Vec<TxHash>,
    /// Entries that could not be interpreted, with the reason.
    pub skipped: Vec<String>,
    pub failed: Vec<(TxHash, SafeError)>,
}

fn serialize_checksummed<S: Serializer>(
    address: &Address,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&address.to_checksum(None))
}

/// Validates a loosely typed call description and returns its canonical payload.
///
/// `to` is checksummed, `data` canonicalized and `value` defaults to `"0"`. The gas fields,
/// `gasToken`, `refundReceiver` and `nonce` are copied unchanged when present.
pub fn build_call_payload(raw: &Value) -> Result<SafeTransactionPayload> {
    let fields = extract_fields(raw)?;

    let to = parse_to(fields.get("to"))?;
    let data = value_to_canonical_hex(
        fields.get("data"),
        HexMessages {
            required: "data is required",
            invalid: "data must be hex",
        },
    )?;
    let value = parse_value(fields.get("value"))?;
    let operation = parse_operation(fields.get("operation"))?;

    let nonce = passthrough(fields, "nonce");
    if let Some(nonce) = &nonce {
        parse_nonce(nonce)?;
    }

    Ok(SafeTransactionPayload {
        call: SubCall {
            to,
            value,
            data,
            operation,
        },
        safe_tx_gas: passthrough(fields, "safeTxGas"),
        base_gas: passthrough(fields, "baseGas"),
        gas_price: passthrough(fields, "gasPrice"),
        gas_token: passthrough(fields, "gasToken"),
        refund_receiver: passthrough(fields, "refundReceiver"),
        nonce,
    })
}

impl SafeTransactionPayload {
    pub fn safe_tx_gas(&self) -> Result<U256> {
        uint_or_zero("safeTxGas", self.safe_tx_gas.as_ref())
    }

    pub fn base_gas(&self) -> Result<U256> {
        uint_or_zero("baseGas", self.base_gas.as_ref())
    }

    pub fn gas_price(&self) -> Result<U256> {
        uint_or_zero("gasPrice", self.gas_price.as_ref())
    }

    pub fn gas_token(&self) -> Result<Address> {
        address_or_zero("gasToken", self.gas_token.as_ref())
    }

    pub fn refund_receiver(&self) -> Result<Address> {
        address_or_zero("refundReceiver", self.refund_receiver.as_ref())
    }

    /// The nonce, which has no default: a transaction cannot be hashed without one.
    pub fn nonce(&self) -> Result<u64> {
        match &self.nonce {
            Some(nonce) => parse_nonce(nonce),
            None => Err(SafeError::Required("nonce is required to hash a Safe transaction".into())),
        }
    }
}

/// Reads the fields of an untrusted object. Anything that is not an object is reported as
/// `Inaccessible` before any field is validated.
pub(crate) fn extract_fields(raw: &Value) -> Result<&Map<String, Value>> {
    raw.as_object().ok_or_else(|| {
        SafeError::Inaccessible(format!("transaction payload is not an object: {}", describe(raw)))
    })
}

fn passthrough(fields: &Map<String, Value>, key: &str) -> Option<Value> {
    fields.get(key).filter(|value| !value.is_null()).cloned()
}

fn parse_to(to: Option<&Value>) -> Result<Address> {
    match to {
        None | Some(Value::Null) => Err(SafeError::Required("to is required".into())),
        Some(Value::String(s)) => parse_address(s).ok_or_else(|| {
            SafeError::InvalidFormat(format!("to must be a valid address: {s}"))
        }),
        Some(other) => Err(SafeError::InvalidFormat(format!(
            "to must be a valid address: {}",
            describe(other)
        ))),
    }
}

fn parse_value(value: Option<&Value>) -> Result<String> {
    let invalid = |shown: &str| {
        SafeError::InvalidFormat(format!("value must be an unsigned integer string: {shown}"))
    };

    let text = match Stringified::of(value) {
        Stringified::Missing => return Ok("0".to_string()),
        Stringified::Unstringifiable => return Err(invalid(UNSTRINGIFIABLE)),
        Stringified::Text(text) => text,
    };

    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(&text));
    }
    U256::from_str_radix(&text, 10).map_err(|_| invalid(&text))?;

    Ok(text)
}

fn parse_operation(operation: Option<&Value>) -> Result<OperationType> {
    let code = match operation {
        None | Some(Value::Null) => return Ok(OperationType::Call),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse::<u64>().ok(),
        Some(_) => None,
    };

    code.and_then(|code| u8::try_from(code).ok())
        .and_then(OperationType::from_u8)
        .ok_or_else(|| {
            SafeError::InvalidFormat(format!(
                "operation must be 0 (Call) or 1 (DelegateCall): {}",
                operation.map(describe).unwrap_or_default()
            ))
        })
}

pub(crate) fn parse_nonce(nonce: &Value) -> Result<u64> {
    let parsed = match nonce {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse::<u64>().ok()
        }
        _ => None,
    };

    parsed.filter(|nonce| *nonce <= MAX_SAFE_INTEGER).ok_or_else(|| {
        SafeError::InvalidFormat(format!(
            "nonce must be a non-negative integer no greater than 2^53 - 1: {}",
            describe(nonce)
        ))
    })
}

fn uint_or_zero(name: &str, value: Option<&Value>) -> Result<U256> {
    let Some(value) = value else {
        return Ok(U256::ZERO);
    };

    let parsed = match value {
        Value::Number(n) => n.as_u64().map(U256::from),
        Value::String(s) => U256::from_str(s.trim()).ok(),
        _ => None,
    };

    parsed.ok_or_else(|| {
        SafeError::InvalidFormat(format!("{name} must be an unsigned integer: {}", describe(value)))
    })
}

fn address_or_zero(name: &str, value: Option<&Value>) -> Result<Address> {
    let Some(value) = value else {
        return Ok(Address::ZERO);
    };

    value.as_str().and_then(parse_address).ok_or_else(|| {
        SafeError::InvalidFormat(format!("{name} must be a valid address: {}", describe(value)))
    })
}
