//! MultiSend batch encoding.
//!
//! `multiSend(bytes transactions)` takes one ABI `bytes` argument holding the packed
//! sub-calls back to back:
//! - operation: 1 byte (0 = Call, 1 = DelegateCall)
//! - to: 20 bytes
//! - value: 32 bytes, big-endian
//! - data length: 32 bytes, big-endian
//! - data: variable length

use alloy_primitives::{hex, Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

use crate::{
    consts::get_multisend_deployment,
    error::{Result, SafeError},
    hex::{to_canonical_hex, HexMessages},
    transaction_data::{OperationType, SubCall},
};

sol! {
    interface IMultiSend {
        function multiSend(bytes memory transactions) external payable;
    }
}

const OPERATION_LEN: usize = 1;
const ADDRESS_LEN: usize = 20;
const WORD_LEN: usize = 32;

/// Decodes a `multiSend` calldata blob into its sub-calls, in order.
///
/// An empty batch is valid and yields no calls.
pub fn decode_batch(payload: &str) -> Result<Vec<SubCall>> {
    let canonical = to_canonical_hex(
        payload,
        HexMessages {
            required: "batch payload is required",
            invalid: "batch payload must be hex",
        },
    )?;
    let calldata = hex::decode(&canonical)
        .map_err(|_| SafeError::InvalidFormat(format!("batch payload must be hex: {payload}")))?;

    let body = calldata
        .strip_prefix(IMultiSend::multiSendCall::SELECTOR.as_slice())
        .ok_or_else(|| SafeError::InvalidFormat("missing batch selector".into()))?;

    let IMultiSend::multiSendCall { transactions } =
        IMultiSend::multiSendCall::abi_decode_raw(body, true)
            .map_err(|err| SafeError::InvalidFormat(format!("malformed batch payload: {err}")))?;

    decode_packed(&transactions)
}

/// Walks the packed sub-call encoding with an explicit cursor.
pub fn decode_packed(packed: &[u8]) -> Result<Vec<SubCall>> {
    let mut calls = Vec::new();
    let mut cursor = Cursor {
        bytes: packed,
        offset: 0,
    };

    while cursor.remaining() > 0 {
        let code = cursor.take(OPERATION_LEN, "operation")?[0];
        let operation = OperationType::from_u8(code)
            .ok_or_else(|| SafeError::InvalidFormat(format!("unsupported operation {code}")))?;

        let to = Address::from_slice(cursor.take(ADDRESS_LEN, "address")?);
        let value = U256::from_be_slice(cursor.take(WORD_LEN, "value")?);

        let declared = U256::from_be_slice(cursor.take(WORD_LEN, "data length")?);
        let data_len = u64::try_from(declared)
            .ok()
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| SafeError::InvalidFormat("malformed data length".into()))?;
        let data = cursor.take(data_len, "data")?;

        calls.push(SubCall {
            to,
            value: value.to_string(),
            data: hex::encode_prefixed(data),
            operation,
        });
    }

    Ok(calls)
}

/// Packs `calls` and wraps them in `multiSend` calldata.
pub fn encode_batch(calls: &[SubCall]) -> Result<String> {
    let transactions = encode_packed(calls)?;
    let calldata = IMultiSend::multiSendCall {
        transactions: transactions.into(),
    }
    .abi_encode();

    Ok(hex::encode_prefixed(calldata))
}

pub fn encode_packed(calls: &[SubCall]) -> Result<Vec<u8>> {
    let mut encoded = Vec::new();

    for call in calls {
        let value = U256::from_str_radix(&call.value, 10).map_err(|_| {
            SafeError::InvalidFormat(format!(
                "value must be an unsigned integer string: {}",
                call.value
            ))
        })?;
        let data = hex::decode(&call.data)
            .map_err(|_| SafeError::InvalidFormat(format!("data must be hex: {}", call.data)))?;

        encoded.push(call.operation.as_u8());
        encoded.extend_from_slice(call.to.as_slice());
        encoded.extend_from_slice(&value.to_be_bytes::<32>());
        encoded.extend_from_slice(&U256::from(data.len()).to_be_bytes::<32>());
        encoded.extend_from_slice(&data);
    }

    Ok(encoded)
}

/// Expands a transaction into its calls: batches sent to a known MultiSend deployment are
/// decoded, anything else is a single call.
pub fn transaction_calls(to: Address, value: U256, data: &Bytes) -> Result<Vec<SubCall>> {
    if get_multisend_deployment(to).is_some() {
        return decode_batch(&hex::encode_prefixed(data));
    }

    Ok(vec![SubCall {
        to,
        value: value.to_string(),
        data: hex::encode_prefixed(data),
        operation: OperationType::Call,
    }])
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.offset)
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(SafeError::InvalidFormat(format!(
                "truncated {field} at offset {}",
                self.offset
            )));
        }

        let bytes = self.bytes;
        let slice = &bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }
}
