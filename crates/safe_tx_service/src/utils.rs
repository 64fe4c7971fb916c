use std::borrow::Cow;

use alloy_dyn_abi::TypedData;
use alloy_primitives::{hex, Address, Bytes, B256, U256};
use alloy_sol_types::{sol, Eip712Domain};
use semver::Version;

use crate::{
    error::{Result, SafeError},
    transaction_data::SafeTransactionPayload,
};

sol! {
    #[derive(Debug, PartialEq, Eq, serde::Serialize)]
    struct SafeTx {
        address to;
        uint256 value;
        bytes data;
        uint8 operation;
        uint256 safeTxGas;
        uint256 baseGas;
        uint256 gasPrice;
        address gasToken;
        address refundReceiver;
        uint256 nonce;
    }

    #[derive(Debug, PartialEq, Eq, serde::Serialize)]
    struct DeleteRequest {
        bytes32 safeTxHash;
        uint256 totp;
    }
}

const DELETE_DOMAIN_NAME: &str = "Safe Transaction Service";
const DELETE_DOMAIN_VERSION: &str = "1.0";

/// Safes before v1.3.0 hash without `chainId` in the domain.
pub fn uses_legacy_domain(safe_version: &Version) -> bool {
    *safe_version < Version::new(1, 3, 0)
}

pub fn safe_tx_domain(chain_id: u64, safe: Address, legacy_domain: bool) -> Eip712Domain {
    let chain_id = match legacy_domain {
        true => None,
        false => Some(U256::from(chain_id)),
    };

    Eip712Domain::new(None, None, chain_id, Some(safe), None)
}

/// Resolves a payload into the struct that is hashed and signed. Absent gas fields are zero
/// and absent token/receiver fields are the zero address; the nonce is required.
pub fn safe_tx_from_payload(payload: &SafeTransactionPayload) -> Result<SafeTx> {
    let call = &payload.call;

    let value = U256::from_str_radix(&call.value, 10).map_err(|_| {
        SafeError::InvalidFormat(format!(
            "value must be an unsigned integer string: {}",
            call.value
        ))
    })?;
    let data = hex::decode(&call.data)
        .map_err(|_| SafeError::InvalidFormat(format!("data must be hex: {}", call.data)))?;

    Ok(SafeTx {
        to: call.to,
        value,
        data: Bytes::from(data),
        operation: call.operation.as_u8(),
        safeTxGas: payload.safe_tx_gas()?,
        baseGas: payload.base_gas()?,
        gasPrice: payload.gas_price()?,
        gasToken: payload.gas_token()?,
        refundReceiver: payload.refund_receiver()?,
        nonce: U256::from(payload.nonce()?),
    })
}

pub fn safe_tx_typed_data(
    chain_id: u64,
    safe: Address,
    safe_tx: &SafeTx,
    legacy_domain: bool,
) -> TypedData {
    TypedData::from_struct(safe_tx, Some(safe_tx_domain(chain_id, safe, legacy_domain)))
}

/// The message the service expects before it drops a pending transaction.
pub fn delete_request_typed_data(
    chain_id: u64,
    safe: Address,
    safe_tx_hash: B256,
    totp: u64,
) -> TypedData {
    let domain = Eip712Domain::new(
        Some(Cow::Borrowed(DELETE_DOMAIN_NAME)),
        Some(Cow::Borrowed(DELETE_DOMAIN_VERSION)),
        Some(U256::from(chain_id)),
        Some(safe),
        None,
    );
    let request = DeleteRequest {
        safeTxHash: safe_tx_hash,
        totp: U256::from(totp),
    };

    TypedData::from_struct(&request, Some(domain))
}

/// Hour-granular time step the service accepts for delete requests.
pub fn current_totp() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp() / 3600).unwrap_or_default()
}
