use alloy_primitives::{address, Address};
use urls::{mainnet, sepolia};

use crate::error::{Result, SafeError};

pub mod urls {
    pub mod mainnet {
        pub const CHAIN_ID: u64 = 1;

        pub const TRANSACTION_SERVICE_URL: &str =
            "https://safe-transaction-mainnet.safe.global/api";
    }

    pub mod sepolia {
        pub const CHAIN_ID: u64 = 11155111;

        pub const TRANSACTION_SERVICE_URL: &str =
            "https://safe-transaction-sepolia.safe.global/api";
    }
}

/// Root domains of the hosted transaction service. Hosts on these domains (or any
/// sub-domain of them) expect an API key.
pub const TRUSTED_SERVICE_DOMAINS: &[&str] = &["safe.global", "5afe.dev"];

/// First service release that serves the `v2` transaction endpoints.
pub const MIN_NON_LEGACY_SERVICE_VERSION: (u64, u64, u64) = (5, 18, 0);

/// Largest integer a JSON client can represent exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// A MultiSend deployment and the Safe release it ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiSendDeployment {
    pub version: &'static str,
    pub address: Address,
    pub call_only: bool,
}

pub const MULTISEND_DEPLOYMENTS: &[MultiSendDeployment] = &[
    MultiSendDeployment {
        version: "1.3.0",
        address: address!("A238CBeb142c10Ef7Ad8442C6D1f9E89e07e7761"),
        call_only: false,
    },
    MultiSendDeployment {
        version: "1.3.0",
        address: address!("998739BFdAAdde7C933B942a68053933098f9EDa"),
        call_only: false,
    },
    MultiSendDeployment {
        version: "1.3.0",
        address: address!("40A2aCCbd92BCA938b02010E17A5b8929b49130D"),
        call_only: true,
    },
    MultiSendDeployment {
        version: "1.3.0",
        address: address!("A1dabEF33b3B82c7814B6D82A79e50F4AC44102B"),
        call_only: true,
    },
    MultiSendDeployment {
        version: "1.4.1",
        address: address!("38869bf66a61cF6bDB996A6aE40D5853Fd43B526"),
        call_only: false,
    },
    MultiSendDeployment {
        version: "1.4.1",
        address: address!("9641d764fc13c8B624c04430C7356C1C7C8102e2"),
        call_only: true,
    },
];

pub fn get_multisend_deployment(address: Address) -> Option<&'static MultiSendDeployment> {
    MULTISEND_DEPLOYMENTS.iter().find(|deployment| deployment.address == address)
}

pub fn get_transaction_service_url(chain_id: u64) -> Result<String> {
    match chain_id {
        mainnet::CHAIN_ID => Ok(mainnet::TRANSACTION_SERVICE_URL.to_string()),
        sepolia::CHAIN_ID => Ok(sepolia::TRANSACTION_SERVICE_URL.to_string()),
        _ => Err(SafeError::InvalidFormat(format!("Chain ID not supported: {chain_id}"))),
    }
}
