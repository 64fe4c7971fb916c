use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use alloy_dyn_abi::TypedData;
use alloy_primitives::{address, Address, B256};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::*;
use crate::transaction_data::{DeleteTransactionBody, ProposeTransactionBody};

// anvil accounts #0 and #1
const OWNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const OWNER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
const OTHER: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");

const SAFE: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
const SAFE_CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    About,
    GetSafeInfo(String),
    GetTransaction(ApiVersion, String),
    GetPending(ApiVersion, String),
    Propose(ApiVersion, String, ProposeTransactionBody),
    Delete(ApiVersion, String, DeleteTransactionBody),
}

struct FakeService {
    about: Value,
    safe_info: Value,
    transactions: HashMap<String, Value>,
    pending: Value,
    rejected_deletes: HashSet<String>,
    calls: Mutex<Vec<Call>>,
}

impl FakeService {
    fn new(version: &str) -> Self {
        Self {
            about: json!({ "name": "Safe Transaction Service", "version": version }),
            safe_info: json!({ "address": SAFE_CHECKSUMMED, "nonce": 0, "threshold": 1 }),
            transactions: HashMap::new(),
            pending: json!({ "count": 0, "results": [] }),
            rejected_deletes: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_transaction(mut self, hash: &str, details: Value) -> Self {
        self.transactions.insert(hash.to_string(), details);
        self
    }

    fn with_safe_info(mut self, safe_info: Value) -> Self {
        self.safe_info = safe_info;
        self
    }

    fn with_pending(mut self, pending: Value) -> Self {
        self.pending = pending;
        self
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn deletes(&self) -> Vec<(String, DeleteTransactionBody)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete(_, hash, body) => Some((hash, body)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TransactionService for FakeService {
    async fn about(&self) -> eyre::Result<Value> {
        self.record(Call::About);
        Ok(self.about.clone())
    }

    async fn get_safe_info(&self, safe_address: &str) -> eyre::Result<Value> {
        self.record(Call::GetSafeInfo(safe_address.to_string()));
        Ok(self.safe_info.clone())
    }

    async fn get_transaction(&self, api: ApiVersion, safe_tx_hash: &str) -> eyre::Result<Value> {
        self.record(Call::GetTransaction(api, safe_tx_hash.to_string()));
        match self.transactions.get(safe_tx_hash) {
            Some(details) => Ok(details.clone()),
            None => eyre::bail!("Failed to fetch transaction: 404 Not Found - "),
        }
    }

    async fn get_pending_transactions(
        &self,
        api: ApiVersion,
        safe_address: &str,
    ) -> eyre::Result<Value> {
        self.record(Call::GetPending(api, safe_address.to_string()));
        Ok(self.pending.clone())
    }

    async fn propose_transaction(
        &self,
        api: ApiVersion,
        safe_address: &str,
        body: &ProposeTransactionBody,
    ) -> eyre::Result<()> {
        self.record(Call::Propose(api, safe_address.to_string(), body.clone()));
        Ok(())
    }

    async fn delete_transaction(
        &self,
        api: ApiVersion,
        safe_tx_hash: &str,
        body: &DeleteTransactionBody,
    ) -> eyre::Result<()> {
        self.record(Call::Delete(api, safe_tx_hash.to_string(), body.clone()));
        if self.rejected_deletes.contains(safe_tx_hash) {
            eyre::bail!("Failed to delete transaction: 400 Bad Request - ");
        }
        Ok(())
    }
}

/// Delegates to a real signer but returns a fixed transaction hash.
struct FixedHashSigner {
    inner: LocalSafeSigner,
    hash: &'static str,
}

#[async_trait]
impl SafeSigner for FixedHashSigner {
    async fn transaction_hash(&self, _safe_tx: &TypedData) -> eyre::Result<String> {
        Ok(self.hash.to_string())
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> eyre::Result<String> {
        self.inner.sign_typed_data(typed_data).await
    }

    async fn address(&self) -> eyre::Result<String> {
        self.inner.address().await
    }
}

fn owner() -> LocalSafeSigner {
    LocalSafeSigner::from_private_key(OWNER_KEY).unwrap()
}

fn hash(byte: &str) -> String {
    format!("0x{}", byte.repeat(32))
}

fn client(service: FakeService) -> SafeClient<FakeService> {
    SafeClient::with_service(11155111, service)
}

fn expected_hash(raw_call: &Value) -> B256 {
    let payload = build_call_payload(raw_call).unwrap();
    let safe_tx = safe_tx_from_payload(&payload).unwrap();
    let safe = parse_address(SAFE).unwrap();

    safe_tx_typed_data(11155111, safe, &safe_tx, false).eip712_signing_hash().unwrap()
}

fn call() -> Value {
    json!({
        "to": "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
        "data": "0xA9059CBB",
        "value": "1000",
        "nonce": 7,
    })
}

#[tokio::test]
async fn proposes_canonical_transaction() {
    let client = client(FakeService::new("5.18.0")).with_origin("safe-cli");
    let signer = owner();

    let proposed = client.propose_transaction(SAFE, &call(), &signer).await.unwrap();
    assert_eq!(proposed.sender, OWNER);

    let calls = client.service().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], Call::About);

    let Call::Propose(api, safe, body) = &calls[1] else {
        panic!("expected a proposal, got {:?}", calls[1]);
    };
    assert_eq!(*api, ApiVersion::V2);
    assert_eq!(safe, SAFE_CHECKSUMMED);
    assert_eq!(body.to, "0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    assert_eq!(body.data, "0xa9059cbb");
    assert_eq!(body.value, "1000");
    assert_eq!(body.operation, 0);
    assert_eq!(body.safe_tx_gas, "0");
    assert_eq!(body.gas_token, Address::ZERO.to_checksum(None));
    assert_eq!(body.nonce, "7");
    assert_eq!(body.sender, OWNER.to_checksum(None));
    assert_eq!(
        body.contract_transaction_hash,
        alloy_primitives::hex::encode_prefixed(proposed.safe_tx_hash)
    );
    assert_eq!(body.signature, proposed.signature);
    assert_eq!(body.origin.as_deref(), Some("safe-cli"));

    assert_eq!(proposed.safe_tx_hash, expected_hash(&call()));
}

#[tokio::test]
async fn missing_nonce_follows_the_pending_queue() {
    let service = FakeService::new("5.18.0")
        .with_safe_info(json!({ "address": SAFE_CHECKSUMMED, "nonce": 5, "threshold": 2 }))
        .with_pending(json!({
            "count": 4,
            "results": [{ "nonce": 6 }, { "nonce": "7" }, "junk", { "nonce": -1 }],
        }));
    let client = client(service);
    let raw_call = json!({ "to": OTHER.to_string(), "data": "0xa9059cbb" });

    let proposed = client.propose_transaction(SAFE, &raw_call, &owner()).await.unwrap();

    let calls = client.service().calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(
        calls[..3],
        [
            Call::About,
            Call::GetSafeInfo(SAFE_CHECKSUMMED.to_string()),
            Call::GetPending(ApiVersion::V2, SAFE_CHECKSUMMED.to_string()),
        ]
    );
    let Call::Propose(ApiVersion::V2, _, body) = &calls[3] else {
        panic!("expected a v2 proposal, got {:?}", calls[3]);
    };
    assert_eq!(body.nonce, "8");

    let mut with_nonce = raw_call.clone();
    with_nonce["nonce"] = json!(8);
    assert_eq!(proposed.safe_tx_hash, expected_hash(&with_nonce));
}

#[tokio::test]
async fn missing_nonce_without_queue_uses_safe_nonce() {
    let service = FakeService::new("5.17.0")
        .with_safe_info(json!({ "nonce": "12" }))
        .with_pending(json!({ "count": 1, "results": [{ "nonce": 3 }] }));
    let client = client(service);

    assert_eq!(client.next_nonce(SAFE).await.unwrap(), 12);

    let raw_call = json!({ "to": OTHER.to_string(), "data": "0x00" });
    client.propose_transaction(SAFE, &raw_call, &owner()).await.unwrap();

    let calls = client.service().calls();
    let Some(Call::Propose(ApiVersion::V1, _, body)) = calls.last() else {
        panic!("expected a v1 proposal, got {:?}", calls.last());
    };
    assert_eq!(body.nonce, "12");
}

#[tokio::test]
async fn missing_nonce_requires_a_readable_safe_nonce() {
    let client = client(FakeService::new("5.18.0").with_safe_info(json!({ "nonce": "soon" })));
    let raw_call = json!({ "to": OTHER.to_string(), "data": "0x00" });

    let err = client.propose_transaction(SAFE, &raw_call, &owner()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    assert!(!client.service().calls().iter().any(|call| matches!(call, Call::Propose(..))));
}

#[tokio::test]
async fn legacy_service_uses_v1_endpoints() {
    let client = client(FakeService::new("v5.17.2"));

    client.propose_transaction(SAFE, &call(), &owner()).await.unwrap();

    assert!(matches!(client.service().calls()[1], Call::Propose(ApiVersion::V1, _, _)));
}

#[tokio::test]
async fn rejects_malformed_transaction_hash() {
    let client = client(FakeService::new("5.18.0"));
    let signer = FixedHashSigner {
        inner: owner(),
        hash: "0x1234",
    };

    let err = client.propose_transaction(SAFE, &call(), &signer).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    assert_eq!(err.to_string(), "transaction hash must be 32-byte hex: 0x1234");
    assert!(client.service().calls().is_empty());
}

#[tokio::test]
async fn invalid_input_fails_before_any_request() {
    let client = client(FakeService::new("5.18.0"));

    let raw_call = json!({ "to": "0x1234", "data": "0x00", "nonce": 1 });
    let err = client.propose_transaction(SAFE, &raw_call, &owner()).await.unwrap_err();
    assert_eq!(err.to_string(), "to must be a valid address: 0x1234");

    let err = client.propose_transaction("not-a-safe", &call(), &owner()).await.unwrap_err();
    assert_eq!(err.to_string(), "safe address must be a valid address: not-a-safe");

    let err = client.propose_transaction(SAFE, &json!({ "to": SAFE }), &owner()).await.unwrap_err();
    assert_eq!(err.to_string(), "data is required");

    assert!(client.service().calls().is_empty());
}

#[tokio::test]
async fn reports_unusable_service_version() {
    let client = client(FakeService::new("latest"));

    let err = client.propose_transaction(SAFE, &call(), &owner()).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid Safe API version: latest");
    assert_eq!(client.service().calls(), vec![Call::About]);
}

#[tokio::test]
async fn proposer_deletes_pending_transaction() {
    let target = hash("ab");
    let service = FakeService::new("5.18.0").with_transaction(
        &target,
        json!({ "safe": SAFE_CHECKSUMMED, "proposer": OWNER.to_string().to_lowercase() }),
    );
    let client = client(service);

    let deleted = client
        .delete_pending_transaction(SAFE, &target.to_uppercase().replace("0X", "0x"), &owner())
        .await
        .unwrap();
    assert_eq!(deleted, target.parse::<B256>().unwrap());

    let deletes = client.service().deletes();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].0, target);
    assert_eq!(deletes[0].1.safe_tx_hash, target);
    assert_eq!(deletes[0].1.signature.len(), 2 + 130);
}

#[tokio::test]
async fn only_the_proposer_may_delete() {
    let target = hash("cd");
    let service = FakeService::new("5.18.0")
        .with_transaction(&target, json!({ "safe": SAFE, "proposer": OTHER.to_string() }));
    let client = client(service);

    let err = client.delete_pending_transaction(SAFE, &target, &owner()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(client.service().deletes().is_empty());
}

#[tokio::test]
async fn refuses_transactions_of_another_safe() {
    let target = hash("cd");
    let details = json!({ "safe": OTHER.to_string(), "proposer": OWNER.to_string() });
    let service = FakeService::new("5.18.0").with_transaction(&target, details);
    let client = client(service);

    let err = client.delete_pending_transaction(SAFE, &target, &owner()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(client.service().deletes().is_empty());
}

#[tokio::test]
async fn single_delete_fails_fast() {
    let client = client(FakeService::new("5.18.0"));

    let err = client.delete_pending_transaction(SAFE, "0xabc", &owner()).await.unwrap_err();
    assert_eq!(err.to_string(), "transaction hash must be 32-byte hex: 0xabc");
    assert!(client.service().calls().is_empty());

    let err = client.delete_pending_transaction(SAFE, &hash("ef"), &owner()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemoteFailure);
    assert!(err.to_string().starts_with("failed to fetch transaction: "));

    let target = hash("12");
    let client = self::client(FakeService::new("5.18.0").with_transaction(&target, json!("gone")));
    let err = client.delete_pending_transaction(SAFE, &target, &owner()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inaccessible);
    assert_eq!(err.to_string(), "transaction details are not an object: gone");
}

#[tokio::test]
async fn delete_all_continues_past_bad_entries() {
    let mine = json!({ "safe": SAFE, "proposer": OWNER.to_string() });
    let theirs = json!({ "safe": SAFE, "proposer": OTHER.to_string() });

    let mut service = FakeService::new("5.18.0")
        .with_transaction(&hash("01"), mine.clone())
        .with_transaction(&hash("03"), theirs)
        .with_transaction(&hash("04"), mine.clone())
        .with_transaction(&hash("05"), mine)
        .with_pending(json!({
            "count": 8,
            "results": [
                "not an object",
                { "nonce": 1 },
                { "safeTxHash": "0x12" },
                { "safeTxHash": hash("01") },
                { "safeTxHash": hash("02") },
                { "safeTxHash": hash("03") },
                { "safeTxHash": hash("04") },
                { "safeTxHash": hash("05") },
            ],
        }));
    service.rejected_deletes.insert(hash("04"));
    let client = client(service);

    let report = client.delete_all_pending_transactions(SAFE, &owner()).await.unwrap();

    let parse = |h: &str| h.parse::<B256>().unwrap();
    assert_eq!(report.deleted, vec![parse(&hash("01")), parse(&hash("05"))]);
    assert_eq!(report.skipped.len(), 4);
    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.failed[0].0, parse(&hash("03")));
    assert_eq!(report.failed[0].1.kind(), ErrorKind::Unauthorized);
    assert_eq!(report.failed[1].0, parse(&hash("04")));
    assert_eq!(report.failed[1].1.kind(), ErrorKind::RemoteFailure);

    let deleted: Vec<String> = client.service().deletes().into_iter().map(|(h, _)| h).collect();
    assert_eq!(deleted, vec![hash("01"), hash("04"), hash("05")]);
    assert_eq!(
        client.service().calls()[1],
        Call::GetPending(ApiVersion::V2, SAFE_CHECKSUMMED.to_string())
    );
}

#[tokio::test]
async fn delete_all_accepts_bare_lists_and_rejects_others() {
    let client = client(FakeService::new("5.18.0").with_pending(json!([])));
    let report = client.delete_all_pending_transactions(SAFE, &owner()).await.unwrap();
    assert_eq!(report, DeletionReport::default());

    let client = self::client(FakeService::new("5.18.0").with_pending(json!({ "results": 3 })));
    let err = client.delete_all_pending_transactions(SAFE, &owner()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inaccessible);
    assert_eq!(err.to_string(), "pending transactions are not a list: <unstringifiable>");
}
