use alloy_primitives::{hex::encode_prefixed, Address, TxHash};
use semver::Version;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    hex::{describe, parse_address, to_canonical_hash, to_canonical_hex, HexMessages},
    transaction_data::{
        build_call_payload, parse_nonce, DeleteTransactionBody, ProposeTransactionBody,
    },
    utils::{
        current_totp, delete_request_typed_data, safe_tx_from_payload, safe_tx_typed_data,
        uses_legacy_domain,
    },
};

pub use crate::{
    authority::{normalize_service_url, requires_service_credential},
    config::ServiceConfig,
    error::{ErrorKind, Result, SafeError},
    multisend::{decode_batch, encode_batch, transaction_calls},
    owners::{diff_owners, OwnerChangeSet},
    service::{HttpTransactionService, TransactionService},
    signer::{LocalSafeSigner, SafeSigner},
    transaction_data::{DeletionReport, OperationType, ProposedTransaction, SubCall},
    version::{is_legacy_service, ApiVersion, ServiceVersion},
};

pub mod authority;
pub mod config;
pub mod consts;
pub mod error;
pub mod hex;
pub mod multisend;
pub mod owners;
pub mod service;
pub mod signer;
pub mod transaction_data;
pub mod utils;
pub mod version;

#[cfg(test)]
mod tests;

const TX_HASH_MESSAGE: &str = "transaction hash must be 32-byte hex";
const SIGNATURE_MESSAGES: HexMessages<'static> = HexMessages {
    required: "signature is required",
    invalid: "signature must be hex",
};

/// Proposes and deletes Safe transactions through a transaction service.
///
/// Every value coming from the caller, the signer or the service is validated and
/// canonicalized before it is hashed, signed or sent.
pub struct SafeClient<S = HttpTransactionService> {
    chain_id: u64,
    service: S,
    legacy_domain: bool,
    origin: Option<String>,
}

impl SafeClient {
    /// Client for the hosted service of `chain_id`, honouring `SAFE_TX_SERVICE_URL` and
    /// `SAFE_API_KEY`.
    pub fn new(chain_id: u64) -> Result<Self> {
        Self::from_config(&ServiceConfig::from_env(chain_id))
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Ok(Self::with_service(config.chain_id, config.build_service()?))
    }
}

impl<S: TransactionService> SafeClient<S> {
    pub fn with_service(chain_id: u64, service: S) -> Self {
        Self {
            chain_id,
            service,
            legacy_domain: false,
            origin: None,
        }
    }

    /// Selects the EIP-712 domain matching the Safe contract version.
    pub fn with_safe_version(mut self, safe_version: &Version) -> Self {
        self.legacy_domain = uses_legacy_domain(safe_version);
        self
    }

    /// Free-form `origin` attached to proposals.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn service_version(&self) -> Result<ServiceVersion> {
        let about = self
            .service
            .about()
            .await
            .map_err(|err| SafeError::remote("failed to fetch service info", err))?;

        let version = ServiceVersion::parse_value(about.get("version").unwrap_or(&Value::Null))?;
        debug!(%version, legacy = version.is_legacy(), "Resolved transaction service version");

        Ok(version)
    }

    async fn api_version(&self) -> Result<ApiVersion> {
        Ok(ApiVersion::for_service(&self.service_version().await?))
    }

    /// Next free nonce of the Safe: one past its highest pending nonce, or its current
    /// on-chain nonce when nothing newer is queued.
    pub async fn next_nonce(&self, safe_address: &str) -> Result<u64> {
        let safe = parse_safe_address(safe_address)?;
        let api = self.api_version().await?;

        self.resolve_next_nonce(api, safe).await
    }

    async fn resolve_next_nonce(&self, api: ApiVersion, safe: Address) -> Result<u64> {
        let safe_address = safe.to_checksum(None);

        let info = self
            .service
            .get_safe_info(&safe_address)
            .await
            .map_err(|err| SafeError::remote("failed to fetch Safe info", err))?;
        let current = match info.get("nonce") {
            None | Some(Value::Null) => {
                return Err(SafeError::Required(format!(
                    "Safe info has no nonce: {}",
                    describe(&info)
                )))
            }
            Some(nonce) => parse_nonce(nonce)?,
        };

        let pending = self
            .service
            .get_pending_transactions(api, &safe_address)
            .await
            .map_err(|err| SafeError::remote("failed to fetch pending transactions", err))?;
        let highest_pending = pending_entries(&pending)?
            .iter()
            .filter_map(|entry| entry.get("nonce"))
            .filter_map(|nonce| parse_nonce(nonce).ok())
            .max();

        let next = match highest_pending {
            Some(highest) if highest >= current => highest + 1,
            _ => current,
        };
        debug!(safe = %safe, current, next, "Resolved next Safe nonce");

        Ok(next)
    }

    /// Hashes, signs and submits a transaction described by `raw_call`.
    ///
    /// The call is validated before the signer is involved; the hash, signature and signer
    /// address returned by `signer` are validated before anything is sent. A call without a
    /// `nonce` takes the next free nonce of the Safe.
    pub async fn propose_transaction(
        &self,
        safe_address: &str,
        raw_call: &Value,
        signer: &dyn SafeSigner,
    ) -> Result<ProposedTransaction> {
        let safe = parse_safe_address(safe_address)?;
        let mut payload = build_call_payload(raw_call)?;

        let mut api = None;
        if payload.nonce.is_none() {
            let resolved = self.api_version().await?;
            let nonce = self.resolve_next_nonce(resolved, safe).await?;
            payload.nonce = Some(Value::from(nonce));
            api = Some(resolved);
        }

        let safe_tx = safe_tx_from_payload(&payload)?;
        let typed_data = safe_tx_typed_data(self.chain_id, safe, &safe_tx, self.legacy_domain);

        let hash = signer
            .transaction_hash(&typed_data)
            .await
            .map_err(|err| SafeError::remote("failed to compute transaction hash", err))?;
        let safe_tx_hash = to_canonical_hash(&hash, TX_HASH_MESSAGE)?;

        let signature = signer
            .sign_typed_data(&typed_data)
            .await
            .map_err(|err| SafeError::remote("failed to sign transaction", err))?;
        let signature = to_canonical_hex(&signature, SIGNATURE_MESSAGES)?;

        let sender = resolve_signer_address(signer).await?;

        let api = match api {
            Some(api) => api,
            None => self.api_version().await?,
        };
        let body = ProposeTransactionBody::new(
            &safe_tx,
            safe_tx_hash,
            sender,
            signature.clone(),
            self.origin.clone(),
        );

        info!(
            safe = %safe,
            %safe_tx_hash,
            %sender,
            nonce = %safe_tx.nonce,
            "Proposing transaction"
        );
        self.service
            .propose_transaction(api, &safe.to_checksum(None), &body)
            .await
            .map_err(|err| SafeError::remote("failed to propose transaction", err))?;

        Ok(ProposedTransaction {
            safe_tx_hash,
            sender,
            signature,
        })
    }

    /// Deletes one pending transaction. Only its proposer may do so; any failure aborts.
    pub async fn delete_pending_transaction(
        &self,
        safe_address: &str,
        safe_tx_hash: &str,
        signer: &dyn SafeSigner,
    ) -> Result<TxHash> {
        let safe = parse_safe_address(safe_address)?;
        let safe_tx_hash = to_canonical_hash(safe_tx_hash, TX_HASH_MESSAGE)?;

        let api = self.api_version().await?;
        let details = self.fetch_transaction_details(api, safe_tx_hash).await?;
        self.delete_with_details(api, safe, safe_tx_hash, &details, signer).await?;

        Ok(safe_tx_hash)
    }

    /// Deletes every pending transaction of the Safe that `signer` proposed, as far as
    /// possible.
    ///
    /// Only an unreadable pending list fails the call. Entries that cannot be interpreted
    /// are skipped and entries that cannot be deleted are collected in the report.
    pub async fn delete_all_pending_transactions(
        &self,
        safe_address: &str,
        signer: &dyn SafeSigner,
    ) -> Result<DeletionReport> {
        let safe = parse_safe_address(safe_address)?;
        let api = self.api_version().await?;

        let pending = self
            .service
            .get_pending_transactions(api, &safe.to_checksum(None))
            .await
            .map_err(|err| SafeError::remote("failed to fetch pending transactions", err))?;
        let entries = pending_entries(&pending)?;

        let mut report = DeletionReport::default();
        for (index, entry) in entries.iter().enumerate() {
            let Some(safe_tx_hash) = entry_hash(entry) else {
                warn!(index, entry = %describe(entry), "Skipping malformed pending transaction");
                report.skipped.push(format!("entry {index}: no valid safeTxHash"));
                continue;
            };

            let details = match self.fetch_transaction_details(api, safe_tx_hash).await {
                Ok(details) => details,
                Err(err) => {
                    warn!(%safe_tx_hash, %err, "Skipping pending transaction without details");
                    report.skipped.push(format!("entry {index}: {err}"));
                    continue;
                }
            };

            match self.delete_with_details(api, safe, safe_tx_hash, &details, signer).await {
                Ok(()) => report.deleted.push(safe_tx_hash),
                Err(err) => {
                    warn!(%safe_tx_hash, %err, "Failed to delete pending transaction");
                    report.failed.push((safe_tx_hash, err));
                }
            }
        }

        info!(
            safe = %safe,
            deleted = report.deleted.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Finished deleting pending transactions"
        );

        Ok(report)
    }

    async fn fetch_transaction_details(
        &self,
        api: ApiVersion,
        safe_tx_hash: TxHash,
    ) -> Result<Value> {
        let details = self
            .service
            .get_transaction(api, &encode_prefixed(safe_tx_hash))
            .await
            .map_err(|err| SafeError::remote("failed to fetch transaction", err))?;

        match details.is_object() {
            true => Ok(details),
            false => Err(SafeError::Inaccessible(format!(
                "transaction details are not an object: {}",
                describe(&details)
            ))),
        }
    }

    async fn delete_with_details(
        &self,
        api: ApiVersion,
        safe: Address,
        safe_tx_hash: TxHash,
        details: &Value,
        signer: &dyn SafeSigner,
    ) -> Result<()> {
        let proposer = match details.get("proposer") {
            None | Some(Value::Null) => {
                return Err(SafeError::Required(format!(
                    "proposer is required to delete transaction {safe_tx_hash}"
                )))
            }
            Some(raw) => raw.as_str().and_then(parse_address).ok_or_else(|| {
                SafeError::InvalidFormat(format!(
                    "proposer must be a valid address: {}",
                    describe(raw)
                ))
            })?,
        };

        if let Some(raw) = details.get("safe").filter(|raw| !raw.is_null()) {
            let owner = raw.as_str().and_then(parse_address).ok_or_else(|| {
                SafeError::InvalidFormat(format!("safe must be a valid address: {}", describe(raw)))
            })?;
            if owner != safe {
                return Err(SafeError::Unauthorized(format!(
                    "transaction {safe_tx_hash} belongs to Safe {owner}, not {safe}"
                )));
            }
        }

        let sender = resolve_signer_address(signer).await?;
        if sender != proposer {
            return Err(SafeError::Unauthorized(format!(
                "only the proposer {proposer} can delete transaction {safe_tx_hash}, \
                 signer is {sender}"
            )));
        }

        let typed_data =
            delete_request_typed_data(self.chain_id, safe, safe_tx_hash, current_totp());
        let signature = signer
            .sign_typed_data(&typed_data)
            .await
            .map_err(|err| SafeError::remote("failed to sign delete request", err))?;
        let signature = to_canonical_hex(&signature, SIGNATURE_MESSAGES)?;

        let hash = encode_prefixed(safe_tx_hash);
        let body = DeleteTransactionBody {
            safe_tx_hash: hash.clone(),
            signature,
        };

        info!(safe = %safe, %safe_tx_hash, "Deleting pending transaction");
        self.service
            .delete_transaction(api, &hash, &body)
            .await
            .map_err(|err| SafeError::remote("failed to delete transaction", err))
    }
}

fn parse_safe_address(safe_address: &str) -> Result<Address> {
    if safe_address.trim().is_empty() {
        return Err(SafeError::Required("safe address is required".into()));
    }

    parse_address(safe_address).ok_or_else(|| {
        SafeError::InvalidFormat(format!("safe address must be a valid address: {safe_address}"))
    })
}

async fn resolve_signer_address(signer: &dyn SafeSigner) -> Result<Address> {
    let address = signer
        .address()
        .await
        .map_err(|err| SafeError::remote("failed to resolve signer address", err))?;

    parse_address(&address).ok_or_else(|| {
        SafeError::InvalidFormat(format!("signer address must be a valid address: {address}"))
    })
}

/// The service answers with either a bare list or a paginated `{"results": [...]}` page.
fn pending_entries(pending: &Value) -> Result<&[Value]> {
    let entries = match pending {
        Value::Object(page) => page.get("results").and_then(Value::as_array),
        other => other.as_array(),
    };

    entries.map(Vec::as_slice).ok_or_else(|| {
        SafeError::Inaccessible(format!(
            "pending transactions are not a list: {}",
            describe(pending)
        ))
    })
}

fn entry_hash(entry: &Value) -> Option<TxHash> {
    let hash = entry.as_object()?.get("safeTxHash")?.as_str()?;
    to_canonical_hash(hash, TX_HASH_MESSAGE).ok()
}
