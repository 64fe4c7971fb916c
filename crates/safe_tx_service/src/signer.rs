use alloy_dyn_abi::TypedData;
use alloy_primitives::hex;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;

/// Hashes and signs Safe transactions on behalf of an owner.
///
/// Every value is returned as an untyped string: callers treat the output as untrusted and
/// re-validate it before it is used in a request.
#[async_trait]
pub trait SafeSigner: Send + Sync {
    /// EIP-712 hash of a `SafeTx`, as hex.
    async fn transaction_hash(&self, safe_tx: &TypedData) -> eyre::Result<String>;

    /// Signature over typed data, as hex.
    async fn sign_typed_data(&self, typed_data: &TypedData) -> eyre::Result<String>;

    /// Address of the signing owner.
    async fn address(&self) -> eyre::Result<String>;
}

/// Signs with a private key held in memory.
#[derive(Debug, Clone)]
pub struct LocalSafeSigner {
    signer: PrivateKeySigner,
}

impl LocalSafeSigner {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn from_private_key(private_key: &str) -> eyre::Result<Self> {
        let signer: PrivateKeySigner = private_key.trim().parse()?;
        Ok(Self::new(signer))
    }

    pub fn inner(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

#[async_trait]
impl SafeSigner for LocalSafeSigner {
    async fn transaction_hash(&self, safe_tx: &TypedData) -> eyre::Result<String> {
        let hash = safe_tx.eip712_signing_hash()?;
        Ok(hex::encode_prefixed(hash))
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> eyre::Result<String> {
        let signature = self.signer.sign_dynamic_typed_data(typed_data).await?;
        Ok(hex::encode_prefixed(signature.as_bytes()))
    }

    async fn address(&self) -> eyre::Result<String> {
        Ok(self.signer.address().to_checksum(None))
    }
}
