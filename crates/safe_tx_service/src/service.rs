use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    authority::{normalize_service_url, requires_service_credential},
    error::Result,
    transaction_data::{DeleteTransactionBody, ProposeTransactionBody},
    version::ApiVersion,
};

/// The transaction service endpoints used by [`crate::SafeClient`].
///
/// Responses are returned as raw JSON and validated by the caller.
#[async_trait]
pub trait TransactionService: Send + Sync {
    async fn about(&self) -> eyre::Result<Value>;

    /// Safe details, including its current `nonce`.
    async fn get_safe_info(&self, safe_address: &str) -> eyre::Result<Value>;

    async fn get_transaction(&self, api: ApiVersion, safe_tx_hash: &str) -> eyre::Result<Value>;

    async fn get_pending_transactions(
        &self,
        api: ApiVersion,
        safe_address: &str,
    ) -> eyre::Result<Value>;

    async fn propose_transaction(
        &self,
        api: ApiVersion,
        safe_address: &str,
        body: &ProposeTransactionBody,
    ) -> eyre::Result<()>;

    async fn delete_transaction(
        &self,
        api: ApiVersion,
        safe_tx_hash: &str,
        body: &DeleteTransactionBody,
    ) -> eyre::Result<()>;
}

/// [`TransactionService`] over HTTP.
#[derive(Clone)]
pub struct HttpTransactionService {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl std::fmt::Debug for HttpTransactionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransactionService")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpTransactionService {
    /// Creates a client for `service_url`, which is normalized first.
    pub fn new(service_url: &str, api_key: Option<String>) -> Result<Self> {
        let base_url = normalize_service_url(service_url)?;
        let api_key = api_key.filter(|key| !key.trim().is_empty());

        if requires_service_credential(&base_url) && api_key.is_none() {
            warn!(%base_url, "No API key configured for the hosted transaction service");
        }

        Ok(Self {
            base_url,
            api_key,
            client: Client::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%method, %url, "Transaction service request");

        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) if requires_service_credential(&self.base_url) => {
                builder.bearer_auth(key)
            }
            _ => builder,
        }
    }
}

#[async_trait]
impl TransactionService for HttpTransactionService {
    async fn about(&self) -> eyre::Result<Value> {
        let response = self.request(Method::GET, "v1/about/").send().await?;
        read_json(response, "fetch service info").await
    }

    async fn get_safe_info(&self, safe_address: &str) -> eyre::Result<Value> {
        let path = format!("v1/safes/{}/", safe_address);
        let response = self.request(Method::GET, &path).send().await?;
        read_json(response, "fetch Safe info").await
    }

    async fn get_transaction(&self, api: ApiVersion, safe_tx_hash: &str) -> eyre::Result<Value> {
        let path = format!(
            "{}/multisig-transactions/{}/",
            api.path_segment(),
            safe_tx_hash
        );
        let response = self.request(Method::GET, &path).send().await?;
        read_json(response, "fetch transaction").await
    }

    async fn get_pending_transactions(
        &self,
        api: ApiVersion,
        safe_address: &str,
    ) -> eyre::Result<Value> {
        let path = format!(
            "{}/safes/{}/multisig-transactions/?executed=false&limit=100",
            api.path_segment(),
            safe_address
        );
        let response = self.request(Method::GET, &path).send().await?;
        read_json(response, "fetch pending transactions").await
    }

    async fn propose_transaction(
        &self,
        api: ApiVersion,
        safe_address: &str,
        body: &ProposeTransactionBody,
    ) -> eyre::Result<()> {
        let path = format!(
            "{}/safes/{}/multisig-transactions/",
            api.path_segment(),
            safe_address
        );
        let response = self.request(Method::POST, &path).json(body).send().await?;
        check_status(response, "propose transaction").await
    }

    async fn delete_transaction(
        &self,
        api: ApiVersion,
        safe_tx_hash: &str,
        body: &DeleteTransactionBody,
    ) -> eyre::Result<()> {
        let path = format!(
            "{}/multisig-transactions/{}/",
            api.path_segment(),
            safe_tx_hash
        );
        let response = self.request(Method::DELETE, &path).json(body).send().await?;
        check_status(response, "delete transaction").await
    }
}

async fn check_status(response: Response, action: &str) -> eyre::Result<()> {
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        eyre::bail!("Failed to {}: {} - {}", action, status, text);
    }

    Ok(())
}

async fn read_json(response: Response, action: &str) -> eyre::Result<Value> {
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        eyre::bail!("Failed to {}: {} - {}", action, status, text);
    }

    Ok(response.json::<Value>().await?)
}
