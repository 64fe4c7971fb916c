use serde::Deserialize;

use crate::{
    authority::{normalize_service_url, requires_service_credential},
    consts::get_transaction_service_url,
    error::Result,
    service::HttpTransactionService,
};

pub const SERVICE_URL_ENV: &str = "SAFE_TX_SERVICE_URL";
pub const API_KEY_ENV: &str = "SAFE_API_KEY";

/// Where the transaction service lives for a chain, and how to authenticate against it.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub chain_id: u64,
    /// Overrides the hosted service for `chain_id`.
    #[serde(default)]
    pub tx_service_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("chain_id", &self.chain_id)
            .field("tx_service_url", &self.tx_service_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ServiceConfig {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            ..Default::default()
        }
    }

    /// Reads the URL override and API key from `SAFE_TX_SERVICE_URL` and `SAFE_API_KEY`.
    pub fn from_env(chain_id: u64) -> Self {
        Self::from_lookup(chain_id, |name| std::env::var(name).ok())
    }

    fn from_lookup(chain_id: u64, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Self {
            chain_id,
            tx_service_url: non_blank(SERVICE_URL_ENV),
            api_key: non_blank(API_KEY_ENV),
        }
    }

    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.tx_service_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Normalized base URL of the service: the override if set, otherwise the hosted
    /// service for the chain.
    pub fn service_url(&self) -> Result<String> {
        match &self.tx_service_url {
            Some(url) => normalize_service_url(url),
            None => normalize_service_url(&get_transaction_service_url(self.chain_id)?),
        }
    }

    pub fn requires_api_key(&self) -> Result<bool> {
        Ok(requires_service_credential(&self.service_url()?))
    }

    pub fn build_service(&self) -> Result<HttpTransactionService> {
        HttpTransactionService::new(&self.service_url()?, self.api_key.clone())
    }
}
