//! Client for the remote wallet service: index-addressed wallets, relayed
//! transaction submission, submission logs, and API-key verification for
//! the revalidate-on-every-call credential mode.

use async_trait::async_trait;
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zeroize::Zeroizing;

const WALLET_SERVER_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletInfo {
    pub index: u32,
    pub address: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub success: bool,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxLogEntry {
    pub wallet_index: u32,
    pub tx_hash: String,
    pub status: String,
    pub created_at: String,
}

/// The wallet service surface consumed by server-wallet mode. Every method
/// is a fresh HTTP round trip; nothing here is cached.
#[async_trait]
pub trait WalletDirectory: Send + Sync {
    async fn list_wallets(&self) -> eyre::Result<Vec<WalletInfo>>;
    async fn submit(
        &self,
        index: u32,
        to: &str,
        data: &str,
        value: &str,
    ) -> eyre::Result<SubmitOutcome>;
    async fn transaction_logs(&self, index: u32) -> eyre::Result<Vec<TxLogEntry>>;
}

/// Signing-key material returned by the credential authority. Wrapped so it
/// is wiped on drop; consumed immediately to build a per-call signer.
pub struct CredentialMaterial {
    pub private_key_hex: Zeroizing<String>,
}

/// Verifies an API key and returns whatever credential material the
/// authority currently holds for it. Called once per externally observable
/// operation in API-key mode; implementations must not cache.
#[async_trait]
pub trait CredentialAuthority: Send + Sync {
    async fn verify(&self, api_key: &str) -> eyre::Result<CredentialMaterial>;
}

#[derive(Debug, Clone)]
pub struct HttpWalletServer {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpWalletServer {
    pub fn new(base_url: &str, api_key: &str) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(WALLET_SERVER_TIMEOUT)
            .build()
            .context("build wallet server http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn get_json(&self, path: &str) -> eyre::Result<serde_json::Value> {
        let resp = self
            .client
            .get(self.url(path))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .with_context(|| format!("wallet server GET {path}"))?;
        let status = resp.status();
        if !status.is_success() {
            eyre::bail!("wallet server http {status} for {path}");
        }
        resp.json()
            .await
            .with_context(|| format!("decode wallet server response for {path}"))
    }
}

#[async_trait]
impl WalletDirectory for HttpWalletServer {
    async fn list_wallets(&self) -> eyre::Result<Vec<WalletInfo>> {
        let v = self.get_json("v1/wallets").await?;
        let wallets = v
            .get("wallets")
            .cloned()
            .unwrap_or(serde_json::Value::Array(vec![]));
        serde_json::from_value(wallets).context("decode wallet list")
    }

    async fn submit(
        &self,
        index: u32,
        to: &str,
        data: &str,
        value: &str,
    ) -> eyre::Result<SubmitOutcome> {
        let body = serde_json::json!({
            "wallet_index": index,
            "to": to,
            "data": data,
            "value": value,
        });
        let resp = self
            .client
            .post(self.url("v1/transactions"))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("wallet server submit")?;
        let status = resp.status();
        if !status.is_success() {
            eyre::bail!("wallet server http {status} for transaction submit");
        }
        resp.json().await.context("decode submit outcome")
    }

    async fn transaction_logs(&self, index: u32) -> eyre::Result<Vec<TxLogEntry>> {
        let v = self
            .get_json(&format!("v1/wallets/{index}/transactions"))
            .await?;
        let logs = v
            .get("transactions")
            .cloned()
            .unwrap_or(serde_json::Value::Array(vec![]));
        serde_json::from_value(logs).context("decode transaction logs")
    }
}

#[async_trait]
impl CredentialAuthority for HttpWalletServer {
    async fn verify(&self, api_key: &str) -> eyre::Result<CredentialMaterial> {
        let resp = self
            .client
            .post(self.url("v1/credentials/verify"))
            .header("x-api-key", api_key)
            .send()
            .await
            .context("credential verification request")?;
        let status = resp.status();
        if !status.is_success() {
            eyre::bail!("credential authority rejected the API key (http {status})");
        }
        let v: serde_json::Value = resp.json().await.context("decode credential material")?;
        let key = v
            .get("private_key")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| eyre::eyre!("credential material missing private_key"))?;
        Ok(CredentialMaterial {
            private_key_hex: Zeroizing::new(key.to_owned()),
        })
    }
}
