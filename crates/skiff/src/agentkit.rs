//! The configured agent instance: resolved chain, credential context,
//! service clients and the action registry. Exactly one credential variant
//! is chosen by whichever constructor ran; it never changes afterwards.

use crate::aa::SmartAccount;
use crate::account::{
    signer_from_material, AccountHandle, CredentialContext, LocalAccount, RemoteCredentials,
    ServerWallet,
};
use crate::actions::Registry;
use crate::chains::evm::EvmChain;
use crate::config::{chain_for_id, AgentConfig, ChainDef};
use crate::errors::SkiffError;
use crate::services::{
    analytics::AnalyticsClient,
    bridge::BridgeClient,
    confidential::ConfidentialClient,
    launchpad::LaunchpadClient,
    swap::{HttpSwapApi, SwapApi},
    wallet_server::HttpWalletServer,
};
use alloy::primitives::U256;
use eyre::Context as _;
use secrecy::{ExposeSecret as _, SecretString};
use std::sync::Arc;

pub struct Agentkit {
    chain: &'static ChainDef,
    evm: EvmChain,
    credentials: Option<CredentialContext>,
    registry: Registry,
    swap: Arc<dyn SwapApi>,
    bridge: BridgeClient,
    analytics: AnalyticsClient,
    launchpad: LaunchpadClient,
    confidential: ConfidentialClient,
}

impl Agentkit {
    fn build(
        config: &AgentConfig,
        credentials: Option<CredentialContext>,
    ) -> eyre::Result<Self> {
        let chain = chain_for_id(config.chain_id)?;
        let evm = EvmChain::new(chain.name, chain.chain_id, &config.rpc_url);
        Ok(Self {
            chain,
            evm,
            credentials,
            registry: Registry::assemble(),
            swap: Arc::new(HttpSwapApi::new(&config.http.swap_base_url)?),
            bridge: BridgeClient::new(&config.http.bridge_base_url)?,
            analytics: AnalyticsClient::new(
                &config.http.analytics_base_url,
                config.analytics_api_key.expose_secret(),
            )?,
            launchpad: LaunchpadClient::new(&config.http.launchpad_base_url)?,
            confidential: ConfidentialClient::new(&config.http.prover_base_url)?,
        })
    }

    /// Degraded instance with no credential context. Account-requiring
    /// actions fail with a capability error instead of running.
    pub fn read_only(config: &AgentConfig) -> eyre::Result<Self> {
        Self::build(config, None)
    }

    /// Local mode: signer from configured key material, smart-account
    /// handle built once here and reused for the process lifetime.
    pub fn with_local_signer(config: &AgentConfig) -> eyre::Result<Self> {
        let chain = chain_for_id(config.chain_id)?;
        let material = config
            .key_material
            .as_ref()
            .ok_or(SkiffError::MissingKeyMaterial)?;
        let signer = signer_from_material(material)?;
        let evm = EvmChain::new(chain.name, chain.chain_id, &config.rpc_url);
        let bundler_url = config
            .http
            .bundler_rpc_url(chain.chain_id, config.paymaster_api_key.expose_secret());
        let account = SmartAccount::new(signer, evm, bundler_url, U256::ZERO)
            .context("build smart account")?;
        Self::build(
            config,
            Some(CredentialContext::Local(LocalAccount { account })),
        )
    }

    /// API-key mode: credentials are re-verified against the wallet server
    /// on every account-requiring call.
    pub fn with_api_key(config: &AgentConfig, api_key: &str) -> eyre::Result<Self> {
        let chain = chain_for_id(config.chain_id)?;
        let ws = config
            .wallet_server
            .as_ref()
            .ok_or(SkiffError::ServerWalletNotConfigured)?;
        let authority =
            Arc::new(HttpWalletServer::new(&ws.base_url, ws.api_key.expose_secret())?);
        let bundler_url = config
            .http
            .bundler_rpc_url(chain.chain_id, config.paymaster_api_key.expose_secret());
        let creds = RemoteCredentials::new(
            SecretString::new(api_key.into()),
            authority,
            chain,
            config.rpc_url.clone(),
            bundler_url,
        )?;
        Self::build(config, Some(CredentialContext::Remote(creds)))
    }

    /// Server-wallet mode: no local signer, all wallet state lives behind
    /// the wallet service, addressed by index.
    pub fn with_server_wallet(config: &AgentConfig) -> eyre::Result<Self> {
        let ws = config
            .wallet_server
            .as_ref()
            .ok_or(SkiffError::ServerWalletNotConfigured)?;
        let directory =
            Arc::new(HttpWalletServer::new(&ws.base_url, ws.api_key.expose_secret())?);
        Self::build(
            config,
            Some(CredentialContext::ServerWallet(ServerWallet::new(
                directory,
            ))),
        )
    }

    pub fn chain(&self) -> &'static ChainDef {
        self.chain
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn swap(&self) -> &dyn SwapApi {
        self.swap.as_ref()
    }

    pub fn bridge(&self) -> &BridgeClient {
        &self.bridge
    }

    pub fn analytics(&self) -> &AnalyticsClient {
        &self.analytics
    }

    pub fn launchpad(&self) -> &LaunchpadClient {
        &self.launchpad
    }

    pub fn confidential(&self) -> &ConfidentialClient {
        &self.confidential
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn server_wallet(&self) -> Option<&ServerWallet> {
        match &self.credentials {
            Some(CredentialContext::ServerWallet(w)) => Some(w),
            Some(CredentialContext::Local(_) | CredentialContext::Remote(_)) | None => None,
        }
    }

    /// Resolve the acting account for one dispatch. API-key mode
    /// reauthorizes here, once per call; server mode honors an explicit
    /// per-call wallet index over the selected one.
    pub async fn resolve_account(
        &self,
        wallet_index: Option<u32>,
    ) -> Result<Option<AccountHandle<'_>>, SkiffError> {
        match &self.credentials {
            None => Ok(None),
            Some(CredentialContext::Local(local)) => {
                Ok(Some(AccountHandle::local(&self.evm, &local.account)))
            }
            Some(CredentialContext::Remote(remote)) => {
                let snapshot = remote.reauthorize().await?;
                Ok(Some(AccountHandle::fresh(&self.evm, snapshot)))
            }
            Some(CredentialContext::ServerWallet(wallet)) => {
                let index = wallet_index.unwrap_or_else(|| wallet.selected());
                Ok(Some(AccountHandle::server(&self.evm, wallet, index)))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn set_credentials(&mut self, credentials: CredentialContext) {
        self.credentials = Some(credentials);
    }

    #[cfg(test)]
    pub(crate) fn set_swap_api(&mut self, api: Arc<dyn SwapApi>) {
        self.swap = api;
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    use super::AgentConfig;
    use std::collections::HashMap;

    pub(crate) fn test_config(chain_id: u64) -> eyre::Result<AgentConfig> {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            (
                "SKIFF_PRIVATE_KEY",
                "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
            ),
            ("SKIFF_RPC_URL", "https://rpc.invalid.localhost"),
            ("SKIFF_PAYMASTER_API_KEY", "pm-test"),
            ("SKIFF_ANALYTICS_API_KEY", "an-test"),
        ]
        .into_iter()
        .collect();
        let chain = chain_id.to_string();
        AgentConfig::from_lookup(|k| {
            if k == "SKIFF_CHAIN_ID" {
                Some(chain.clone())
            } else {
                env.get(k).map(|v| (*v).to_owned())
            }
        })
    }
}
