//! Credential contexts and the per-call account handle.
//!
//! The context variant is fixed when the agent is configured and never
//! changes afterwards. Local mode builds its smart-account handle once and
//! reuses it; API-key mode rebuilds a fresh snapshot on every call so
//! credential rotation on the authority side takes effect immediately; the
//! server-wallet variant never materializes a local signer at all.

use crate::aa::{Call, SmartAccount, Submission};
use crate::chains::evm::EvmChain;
use crate::config::{ChainDef, KeyMaterial};
use crate::errors::SkiffError;
use crate::services::wallet_server::{CredentialAuthority, WalletDirectory, WalletInfo};
use alloy::primitives::{Address, U256};
use alloy::signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use eyre::Context as _;
use secrecy::{ExposeSecret as _, SecretString};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use zeroize::Zeroizing;

/// Build an EOA signer from configured key material.
pub fn signer_from_material(material: &KeyMaterial) -> eyre::Result<PrivateKeySigner> {
    match material {
        KeyMaterial::PrivateKey(pk) => signer_from_private_key_hex(pk.expose_secret()),
        KeyMaterial::Mnemonic { phrase, index } => MnemonicBuilder::<English>::default()
            .phrase(phrase.expose_secret())
            .index(*index)
            .context("mnemonic derivation index")?
            .build()
            .context("derive signer from mnemonic"),
    }
}

pub fn signer_from_private_key_hex(hex_key: &str) -> eyre::Result<PrivateKeySigner> {
    let trimmed = hex_key.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = Zeroizing::new(hex::decode(stripped).context("decode hex private key")?);
    if bytes.len() != 32 {
        eyre::bail!("private key must be 32 bytes");
    }
    PrivateKeySigner::from_slice(&bytes).context("build signer from private key")
}

/// Local mode: the smart-account handle is expensive to build and safe to
/// cache, so it is constructed exactly once at configure time.
pub struct LocalAccount {
    pub account: SmartAccount,
}

/// A freshly revalidated credential, consumed by exactly one call.
pub struct CredentialSnapshot {
    pub account: SmartAccount,
}

/// API-key mode: nothing derived from the key survives across calls.
pub struct RemoteCredentials {
    api_key: SecretString,
    authority: Arc<dyn CredentialAuthority>,
    chain: &'static ChainDef,
    rpc_url: String,
    bundler_url: String,
}

impl RemoteCredentials {
    pub fn new(
        api_key: SecretString,
        authority: Arc<dyn CredentialAuthority>,
        chain: &'static ChainDef,
        rpc_url: String,
        bundler_url: String,
    ) -> Result<Self, SkiffError> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(SkiffError::EmptyApiKey);
        }
        Ok(Self {
            api_key,
            authority,
            chain,
            rpc_url,
            bundler_url,
        })
    }

    /// Re-verify the API key and rebuild signer + account from whatever
    /// material the authority currently returns. Failure is per-call: the
    /// context stays usable and the next call revalidates again.
    pub async fn reauthorize(&self) -> Result<CredentialSnapshot, SkiffError> {
        let material = self
            .authority
            .verify(self.api_key.expose_secret())
            .await
            .map_err(|e| SkiffError::Reauthorization(format!("{e:#}")))?;
        let signer = signer_from_private_key_hex(&material.private_key_hex)
            .map_err(|e| SkiffError::Reauthorization(format!("{e:#}")))?;
        let evm = EvmChain::new(self.chain.name, self.chain.chain_id, &self.rpc_url);
        let account = SmartAccount::new(signer, evm, self.bundler_url.clone(), U256::ZERO)
            .map_err(|e| SkiffError::Reauthorization(format!("{e:#}")))?;
        Ok(CredentialSnapshot { account })
    }
}

/// Server-wallet mode: wallets live behind the wallet service, addressed by
/// index. Only the selected index is local state.
pub struct ServerWallet {
    directory: Arc<dyn WalletDirectory>,
    selected: AtomicU32,
}

impl ServerWallet {
    pub fn new(directory: Arc<dyn WalletDirectory>) -> Self {
        Self {
            directory,
            selected: AtomicU32::new(0),
        }
    }

    pub fn directory(&self) -> &dyn WalletDirectory {
        self.directory.as_ref()
    }

    pub fn selected(&self) -> u32 {
        self.selected.load(Ordering::SeqCst)
    }

    /// Switch the active wallet; returns the previously selected index.
    pub fn select(&self, index: u32) -> u32 {
        self.selected.swap(index, Ordering::SeqCst)
    }

    /// Fresh lookup of one wallet. Never cached: the service is the source
    /// of truth and wallets can be rotated out-of-band.
    pub async fn wallet_at(&self, index: u32) -> Result<WalletInfo, SkiffError> {
        let wallets = self
            .directory
            .list_wallets()
            .await
            .map_err(|e| SkiffError::Reauthorization(format!("{e:#}")))?;
        let count = wallets.len();
        wallets
            .into_iter()
            .find(|w| w.index == index)
            .ok_or(SkiffError::WalletIndexOutOfRange { index, count })
    }
}

/// Exactly one variant per configured agent instance.
pub enum CredentialContext {
    Local(LocalAccount),
    Remote(RemoteCredentials),
    ServerWallet(ServerWallet),
}

/// Everything an action needs to act on behalf of an account, resolved once
/// per dispatch.
pub struct AccountHandle<'a> {
    pub chain: &'a EvmChain,
    backend: Backend<'a>,
}

enum Backend<'a> {
    Local(&'a SmartAccount),
    Fresh(SmartAccount),
    Server { wallet: &'a ServerWallet, index: u32 },
}

/// Outcome of submitting one logical operation through whichever backend
/// the handle wraps.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    /// User-operation hash (local modes) or server transaction reference.
    pub reference: String,
    pub tx_hash: Option<String>,
    pub confirmed: bool,
}

impl From<Submission> for SubmitReceipt {
    fn from(s: Submission) -> Self {
        Self {
            reference: s.user_op_hash.to_string(),
            tx_hash: s.tx_hash.map(|h| h.to_string()),
            confirmed: s.confirmed,
        }
    }
}

impl<'a> AccountHandle<'a> {
    pub fn local(chain: &'a EvmChain, account: &'a SmartAccount) -> Self {
        Self {
            chain,
            backend: Backend::Local(account),
        }
    }

    pub fn fresh(chain: &'a EvmChain, snapshot: CredentialSnapshot) -> Self {
        Self {
            chain,
            backend: Backend::Fresh(snapshot.account),
        }
    }

    pub fn server(chain: &'a EvmChain, wallet: &'a ServerWallet, index: u32) -> Self {
        Self {
            chain,
            backend: Backend::Server { wallet, index },
        }
    }

    /// The acting account address. A fresh network read in server mode.
    pub async fn address(&self) -> eyre::Result<Address> {
        match &self.backend {
            Backend::Local(a) => Ok(a.address()),
            Backend::Fresh(a) => Ok(a.address()),
            Backend::Server { wallet, index } => {
                let info = wallet.wallet_at(*index).await?;
                EvmChain::parse_address(&info.address)
            }
        }
    }

    /// The owner EOA signer, for protocols that verify plain ECDSA. Absent
    /// in server mode, where no local key exists.
    pub fn owner_signer(&self) -> Option<&PrivateKeySigner> {
        match &self.backend {
            Backend::Local(a) => Some(a.owner_signer()),
            Backend::Fresh(a) => Some(a.owner_signer()),
            Backend::Server { .. } => None,
        }
    }

    /// Submit ordered calls. Local modes bundle them into one sponsored
    /// user operation; server mode relays them one at a time, stopping at
    /// the first failure.
    pub async fn submit(&self, calls: &[Call], wait: bool) -> eyre::Result<SubmitReceipt> {
        match &self.backend {
            Backend::Local(a) => Ok(a.execute(calls, wait).await?.into()),
            Backend::Fresh(a) => Ok(a.execute(calls, wait).await?.into()),
            Backend::Server { wallet, index } => {
                let mut last: Option<SubmitReceipt> = None;
                for call in calls {
                    let outcome = wallet
                        .directory()
                        .submit(
                            *index,
                            &call.to.to_string(),
                            &call.data.to_string(),
                            &call.value.to_string(),
                        )
                        .await?;
                    if !outcome.success {
                        let reason = outcome
                            .error
                            .unwrap_or_else(|| "server rejected the transaction".to_owned());
                        eyre::bail!("server wallet submission failed: {reason}");
                    }
                    let tx_hash = outcome.tx_hash;
                    let confirmed = if wait {
                        if let Some(h) = tx_hash.as_deref() {
                            let hash = h.parse().context("parse server tx hash")?;
                            let receipt = self
                                .chain
                                .wait_for_tx_receipt(hash, std::time::Duration::from_secs(90))
                                .await?;
                            receipt.status()
                        } else {
                            false
                        }
                    } else {
                        false
                    };
                    last = Some(SubmitReceipt {
                        reference: tx_hash.clone().unwrap_or_else(|| "submitted".to_owned()),
                        tx_hash,
                        confirmed,
                    });
                }
                last.ok_or_else(|| eyre::eyre!("no calls to submit"))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::services::wallet_server::{
        CredentialMaterial, SubmitOutcome, TxLogEntry, WalletInfo,
    };
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Counting fake: proves revalidation happens once per call.
    pub struct CountingAuthority {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl CountingAuthority {
        pub fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl CredentialAuthority for CountingAuthority {
        async fn verify(&self, _api_key: &str) -> eyre::Result<CredentialMaterial> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                eyre::bail!("key revoked");
            }
            Ok(CredentialMaterial {
                private_key_hex: Zeroizing::new(
                    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
                        .to_owned(),
                ),
            })
        }
    }

    /// Two-wallet fake directory with a scripted submission outcome.
    pub struct FakeDirectory {
        pub wallets: Vec<WalletInfo>,
        pub submissions: AtomicUsize,
    }

    impl FakeDirectory {
        pub fn with_two_wallets() -> Self {
            Self {
                wallets: vec![
                    WalletInfo {
                        index: 0,
                        address: "0x1111111111111111111111111111111111111111".into(),
                        created_at: "2025-01-01T00:00:00Z".into(),
                        updated_at: "2025-01-01T00:00:00Z".into(),
                    },
                    WalletInfo {
                        index: 1,
                        address: "0x2222222222222222222222222222222222222222".into(),
                        created_at: "2025-02-01T00:00:00Z".into(),
                        updated_at: "2025-02-01T00:00:00Z".into(),
                    },
                ],
                submissions: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WalletDirectory for FakeDirectory {
        async fn list_wallets(&self) -> eyre::Result<Vec<WalletInfo>> {
            Ok(self.wallets.clone())
        }

        async fn submit(
            &self,
            _index: u32,
            _to: &str,
            _data: &str,
            _value: &str,
        ) -> eyre::Result<SubmitOutcome> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            Ok(SubmitOutcome {
                success: true,
                tx_hash: Some(
                    "0x1111111111111111111111111111111111111111111111111111111111111111".into(),
                ),
                error: None,
            })
        }

        async fn transaction_logs(&self, index: u32) -> eyre::Result<Vec<TxLogEntry>> {
            Ok(vec![TxLogEntry {
                wallet_index: index,
                tx_hash: "0xabc".into(),
                status: "confirmed".into(),
                created_at: "2025-03-01T00:00:00Z".into(),
            }])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{CountingAuthority, FakeDirectory};
    use super::*;
    use crate::config::chain_for_id;

    fn remote(authority: Arc<dyn CredentialAuthority>) -> eyre::Result<RemoteCredentials> {
        Ok(RemoteCredentials::new(
            SecretString::new("key-123".into()),
            authority,
            chain_for_id(43114)?,
            "https://api.avax.network/ext/bc/C/rpc".to_owned(),
            "https://bundler.example/43114/key".to_owned(),
        )?)
    }

    #[tokio::test]
    async fn reauthorization_is_uncached_across_calls() -> eyre::Result<()> {
        let authority = Arc::new(CountingAuthority::new());
        let creds = remote(Arc::clone(&authority) as Arc<dyn CredentialAuthority>)?;

        let first = creds.reauthorize().await;
        assert!(first.is_ok(), "first reauthorization failed: {first:?}");
        let second = creds.reauthorize().await;
        assert!(second.is_ok(), "second reauthorization failed: {second:?}");

        assert_eq!(
            authority.calls.load(Ordering::SeqCst),
            2,
            "each call must hit the authority"
        );
        Ok(())
    }

    #[tokio::test]
    async fn reauthorization_failure_is_per_call() -> eyre::Result<()> {
        let authority = Arc::new(CountingAuthority::failing());
        let creds = remote(Arc::clone(&authority) as Arc<dyn CredentialAuthority>)?;

        let r = creds.reauthorize().await;
        assert!(r.is_err(), "expected revoked key to fail");
        // The context survives and keeps trying.
        let again = creds.reauthorize().await;
        assert!(again.is_err());
        assert_eq!(authority.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn empty_api_key_is_a_construction_error() {
        let authority: Arc<dyn CredentialAuthority> = Arc::new(CountingAuthority::new());
        let r = RemoteCredentials::new(
            SecretString::new(String::new().into()),
            authority,
            &crate::config::SUPPORTED_CHAINS[0],
            "https://rpc.example".to_owned(),
            "https://bundler.example".to_owned(),
        );
        assert!(matches!(r, Err(SkiffError::EmptyApiKey)));
    }

    #[tokio::test]
    async fn select_returns_previous_and_next_read_uses_new_index() -> eyre::Result<()> {
        let wallet = ServerWallet::new(Arc::new(FakeDirectory::with_two_wallets()));
        assert_eq!(wallet.selected(), 0);

        let previous = wallet.select(1);
        assert_eq!(previous, 0, "switch reports the prior index");

        let info = wallet.wallet_at(wallet.selected()).await?;
        assert_eq!(info.index, 1);
        assert!(info.address.starts_with("0x2222"));
        Ok(())
    }

    #[tokio::test]
    async fn wallet_at_rejects_unknown_index() {
        let wallet = ServerWallet::new(Arc::new(FakeDirectory::with_two_wallets()));
        let r = wallet.wallet_at(9).await;
        assert!(matches!(
            r,
            Err(SkiffError::WalletIndexOutOfRange { index: 9, count: 2 })
        ));
    }

    #[test]
    fn signer_from_hex_accepts_prefixed_and_bare() -> eyre::Result<()> {
        let bare = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
        let a = signer_from_private_key_hex(bare)?;
        let b = signer_from_private_key_hex(&format!("0x{bare}"))?;
        assert_eq!(a.address(), b.address());
        Ok(())
    }

    #[test]
    fn signer_from_hex_rejects_short_keys() {
        assert!(signer_from_private_key_hex("0x1234").is_err());
    }
}
