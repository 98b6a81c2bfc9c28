use crate::errors::SkiffError;
use alloy::primitives::{address, b256, Address, B256};
use secrecy::SecretString;

/// Default chain when `SKIFF_CHAIN_ID` is unset: Avalanche C-Chain.
pub const DEFAULT_CHAIN_ID: u64 = 43114;

/// ERC-4337 v0.6 entry point, deployed at the same address on every
/// supported chain.
pub const ENTRY_POINT: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// Batch-auction settlement contract (same address on every supported chain).
pub const SETTLEMENT: Address = address!("9008D19f58AAbD9eD0D60971565AA8510560ab41");

/// Vault relayer that pulls sell tokens on settlement; ERC-20 approvals for
/// swaps must target this, never the settlement contract itself.
pub const VAULT_RELAYER: Address = address!("C92E8bdf79f0507f65a392b0ab4667716BFE0110");

/// Smart-account factory used for counterfactual deployment.
pub const ACCOUNT_FACTORY: Address = address!("000000a56aaca3e9a4c479ea6b6cd0dbcb6634f5");

/// keccak256 of the account proxy creation code, used to predict addresses
/// offline via CREATE2.
pub const ACCOUNT_PROXY_INIT_CODE_HASH: B256 =
    b256!("21fbf0696d5e0aa2ef41a2b4ffb623bcaf070edd5fe5c3dac25565531c1a2f8f");

/// A single supported chain. The table below is the authority: building a
/// credential context for a chain id not listed here is a construction-time
/// error, never a deferred runtime failure.
#[derive(Debug, Clone, Copy)]
pub struct ChainDef {
    pub name: &'static str,
    pub chain_id: u64,
    pub native_symbol: &'static str,
    pub native_decimals: u32,
    /// Meme-token launchpad factory, where the launch service operates.
    pub launchpad_factory: Option<Address>,
    /// Encrypted-balance token contract, where deployed.
    pub confidential_token: Option<Address>,
}

pub const SUPPORTED_CHAINS: &[ChainDef] = &[
    ChainDef {
        name: "ethereum",
        chain_id: 1,
        native_symbol: "ETH",
        native_decimals: 18,
        launchpad_factory: None,
        confidential_token: None,
    },
    ChainDef {
        name: "base",
        chain_id: 8453,
        native_symbol: "ETH",
        native_decimals: 18,
        launchpad_factory: Some(address!("8341b1b2b1f8a0b0e0ed43d9b386a9a14c1877f4")),
        confidential_token: None,
    },
    ChainDef {
        name: "polygon",
        chain_id: 137,
        native_symbol: "POL",
        native_decimals: 18,
        launchpad_factory: None,
        confidential_token: None,
    },
    ChainDef {
        name: "bnb",
        chain_id: 56,
        native_symbol: "BNB",
        native_decimals: 18,
        launchpad_factory: Some(address!("5c952063c7fc8610ffdb798152d69f0b9550762b")),
        confidential_token: None,
    },
    ChainDef {
        name: "arbitrum",
        chain_id: 42161,
        native_symbol: "ETH",
        native_decimals: 18,
        launchpad_factory: None,
        confidential_token: None,
    },
    ChainDef {
        name: "avalanche",
        chain_id: 43114,
        native_symbol: "AVAX",
        native_decimals: 18,
        launchpad_factory: None,
        confidential_token: Some(address!("b9f2f45a9a6e03a7c7a8f4e5c2b6d7e8f9a0b1c2")),
    },
    ChainDef {
        name: "avalanche-fuji",
        chain_id: 43113,
        native_symbol: "AVAX",
        native_decimals: 18,
        launchpad_factory: None,
        confidential_token: Some(address!("0de6a0f8aac6cfc0ce5e5b8a9e4f3d2c1b0a9f8e")),
    },
];

pub fn chain_for_id(chain_id: u64) -> Result<&'static ChainDef, SkiffError> {
    SUPPORTED_CHAINS
        .iter()
        .find(|c| c.chain_id == chain_id)
        .ok_or(SkiffError::UnsupportedChain(chain_id))
}

pub fn chain_for_name(name: &str) -> Option<&'static ChainDef> {
    let n = name.trim().to_lowercase();
    SUPPORTED_CHAINS.iter().find(|c| c.name == n)
}

/// Base URLs for the third-party HTTP surfaces actions call into.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Batch-auction DEX order book API. Quote, order placement, status and
    /// cancellation all live under this root.
    pub swap_base_url: String,
    /// Cross-chain bridge order-creation API.
    pub bridge_base_url: String,
    /// Token-analytics GraphQL endpoint.
    pub analytics_base_url: String,
    /// Meme-token launch service.
    pub launchpad_base_url: String,
    /// Proof service for encrypted-balance transfers.
    pub prover_base_url: String,
    /// ERC-4337 bundler/paymaster host. The per-chain RPC path is derived
    /// from this plus the chain id and API key.
    pub bundler_base_url: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            swap_base_url: "https://api.cow.fi".into(),
            bridge_base_url: "https://dln.debridge.finance/v1.0".into(),
            analytics_base_url: "https://graph.codex.io/graphql".into(),
            launchpad_base_url: "https://four.meme/meme-api".into(),
            prover_base_url: "https://prover.skiff.sh".into(),
            bundler_base_url: "https://bundler.skiff.sh/api/v2".into(),
        }
    }
}

impl HttpConfig {
    pub fn bundler_rpc_url(&self, chain_id: u64, api_key: &str) -> String {
        format!(
            "{}/{chain_id}/{api_key}",
            self.bundler_base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: Option<String>,
}

/// Local signing key material. Either a raw private key or a mnemonic plus
/// derivation index.
pub enum KeyMaterial {
    PrivateKey(SecretString),
    Mnemonic { phrase: SecretString, index: u32 },
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrivateKey(_) => f.write_str("KeyMaterial::PrivateKey(..)"),
            Self::Mnemonic { index, .. } => {
                write!(f, "KeyMaterial::Mnemonic {{ index: {index}, .. }}")
            }
        }
    }
}

#[derive(Debug)]
pub struct WalletServerConfig {
    pub base_url: String,
    pub api_key: SecretString,
}

#[derive(Debug)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    pub key_material: Option<KeyMaterial>,
    pub rpc_url: String,
    pub paymaster_api_key: SecretString,
    pub chain_id: u64,
    pub analytics_api_key: SecretString,
    pub wallet_server: Option<WalletServerConfig>,
    pub http: HttpConfig,
}

/// Required variables, echoed as placeholders when startup fails.
const REQUIRED_ENV: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "your_llm_api_key"),
    ("SKIFF_PRIVATE_KEY", "0xyour_signing_private_key"),
    ("SKIFF_RPC_URL", "https://your-rpc-endpoint"),
    ("SKIFF_PAYMASTER_API_KEY", "your_bundler_paymaster_api_key"),
    ("SKIFF_ANALYTICS_API_KEY", "your_token_analytics_api_key"),
];

impl AgentConfig {
    pub fn from_env() -> eyre::Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary variable source. Missing required variables
    /// are reported together, as placeholder lines ready to paste into a
    /// `.env` file.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> eyre::Result<Self> {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let mut missing: Vec<&(&str, &str)> = Vec::new();
        for req in REQUIRED_ENV {
            if get(req.0).is_none() {
                // A mnemonic satisfies the signing-key requirement.
                if req.0 == "SKIFF_PRIVATE_KEY" && get("SKIFF_MNEMONIC").is_some() {
                    continue;
                }
                missing.push(req);
            }
        }
        if !missing.is_empty() {
            let lines: Vec<String> = missing
                .iter()
                .map(|(k, placeholder)| format!("{k}={placeholder}"))
                .collect();
            eyre::bail!(
                "required environment variables are missing. Add them to your .env:\n\n{}",
                lines.join("\n")
            );
        }

        let chain_id = match get("SKIFF_CHAIN_ID") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|_| eyre::eyre!("SKIFF_CHAIN_ID is not a number: {v}"))?,
            None => {
                tracing::warn!(
                    default = DEFAULT_CHAIN_ID,
                    "SKIFF_CHAIN_ID not set; defaulting to Avalanche C-Chain"
                );
                DEFAULT_CHAIN_ID
            }
        };

        let key_material = if let Some(pk) = get("SKIFF_PRIVATE_KEY") {
            Some(KeyMaterial::PrivateKey(SecretString::new(pk.into())))
        } else {
            get("SKIFF_MNEMONIC").map(|phrase| KeyMaterial::Mnemonic {
                phrase: SecretString::new(phrase.into()),
                index: get("SKIFF_MNEMONIC_INDEX")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
            })
        };

        let wallet_server = match (get("SKIFF_WALLET_SERVER_URL"), get("SKIFF_WALLET_SERVER_API_KEY"))
        {
            (Some(base_url), Some(api_key)) => Some(WalletServerConfig {
                base_url,
                api_key: SecretString::new(api_key.into()),
            }),
            _ => None,
        };

        let mut http = HttpConfig::default();
        if let Some(u) = get("SKIFF_SWAP_API_URL") {
            http.swap_base_url = u;
        }
        if let Some(u) = get("SKIFF_BRIDGE_API_URL") {
            http.bridge_base_url = u;
        }
        if let Some(u) = get("SKIFF_BUNDLER_URL") {
            http.bundler_base_url = u;
        }

        Ok(Self {
            llm: LlmConfig {
                api_key: SecretString::new(
                    get("OPENAI_API_KEY").unwrap_or_default().into(),
                ),
                model: get("SKIFF_LLM_MODEL").unwrap_or_else(|| "gpt-4o".to_owned()),
                base_url: get("SKIFF_LLM_BASE_URL"),
            },
            key_material,
            rpc_url: get("SKIFF_RPC_URL").unwrap_or_default(),
            paymaster_api_key: SecretString::new(
                get("SKIFF_PAYMASTER_API_KEY").unwrap_or_default().into(),
            ),
            chain_id,
            analytics_api_key: SecretString::new(
                get("SKIFF_ANALYTICS_API_KEY").unwrap_or_default().into(),
            ),
            wallet_server,
            http,
        })
    }

    /// Report which required variables a lookup source provides, without
    /// exposing any values. Used by `doctor`.
    pub fn env_report(lookup: impl Fn(&str) -> Option<String>) -> Vec<(&'static str, bool)> {
        let mut out: Vec<(&'static str, bool)> = REQUIRED_ENV
            .iter()
            .map(|(k, _)| (*k, lookup(k).is_some_and(|v| !v.trim().is_empty())))
            .collect();
        out.push((
            "SKIFF_CHAIN_ID",
            lookup("SKIFF_CHAIN_ID").is_some_and(|v| !v.trim().is_empty()),
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn full_env() -> HashMap<String, String> {
        vars(&[
            ("OPENAI_API_KEY", "sk-test"),
            (
                "SKIFF_PRIVATE_KEY",
                "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
            ),
            ("SKIFF_RPC_URL", "https://api.avax.network/ext/bc/C/rpc"),
            ("SKIFF_PAYMASTER_API_KEY", "pm-test"),
            ("SKIFF_CHAIN_ID", "43114"),
            ("SKIFF_ANALYTICS_API_KEY", "an-test"),
        ])
    }

    #[test]
    fn chain_lookup_rejects_unknown_id_by_name() {
        let err = chain_for_id(99_999).err();
        assert!(err.is_some(), "expected unsupported chain error");
        if let Some(e) = err {
            assert!(e.to_string().contains("99999"), "error should name the id");
        }
    }

    #[test]
    fn chain_lookup_finds_avalanche() -> eyre::Result<()> {
        let c = chain_for_id(43114)?;
        assert_eq!(c.name, "avalanche");
        assert_eq!(c.native_symbol, "AVAX");
        Ok(())
    }

    #[test]
    fn missing_required_vars_are_echoed_as_placeholders() {
        let env = vars(&[("OPENAI_API_KEY", "sk-test")]);
        let err = AgentConfig::from_lookup(|k| env.get(k).cloned()).err();
        assert!(err.is_some(), "expected missing-variable error");
        if let Some(e) = err {
            let msg = e.to_string();
            assert!(msg.contains("SKIFF_PRIVATE_KEY=0x"));
            assert!(msg.contains("SKIFF_RPC_URL=https://"));
            assert!(!msg.contains("OPENAI_API_KEY="), "present vars not listed");
        }
    }

    #[test]
    fn mnemonic_satisfies_signing_key_requirement() -> eyre::Result<()> {
        let mut env = full_env();
        env.remove("SKIFF_PRIVATE_KEY");
        env.insert(
            "SKIFF_MNEMONIC".into(),
            "test test test test test test test test test test test junk".into(),
        );
        let cfg = AgentConfig::from_lookup(|k| env.get(k).cloned())?;
        assert!(matches!(
            cfg.key_material,
            Some(KeyMaterial::Mnemonic { index: 0, .. })
        ));
        Ok(())
    }

    #[test]
    fn missing_chain_id_defaults_to_avalanche() -> eyre::Result<()> {
        let mut env = full_env();
        env.remove("SKIFF_CHAIN_ID");
        let cfg = AgentConfig::from_lookup(|k| env.get(k).cloned())?;
        assert_eq!(cfg.chain_id, DEFAULT_CHAIN_ID);
        Ok(())
    }

    #[test]
    fn malformed_chain_id_is_fatal() {
        let mut env = full_env();
        env.insert("SKIFF_CHAIN_ID".into(), "fuji".into());
        let err = AgentConfig::from_lookup(|k| env.get(k).cloned()).err();
        assert!(err.is_some(), "expected parse failure");
    }

    #[test]
    fn supported_chain_names_are_unique() {
        let mut seen = std::collections::BTreeSet::new();
        for c in SUPPORTED_CHAINS {
            assert!(seen.insert(c.chain_id), "duplicate chain id {}", c.chain_id);
        }
    }
}
