//! Encrypted-balance token actions. All three need the owner key to derive
//! the viewing keypair, so they are extended actions and unavailable in
//! server-wallet mode.

use crate::aa::Call;
use crate::account::AccountHandle;
use crate::actions::schema::{self, Args, DefaultValue, Field, FieldType, Schema};
use crate::actions::{Descriptor, ExtendedAction};
use crate::agentkit::Agentkit;
use crate::amount;
use crate::chains::evm::EvmChain;
use crate::config::{chain_for_id, ChainDef};
use crate::errors::{ActionError, ActionOutput, ActionResult};
use crate::services::confidential::{
    self, derive_viewing_seed, register_calldata, transfer_calldata,
};
use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::json;

fn confidential_token(
    account: &AccountHandle<'_>,
) -> Result<(&'static ChainDef, Address), ActionError> {
    let chain = chain_for_id(account.chain.chain_id).map_err(ActionError::from)?;
    let token = chain.confidential_token.ok_or_else(|| {
        ActionError::new(
            "unsupported_chain_feature",
            format!(
                "confidential transfers are not available on {}",
                chain.name
            ),
        )
    })?;
    Ok((chain, token))
}

fn owner_key<'a>(account: &'a AccountHandle<'_>) -> Result<&'a PrivateKeySigner, ActionError> {
    account.owner_signer().ok_or_else(|| {
        ActionError::new(
            "unsupported_in_server_mode",
            "confidential operations derive a viewing key from the owner key; server wallets \
             cannot use them.",
        )
    })
}

// ---------------------------------------------------------------- register

static REGISTER_DESCRIPTOR: Descriptor = Descriptor {
    name: "register_confidential",
    description: "Register the Smart Account with the encrypted-balance token so it can hold and move confidential funds. Takes no arguments.",
    schema: schema::EMPTY,
    requires_account: true,
};

pub struct RegisterConfidential;

#[async_trait]
impl ExtendedAction for RegisterConfidential {
    fn descriptor(&self) -> &'static Descriptor {
        &REGISTER_DESCRIPTOR
    }

    async fn run(
        &self,
        kit: &Agentkit,
        account: Option<&AccountHandle<'_>>,
        _args: &Args,
    ) -> ActionResult {
        let Some(account) = account else {
            return Err(ActionError::no_account(REGISTER_DESCRIPTOR.name));
        };
        let (chain, token) = confidential_token(account)?;
        let signer = owner_key(account)?;

        let address = match account.address().await {
            Ok(a) => a,
            Err(e) => return Err(ActionError::upstream("failed to resolve account address", &e)),
        };

        match confidential::is_registered(account.chain, token, address).await {
            Ok(true) => {
                return Ok(ActionOutput::text(format!(
                    "Account {address} is already registered with the confidential token."
                )))
            }
            Ok(false) => {}
            Err(e) => return Err(ActionError::upstream("registration check failed", &e)),
        }

        let seed = match derive_viewing_seed(signer) {
            Ok(s) => s,
            Err(e) => return Err(ActionError::upstream("viewing key derivation failed", &e)),
        };
        let proof = match kit
            .confidential()
            .registration_proof(seed, address, chain.chain_id)
            .await
        {
            Ok(p) => p,
            Err(e) => return Err(ActionError::upstream("registration proof failed", &e)),
        };

        let call = Call {
            to: token,
            value: U256::ZERO,
            data: register_calldata(&proof),
        };
        match account.submit(&[call], true).await {
            Ok(receipt) if receipt.confirmed => Ok(ActionOutput::with_data(
                format!("Registered {address} with the confidential token. Reference: {}.", receipt.reference),
                json!({ "reference": receipt.reference }),
            )),
            Ok(receipt) => Err(ActionError::new(
                "transaction_failed",
                format!("registration reverted on-chain (reference {})", receipt.reference),
            )),
            Err(e) => Err(ActionError::upstream("registration failed", &e)),
        }
    }
}

// ---------------------------------------------------------------- transfer

static TRANSFER_FIELDS: &[Field] = &[
    Field::required("to", FieldType::String, "Recipient address."),
    Field::required(
        "amount",
        FieldType::String,
        "Amount to transfer, in UI units. The amount is encrypted on-chain.",
    ),
    Field::optional("wait", FieldType::Boolean, "Wait for confirmation.")
        .with_default(DefaultValue::Bool(true)),
];

static TRANSFER_DESCRIPTOR: Descriptor = Descriptor {
    name: "confidential_transfer",
    description: "Send confidential tokens. On-chain observers see neither the amount nor the resulting balances.",
    schema: Schema {
        fields: TRANSFER_FIELDS,
    },
    requires_account: true,
};

pub struct ConfidentialTransfer;

#[async_trait]
impl ExtendedAction for ConfidentialTransfer {
    fn descriptor(&self) -> &'static Descriptor {
        &TRANSFER_DESCRIPTOR
    }

    async fn run(
        &self,
        kit: &Agentkit,
        account: Option<&AccountHandle<'_>>,
        args: &Args,
    ) -> ActionResult {
        let Some(account) = account else {
            return Err(ActionError::no_account(TRANSFER_DESCRIPTOR.name));
        };
        let (chain, token) = confidential_token(account)?;
        let signer = owner_key(account)?;

        let to = match EvmChain::parse_address(args.str("to").unwrap_or_default()) {
            Ok(a) => a,
            Err(e) => {
                return Err(ActionError::new(
                    "invalid_arguments",
                    format!("invalid recipient: {e:#}"),
                ))
            }
        };
        let amount_ui = args.str("amount").unwrap_or_default();
        let wait = args.boolean("wait").unwrap_or(true);

        let meta = match account.chain.get_erc20_metadata(token).await {
            Ok(m) => m,
            Err(e) => return Err(ActionError::upstream("failed to read token metadata", &e)),
        };
        let base = match amount::parse_ui(amount_ui, u32::from(meta.decimals)) {
            Ok(v) => v,
            Err(e) => {
                return Err(ActionError::new(
                    "invalid_arguments",
                    format!("bad amount: {e:#}"),
                ))
            }
        };

        let from = match account.address().await {
            Ok(a) => a,
            Err(e) => return Err(ActionError::upstream("failed to resolve account address", &e)),
        };

        match confidential::is_registered(account.chain, token, to).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(ActionError::new(
                    "recipient_not_registered",
                    format!(
                        "recipient {to} is not registered with the confidential token; they must \
                         run register_confidential first"
                    ),
                ))
            }
            Err(e) => return Err(ActionError::upstream("recipient check failed", &e)),
        }

        let seed = match derive_viewing_seed(signer) {
            Ok(s) => s,
            Err(e) => return Err(ActionError::upstream("viewing key derivation failed", &e)),
        };
        let proof = match kit
            .confidential()
            .transfer_proof(seed, from, to, base, chain.chain_id)
            .await
        {
            Ok(p) => p,
            Err(e) => return Err(ActionError::upstream("transfer proof failed", &e)),
        };

        let call = Call {
            to: token,
            value: U256::ZERO,
            data: transfer_calldata(to, &proof),
        };
        match account.submit(&[call], wait).await {
            Ok(receipt) if wait && !receipt.confirmed => Err(ActionError::new(
                "transaction_failed",
                format!(
                    "confidential transfer reverted on-chain (reference {})",
                    receipt.reference
                ),
            )),
            Ok(receipt) => Ok(ActionOutput::with_data(
                format!(
                    "Confidential transfer of {amount_ui} {} to {to} submitted. Reference: {}.",
                    meta.symbol, receipt.reference
                ),
                json!({ "reference": receipt.reference, "tx_hash": receipt.tx_hash }),
            )),
            Err(e) => Err(ActionError::upstream("confidential transfer failed", &e)),
        }
    }
}

// ---------------------------------------------------------------- balance

static BALANCE_DESCRIPTOR: Descriptor = Descriptor {
    name: "get_confidential_balance",
    description: "Decrypt and report the Smart Account's confidential token balance. Takes no arguments.",
    schema: schema::EMPTY,
    requires_account: true,
};

pub struct GetConfidentialBalance;

#[async_trait]
impl ExtendedAction for GetConfidentialBalance {
    fn descriptor(&self) -> &'static Descriptor {
        &BALANCE_DESCRIPTOR
    }

    async fn run(
        &self,
        kit: &Agentkit,
        account: Option<&AccountHandle<'_>>,
        _args: &Args,
    ) -> ActionResult {
        let Some(account) = account else {
            return Err(ActionError::no_account(BALANCE_DESCRIPTOR.name));
        };
        let (_chain, token) = confidential_token(account)?;
        let signer = owner_key(account)?;

        let address = match account.address().await {
            Ok(a) => a,
            Err(e) => return Err(ActionError::upstream("failed to resolve account address", &e)),
        };

        let handle = match confidential::encrypted_balance(account.chain, token, address).await {
            Ok(h) => h,
            Err(e) => return Err(ActionError::upstream("failed to read encrypted balance", &e)),
        };

        let seed = match derive_viewing_seed(signer) {
            Ok(s) => s,
            Err(e) => return Err(ActionError::upstream("viewing key derivation failed", &e)),
        };
        let base = match kit.confidential().decrypt_balance(seed, &handle).await {
            Ok(v) => v,
            Err(e) => return Err(ActionError::upstream("balance decryption failed", &e)),
        };

        let meta = match account.chain.get_erc20_metadata(token).await {
            Ok(m) => m,
            Err(e) => return Err(ActionError::upstream("failed to read token metadata", &e)),
        };
        let ui = amount::parse_base(&base)
            .and_then(|b| amount::format_units(b, u32::from(meta.decimals)))
            .unwrap_or_else(|_| base.clone());

        Ok(ActionOutput::with_data(
            format!("Confidential balance: {ui} {}", meta.symbol),
            json!({ "balance": ui, "symbol": meta.symbol }),
        ))
    }
}
