use crate::aa::Call;
use crate::account::AccountHandle;
use crate::actions::schema::{Args, DefaultValue, Field, FieldType, Schema};
use crate::actions::{Descriptor, ExtendedAction};
use crate::agentkit::Agentkit;
use crate::amount;
use crate::chains::evm::{erc20_approve_calldata, EvmChain};
use crate::config::VAULT_RELAYER;
use crate::errors::{ActionError, ActionOutput, ActionResult};
use crate::services::swap::{check_min_sell, sign_order, PlacementError, QuoteRequest};
use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::json;

static FIELDS: &[Field] = &[
    Field::required(
        "sell_token",
        FieldType::String,
        "ERC-20 contract address of the token to sell. Native assets must be wrapped first.",
    ),
    Field::required(
        "buy_token",
        FieldType::String,
        "ERC-20 contract address of the token to buy.",
    ),
    Field::required(
        "amount",
        FieldType::String,
        "Sell amount in UI units (e.g. \"25.5\").",
    ),
    Field::optional(
        "slippage_bps",
        FieldType::Integer,
        "Maximum slippage in basis points applied to the quoted buy amount.",
    )
    .with_default(DefaultValue::Int(50)),
];

static DESCRIPTOR: Descriptor = Descriptor {
    name: "swap_tokens",
    description: "Swap two ERC-20 tokens through the batch-auction order book. Approves the vault relayer when needed, then signs and places a sell order.",
    schema: Schema { fields: FIELDS },
    requires_account: true,
};

pub struct SwapTokens;

#[async_trait]
impl ExtendedAction for SwapTokens {
    fn descriptor(&self) -> &'static Descriptor {
        &DESCRIPTOR
    }

    async fn run(
        &self,
        kit: &Agentkit,
        account: Option<&AccountHandle<'_>>,
        args: &Args,
    ) -> ActionResult {
        let Some(account) = account else {
            return Err(ActionError::no_account(DESCRIPTOR.name));
        };

        let amount_ui = args.str("amount").unwrap_or_default();
        let sell_raw = args.str("sell_token").unwrap_or_default();
        let buy_raw = args.str("buy_token").unwrap_or_default();
        let slippage_bps = args.u64("slippage_bps").unwrap_or(50).min(5_000);

        // Cheapest checks first, all before any network traffic.
        if let Err(msg) = check_min_sell(amount_ui, sell_raw) {
            return Err(ActionError::new("below_minimum", msg));
        }
        let sell_token = match EvmChain::parse_address(sell_raw) {
            Ok(a) => a,
            Err(e) => {
                return Err(ActionError::new(
                    "invalid_arguments",
                    format!("invalid sell_token: {e:#}"),
                ))
            }
        };
        let buy_token = match EvmChain::parse_address(buy_raw) {
            Ok(a) => a,
            Err(e) => {
                return Err(ActionError::new(
                    "invalid_arguments",
                    format!("invalid buy_token: {e:#}"),
                ))
            }
        };

        // Off-chain orders are settled against an ECDSA signature, so the
        // owner key must exist locally. Server wallets cannot take part.
        let Some(signer) = account.owner_signer() else {
            return Err(ActionError::new(
                "unsupported_in_server_mode",
                "swap orders are signed off-chain with the owner key; server wallets cannot \
                 sign them. Use transfer_token, or switch to a locally configured signer.",
            ));
        };

        let owner = match account.address().await {
            Ok(a) => a,
            Err(e) => return Err(ActionError::upstream("failed to resolve account address", &e)),
        };

        let meta = match account.chain.get_erc20_metadata(sell_token).await {
            Ok(m) => m,
            Err(e) => return Err(ActionError::upstream("failed to read sell token", &e)),
        };
        let sell_base = match amount::parse_ui(amount_ui, u32::from(meta.decimals)) {
            Ok(v) => v,
            Err(e) => {
                return Err(ActionError::new(
                    "invalid_arguments",
                    format!("bad amount: {e:#}"),
                ))
            }
        };

        let quote = match kit
            .swap()
            .get_quote(&QuoteRequest {
                sell_token,
                buy_token,
                from: owner,
                sell_amount_before_fee: U256::from(sell_base),
            })
            .await
        {
            Ok(q) => q,
            Err(e) => return Err(ActionError::upstream("quote failed", &e)),
        };

        let buy_min = quote.buy_amount * U256::from(10_000 - slippage_bps) / U256::from(10_000_u64);

        // Approve the vault relayer first when the allowance is short. This
        // is a dependent step: the order is worthless until the relayer can
        // pull the sell token.
        let needed = quote.sell_amount + quote.fee_amount;
        let mut approved = false;
        let allowance = match account
            .chain
            .get_erc20_allowance(sell_token, owner, VAULT_RELAYER)
            .await
        {
            Ok(v) => v,
            Err(e) => return Err(ActionError::upstream("failed to read allowance", &e)),
        };
        if allowance < needed {
            let call = Call {
                to: sell_token,
                value: U256::ZERO,
                data: erc20_approve_calldata(VAULT_RELAYER, needed),
            };
            match account.submit(&[call], true).await {
                Ok(receipt) if receipt.confirmed => {
                    approved = true;
                }
                Ok(receipt) => {
                    return Err(ActionError::new(
                        "approval_failed",
                        format!(
                            "vault relayer approval reverted (reference {}); the swap was not placed",
                            receipt.reference
                        ),
                    ))
                }
                Err(e) => return Err(ActionError::upstream("vault relayer approval failed", &e)),
            }
        }

        let order = match sign_order(
            signer,
            account.chain.chain_id,
            owner,
            &quote,
            sell_token,
            buy_token,
            buy_min,
        ) {
            Ok(o) => o,
            Err(e) => return Err(ActionError::upstream("order signing failed", &e)),
        };

        let partial = |detail: String| {
            if approved {
                format!("Approval succeeded but the swap order was rejected: {detail}")
            } else {
                format!("swap order rejected: {detail}")
            }
        };

        match kit.swap().place_order(&order).await {
            Ok(uid) => Ok(ActionOutput::with_data(
                format!(
                    "Swap order placed: {uid}. Selling {amount_ui} {} for at least {} {buy_token} \
                     (fee {} base units). Track it with get_swap_order.",
                    meta.symbol,
                    buy_min,
                    quote.fee_amount,
                ),
                json!({ "uid": uid, "sell_amount": quote.sell_amount.to_string(), "buy_min": buy_min.to_string() }),
            )),
            Err(PlacementError::SignatureScheme { description }) => Err(ActionError::new(
                "signature_scheme_rejected",
                partial(format!(
                    "the order book recovered a signer different from the order owner \
                     ({description}). Smart-account signatures are not valid for off-chain \
                     orders; place the order from the owner EOA directly, or move funds with \
                     transfer_token and trade from an EOA."
                )),
            )),
            Err(PlacementError::Rejected { description }) => {
                Err(ActionError::new("order_rejected", partial(description)))
            }
            Err(PlacementError::Transport(e)) => Err(ActionError::new(
                "upstream_error",
                partial(format!("order book unreachable: {e:#}")),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_defaults_slippage() {
        let args = DESCRIPTOR.schema.validate(&json!({
            "sell_token": "0xa",
            "buy_token": "0xb",
            "amount": "1",
        }));
        assert!(args.is_ok(), "validation failed: {args:?}");
        if let Ok(a) = args {
            assert_eq!(a.u64("slippage_bps"), Some(50));
        }
    }
}
