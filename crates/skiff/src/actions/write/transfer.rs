use crate::aa::Call;
use crate::account::AccountHandle;
use crate::actions::schema::{Args, DefaultValue, Field, FieldType, Schema};
use crate::actions::{u256_to_u128_saturating, Descriptor, StandardAction};
use crate::amount;
use crate::chains::evm::{erc20_transfer_calldata, EvmChain};
use crate::config;
use crate::errors::{ActionError, ActionOutput, ActionResult};
use alloy::primitives::{Bytes, U256};
use async_trait::async_trait;
use serde_json::json;

static FIELDS: &[Field] = &[
    Field::required("to", FieldType::String, "Recipient address."),
    Field::required(
        "amount",
        FieldType::String,
        "Amount to send, in UI units (e.g. \"1.5\").",
    ),
    Field::optional(
        "token",
        FieldType::String,
        "ERC-20 contract address, or \"native\" for the chain's native asset.",
    )
    .with_default(DefaultValue::Str("native")),
    Field::optional(
        "wait",
        FieldType::Boolean,
        "Wait for on-chain confirmation before returning.",
    )
    .with_default(DefaultValue::Bool(true)),
];

static DESCRIPTOR: Descriptor = Descriptor {
    name: "transfer_token",
    description: "Send native or ERC-20 tokens from the Smart Account. Gas is sponsored; the account needs no native balance for fees.",
    schema: Schema { fields: FIELDS },
    requires_account: true,
};

pub struct TransferToken;

#[async_trait]
impl StandardAction for TransferToken {
    fn descriptor(&self) -> &'static Descriptor {
        &DESCRIPTOR
    }

    async fn run(&self, account: &AccountHandle<'_>, args: &Args) -> ActionResult {
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
        let token = args.str("token").unwrap_or("native");
        let wait = args.boolean("wait").unwrap_or(true);

        let owner = match account.address().await {
            Ok(a) => a,
            Err(e) => return Err(ActionError::upstream("failed to resolve account address", &e)),
        };

        let (call, symbol) = if token.eq_ignore_ascii_case("native") {
            let (symbol, decimals) = config::chain_for_id(account.chain.chain_id)
                .map(|c| (c.native_symbol, c.native_decimals))
                .unwrap_or(("NATIVE", 18));
            let base = match amount::parse_ui(amount_ui, decimals) {
                Ok(v) => v,
                Err(e) => {
                    return Err(ActionError::new(
                        "invalid_arguments",
                        format!("bad amount: {e:#}"),
                    ))
                }
            };
            let have = match account.chain.get_native_balance(owner).await {
                Ok(v) => v,
                Err(e) => return Err(ActionError::upstream("failed to read balance", &e)),
            };
            if U256::from(base) > have {
                return Err(ActionError::new(
                    "insufficient_balance",
                    format!(
                        "insufficient balance: have {} {symbol}, need {amount_ui}",
                        amount::format_units(u256_to_u128_saturating(have), decimals)
                            .unwrap_or_else(|_| have.to_string()),
                    ),
                ));
            }
            (
                Call {
                    to,
                    value: U256::from(base),
                    data: Bytes::new(),
                },
                symbol.to_owned(),
            )
        } else {
            let token_addr = match EvmChain::parse_address(token) {
                Ok(a) => a,
                Err(e) => {
                    return Err(ActionError::new(
                        "invalid_arguments",
                        format!("invalid token: {e:#}"),
                    ))
                }
            };
            let (have, meta) = match account.chain.get_erc20_balance(token_addr, owner).await {
                Ok(v) => v,
                Err(e) => return Err(ActionError::upstream("failed to read token balance", &e)),
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
            if U256::from(base) > have {
                return Err(ActionError::new(
                    "insufficient_balance",
                    format!(
                        "insufficient balance: have {} {}, need {amount_ui}",
                        amount::format_units(
                            u256_to_u128_saturating(have),
                            u32::from(meta.decimals)
                        )
                        .unwrap_or_else(|_| have.to_string()),
                        meta.symbol,
                    ),
                ));
            }
            (
                Call {
                    to: token_addr,
                    value: U256::ZERO,
                    data: erc20_transfer_calldata(to, U256::from(base)),
                },
                meta.symbol,
            )
        };

        match account.submit(&[call], wait).await {
            Ok(receipt) if wait && !receipt.confirmed => Err(ActionError::with_data(
                "transaction_failed",
                format!(
                    "transfer of {amount_ui} {symbol} to {to} reverted on-chain (reference {})",
                    receipt.reference
                ),
                json!({ "reference": receipt.reference, "tx_hash": receipt.tx_hash }),
            )),
            Ok(receipt) => {
                let msg = if wait {
                    format!(
                        "Transferred {amount_ui} {symbol} to {to}. Transaction: {}",
                        receipt.tx_hash.clone().unwrap_or_else(|| receipt.reference.clone())
                    )
                } else {
                    format!(
                        "Transfer of {amount_ui} {symbol} to {to} submitted (reference {}). Not waiting for confirmation.",
                        receipt.reference
                    )
                };
                Ok(ActionOutput::with_data(
                    msg,
                    json!({ "reference": receipt.reference, "tx_hash": receipt.tx_hash }),
                ))
            }
            Err(e) => Err(ActionError::upstream("transfer failed", &e)),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_recipient_and_amount() {
        let err = DESCRIPTOR.schema.validate(&json!({})).err();
        assert!(err.is_some());
        if let Some(v) = err {
            assert!(v.missing.contains(&"to"));
            assert!(v.missing.contains(&"amount"));
        }
    }

    #[test]
    fn schema_defaults_token_to_native_and_waits() {
        let args = DESCRIPTOR
            .schema
            .validate(&json!({ "to": "0x1", "amount": "1" }));
        assert!(args.is_ok(), "validation failed: {args:?}");
        if let Ok(a) = args {
            assert_eq!(a.str("token"), Some("native"));
            assert_eq!(a.boolean("wait"), Some(true));
        }
    }
}
