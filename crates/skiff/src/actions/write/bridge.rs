use crate::aa::Call;
use crate::account::AccountHandle;
use crate::actions::schema::{Args, DefaultValue, Field, FieldType, Schema};
use crate::actions::{Descriptor, ExtendedAction};
use crate::agentkit::Agentkit;
use crate::amount;
use crate::chains::evm::{erc20_approve_calldata, EvmChain};
use crate::config::{chain_for_id, chain_for_name, ChainDef};
use crate::errors::{ActionError, ActionOutput, ActionResult};
use crate::services::bridge::{BridgeOrderRequest, NATIVE_TOKEN};
use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::json;

static FIELDS: &[Field] = &[
    Field::required(
        "to_chain",
        FieldType::String,
        "Destination chain, by name (e.g. \"base\") or numeric chain id.",
    ),
    Field::required(
        "amount",
        FieldType::String,
        "Amount to bridge, in UI units.",
    ),
    Field::optional(
        "token",
        FieldType::String,
        "Source token contract address, or \"native\".",
    )
    .with_default(DefaultValue::Str("native")),
    Field::optional(
        "recipient",
        FieldType::String,
        "Destination address. Defaults to the sending account.",
    ),
    Field::optional(
        "wait",
        FieldType::Boolean,
        "Wait for the source-chain transaction to confirm.",
    )
    .with_default(DefaultValue::Bool(true)),
];

static DESCRIPTOR: Descriptor = Descriptor {
    name: "bridge_tokens",
    description: "Bridge tokens to another supported chain through the cross-chain order protocol. Creates the order, approves if needed, and submits from the Smart Account.",
    schema: Schema { fields: FIELDS },
    requires_account: true,
};

fn resolve_destination(target: &str) -> Option<&'static ChainDef> {
    if let Ok(id) = target.trim().parse::<u64>() {
        return chain_for_id(id).ok();
    }
    chain_for_name(target)
}

pub struct BridgeTokens;

#[async_trait]
impl ExtendedAction for BridgeTokens {
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

        let dst_name = args.str("to_chain").unwrap_or_default();
        let Some(dst) = resolve_destination(dst_name) else {
            return Err(ActionError::new(
                "unsupported_chain",
                format!("unsupported destination chain: {dst_name}"),
            ));
        };
        if dst.chain_id == account.chain.chain_id {
            return Err(ActionError::new(
                "invalid_arguments",
                "destination chain equals the source chain; nothing to bridge",
            ));
        }

        let amount_ui = args.str("amount").unwrap_or_default();
        let token = args.str("token").unwrap_or("native");
        let wait = args.boolean("wait").unwrap_or(true);

        let sender = match account.address().await {
            Ok(a) => a,
            Err(e) => return Err(ActionError::upstream("failed to resolve account address", &e)),
        };
        let recipient = args
            .str("recipient")
            .map(str::to_owned)
            .unwrap_or_else(|| sender.to_string());

        let native = token.eq_ignore_ascii_case("native");
        let (src_token, symbol, decimals) = if native {
            let (symbol, native_decimals) = chain_for_id(account.chain.chain_id)
                .map(|c| (c.native_symbol, c.native_decimals))
                .unwrap_or(("NATIVE", 18));
            (NATIVE_TOKEN.to_owned(), symbol.to_owned(), native_decimals)
        } else {
            let addr = match EvmChain::parse_address(token) {
                Ok(a) => a,
                Err(e) => {
                    return Err(ActionError::new(
                        "invalid_arguments",
                        format!("invalid token: {e:#}"),
                    ))
                }
            };
            match account.chain.get_erc20_metadata(addr).await {
                Ok(m) => (addr.to_string(), m.symbol, u32::from(m.decimals)),
                Err(e) => return Err(ActionError::upstream("failed to read source token", &e)),
            }
        };

        let base = match amount::parse_ui(amount_ui, decimals) {
            Ok(v) => v,
            Err(e) => {
                return Err(ActionError::new(
                    "invalid_arguments",
                    format!("bad amount: {e:#}"),
                ))
            }
        };

        let order = match kit
            .bridge()
            .create_order_tx(&BridgeOrderRequest {
                src_chain_id: account.chain.chain_id,
                src_token: src_token.clone(),
                amount_base: U256::from(base),
                dst_chain_id: dst.chain_id,
                dst_token: NATIVE_TOKEN.to_owned(),
                recipient: recipient.clone(),
            })
            .await
        {
            Ok(o) => o,
            Err(e) => return Err(ActionError::upstream("bridge order creation failed", &e)),
        };

        // ERC-20 inputs need an approval for the bridge contract. Both calls
        // ride in one user operation, so they execute atomically in order.
        let mut calls = Vec::new();
        if !native {
            let token_addr = match EvmChain::parse_address(&src_token) {
                Ok(a) => a,
                Err(e) => return Err(ActionError::upstream("token address", &e)),
            };
            calls.push(Call {
                to: token_addr,
                value: U256::ZERO,
                data: erc20_approve_calldata(order.tx_to, U256::from(base)),
            });
        }
        calls.push(Call {
            to: order.tx_to,
            value: order.tx_value,
            data: order.tx_data.clone(),
        });

        match account.submit(&calls, wait).await {
            Ok(receipt) if wait && !receipt.confirmed => Err(ActionError::new(
                "transaction_failed",
                format!(
                    "bridge transaction reverted on the source chain (reference {})",
                    receipt.reference
                ),
            )),
            Ok(receipt) => {
                let mut msg = format!(
                    "Bridge order submitted: {amount_ui} {symbol} from {} to {} for {recipient}.",
                    account.chain.name, dst.name
                );
                if let Some(id) = &order.order_id {
                    msg.push_str(&format!(" Order id: {id}."));
                }
                if let Some(recv) = &order.receive_amount {
                    msg.push_str(&format!(" Estimated receive amount: {recv} base units."));
                }
                if let Some(d) = order.fulfillment_delay_sec {
                    msg.push_str(&format!(" Approximate fulfillment delay: {d}s."));
                }
                msg.push_str(&format!(" Reference: {}.", receipt.reference));
                Ok(ActionOutput::with_data(
                    msg,
                    json!({
                        "order_id": order.order_id,
                        "reference": receipt.reference,
                        "tx_hash": receipt.tx_hash,
                    }),
                ))
            }
            Err(e) => Err(ActionError::upstream("bridge submission failed", &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_resolves_by_name_and_id() {
        assert_eq!(resolve_destination("base").map(|c| c.chain_id), Some(8453));
        assert_eq!(resolve_destination("8453").map(|c| c.name), Some("base"));
        assert!(resolve_destination("solana").is_none());
    }
}
