use crate::account::AccountHandle;
use crate::actions::schema::{Args, Field, FieldType, Schema};
use crate::actions::{u256_to_u128_saturating, Descriptor, StandardAction};
use crate::amount;
use crate::chains::evm::EvmChain;
use crate::config;
use crate::errors::{ActionError, ActionOutput, ActionResult};
use async_trait::async_trait;
use serde_json::json;

static FIELDS: &[Field] = &[Field::optional(
    "tokens",
    FieldType::StringArray,
    "ERC-20 contract addresses to include. The native balance is always returned.",
)];

static DESCRIPTOR: Descriptor = Descriptor {
    name: "get_balance",
    description: "Get native and ERC-20 token balances for the Smart Account.",
    schema: Schema { fields: FIELDS },
    requires_account: true,
};

pub struct GetBalance;

#[async_trait]
impl StandardAction for GetBalance {
    fn descriptor(&self) -> &'static Descriptor {
        &DESCRIPTOR
    }

    async fn run(&self, account: &AccountHandle<'_>, args: &Args) -> ActionResult {
        let owner = match account.address().await {
            Ok(a) => a,
            Err(e) => return Err(ActionError::upstream("failed to resolve account address", &e)),
        };

        let (native_symbol, native_decimals) = config::chain_for_id(account.chain.chain_id)
            .map(|c| (c.native_symbol, c.native_decimals))
            .unwrap_or(("NATIVE", 18));

        let mut lines = Vec::new();
        let mut data = Vec::new();

        match account.chain.get_native_balance(owner).await {
            Ok(v) => {
                let ui = amount::format_units(u256_to_u128_saturating(v), native_decimals)
                    .unwrap_or_else(|_| v.to_string());
                lines.push(format!("{native_symbol}: {ui}"));
                data.push(json!({ "token": "native", "symbol": native_symbol, "balance": ui }));
            }
            Err(e) => return Err(ActionError::upstream("failed to read native balance", &e)),
        }

        for token in args.str_list("tokens").unwrap_or_default() {
            let addr = match EvmChain::parse_address(token) {
                Ok(a) => a,
                Err(_) => {
                    return Err(ActionError::new(
                        "invalid_arguments",
                        format!("not a token contract address: {token}"),
                    ))
                }
            };
            match account.chain.get_erc20_balance(addr, owner).await {
                Ok((v, meta)) => {
                    let ui = amount::format_units(
                        u256_to_u128_saturating(v),
                        u32::from(meta.decimals),
                    )
                    .unwrap_or_else(|_| v.to_string());
                    lines.push(format!("{} ({token}): {ui}", meta.symbol));
                    data.push(json!({ "token": token, "symbol": meta.symbol, "balance": ui }));
                }
                Err(e) => {
                    return Err(ActionError::upstream(
                        &format!("failed to read balance of {token}"),
                        &e,
                    ))
                }
            }
        }

        Ok(ActionOutput::with_data(
            format!(
                "Balances for {owner} on {}:\n{}",
                account.chain.name,
                lines.join("\n")
            ),
            json!({ "address": owner.to_string(), "balances": data }),
        ))
    }
}
