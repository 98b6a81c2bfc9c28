use crate::aa::Call;
use crate::account::AccountHandle;
use crate::actions::schema::{Args, DefaultValue, Field, FieldType, Schema};
use crate::actions::{Descriptor, ExtendedAction};
use crate::agentkit::Agentkit;
use crate::amount;
use crate::config::chain_for_id;
use crate::errors::{ActionError, ActionOutput, ActionResult};
use crate::services::launchpad::{create_token_calldata, LaunchRequest};
use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::json;

static FIELDS: &[Field] = &[
    Field::required("name", FieldType::String, "Token name."),
    Field::required("symbol", FieldType::String, "Token ticker symbol."),
    Field::optional("description", FieldType::String, "Short token description.")
        .with_default(DefaultValue::Str("")),
    Field::optional(
        "initial_buy",
        FieldType::String,
        "Optional creator buy-in in native UI units, executed with the launch.",
    )
    .with_default(DefaultValue::Str("0")),
    Field::optional("wait", FieldType::Boolean, "Wait for confirmation.")
        .with_default(DefaultValue::Bool(true)),
];

static DESCRIPTOR: Descriptor = Descriptor {
    name: "launch_token",
    description: "Launch a new meme token through the launchpad factory. The launch service signs the parameters; the factory call is submitted from the Smart Account.",
    schema: Schema { fields: FIELDS },
    requires_account: true,
};

pub struct LaunchToken;

#[async_trait]
impl ExtendedAction for LaunchToken {
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

        let chain = match chain_for_id(account.chain.chain_id) {
            Ok(c) => c,
            Err(e) => return Err(e.into()),
        };
        let Some(factory) = chain.launchpad_factory else {
            return Err(ActionError::new(
                "unsupported_chain_feature",
                format!("token launches are not available on {}", chain.name),
            ));
        };

        let name = args.str("name").unwrap_or_default();
        let symbol = args.str("symbol").unwrap_or_default();
        if name.is_empty() || symbol.is_empty() {
            return Err(ActionError::new(
                "invalid_arguments",
                "token name and symbol must be non-empty",
            ));
        }
        let wait = args.boolean("wait").unwrap_or(true);

        let initial_buy_base = match amount::parse_ui(args.str("initial_buy").unwrap_or("0"), 18) {
            Ok(v) => v,
            Err(e) => {
                return Err(ActionError::new(
                    "invalid_arguments",
                    format!("bad initial_buy: {e:#}"),
                ))
            }
        };

        let creator = match account.address().await {
            Ok(a) => a,
            Err(e) => return Err(ActionError::upstream("failed to resolve account address", &e)),
        };

        let ticket = match kit
            .launchpad()
            .prepare_launch(&LaunchRequest {
                name: name.to_owned(),
                symbol: symbol.to_owned(),
                description: args.str("description").unwrap_or_default().to_owned(),
                creator,
                chain_id: chain.chain_id,
                initial_buy_base: U256::from(initial_buy_base),
            })
            .await
        {
            Ok(t) => t,
            Err(e) => return Err(ActionError::upstream("launch preparation failed", &e)),
        };

        let call = Call {
            to: factory,
            value: ticket.value,
            data: create_token_calldata(&ticket),
        };
        match account.submit(&[call], wait).await {
            Ok(receipt) if wait && !receipt.confirmed => Err(ActionError::new(
                "transaction_failed",
                format!(
                    "token creation reverted on-chain (reference {})",
                    receipt.reference
                ),
            )),
            Ok(receipt) => {
                let mut msg = format!("Token {name} ({symbol}) launch submitted.");
                if let Some(addr) = ticket.predicted_address {
                    msg.push_str(&format!(" Token address: {addr}."));
                }
                msg.push_str(&format!(" Reference: {}.", receipt.reference));
                Ok(ActionOutput::with_data(
                    msg,
                    json!({
                        "token_address": ticket.predicted_address.map(|a| a.to_string()),
                        "reference": receipt.reference,
                        "tx_hash": receipt.tx_hash,
                    }),
                ))
            }
            Err(e) => Err(ActionError::upstream("token launch failed", &e)),
        }
    }
}
