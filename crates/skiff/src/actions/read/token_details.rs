use crate::account::AccountHandle;
use crate::actions::schema::{Args, Field, FieldType, Schema};
use crate::actions::{Descriptor, ExtendedAction};
use crate::agentkit::Agentkit;
use crate::errors::{ActionError, ActionOutput, ActionResult};
use async_trait::async_trait;
use serde_json::json;

static FIELDS: &[Field] = &[Field::required(
    "token",
    FieldType::String,
    "Token contract address to inspect.",
)];

static DESCRIPTOR: Descriptor = Descriptor {
    name: "get_token_details",
    description: "Look up token analytics (price, liquidity, volume, holders) before trading. Read-only.",
    schema: Schema { fields: FIELDS },
    requires_account: false,
};

pub struct GetTokenDetails;

#[async_trait]
impl ExtendedAction for GetTokenDetails {
    fn descriptor(&self) -> &'static Descriptor {
        &DESCRIPTOR
    }

    async fn run(
        &self,
        kit: &Agentkit,
        _account: Option<&AccountHandle<'_>>,
        args: &Args,
    ) -> ActionResult {
        let token = args.str("token").unwrap_or_default();
        match kit.analytics().token_details(kit.chain().chain_id, token).await {
            Ok(details) => Ok(ActionOutput::with_data(
                details.summarize(token),
                json!({
                    "token": token,
                    "symbol": details.symbol,
                    "name": details.name,
                    "price_usd": details.price_usd.map(|d| d.to_string()),
                    "holders": details.holders,
                }),
            )),
            Err(e) => Err(ActionError::upstream("token analytics lookup failed", &e)),
        }
    }
}
