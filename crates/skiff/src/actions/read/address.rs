use crate::account::AccountHandle;
use crate::actions::schema;
use crate::actions::{Descriptor, StandardAction};
use crate::errors::{ActionError, ActionOutput, ActionResult};
use async_trait::async_trait;
use serde_json::json;

static DESCRIPTOR: Descriptor = Descriptor {
    name: "get_address",
    description: "Get the Smart Account address the agent acts from. Takes no arguments.",
    schema: schema::EMPTY,
    requires_account: true,
};

pub struct GetAddress;

#[async_trait]
impl StandardAction for GetAddress {
    fn descriptor(&self) -> &'static Descriptor {
        &DESCRIPTOR
    }

    async fn run(&self, account: &AccountHandle<'_>, _args: &schema::Args) -> ActionResult {
        match account.address().await {
            Ok(addr) => Ok(ActionOutput::with_data(
                format!("Smart Account: {addr}"),
                json!({ "address": addr.to_string() }),
            )),
            Err(e) => Err(ActionError::upstream("failed to resolve account address", &e)),
        }
    }
}
