use crate::account::AccountHandle;
use crate::actions::schema::{Args, Field, FieldType, Schema};
use crate::actions::wallets::server_wallet;
use crate::actions::{Descriptor, ExtendedAction};
use crate::agentkit::Agentkit;
use crate::errors::{ActionError, ActionOutput, ActionResult};
use async_trait::async_trait;
use serde_json::json;

static FIELDS: &[Field] = &[Field::required(
    "index",
    FieldType::Integer,
    "Index of the wallet to make active, as shown by list_wallets.",
)];

static DESCRIPTOR: Descriptor = Descriptor {
    name: "use_wallet",
    description: "Switch the active server wallet by index. Subsequent actions act from the newly selected wallet.",
    schema: Schema { fields: FIELDS },
    requires_account: false,
};

pub struct UseWallet;

#[async_trait]
impl ExtendedAction for UseWallet {
    fn descriptor(&self) -> &'static Descriptor {
        &DESCRIPTOR
    }

    async fn run(
        &self,
        kit: &Agentkit,
        _account: Option<&AccountHandle<'_>>,
        args: &Args,
    ) -> ActionResult {
        let wallet = server_wallet(kit)?;
        let index = match args.u64("index").and_then(|v| u32::try_from(v).ok()) {
            Some(i) => i,
            None => {
                return Err(ActionError::new(
                    "invalid_arguments",
                    "index must fit in an unsigned 32-bit integer",
                ))
            }
        };

        // Validate against the live wallet list before committing the switch.
        let info = match wallet.wallet_at(index).await {
            Ok(i) => i,
            Err(e) => return Err(e.into()),
        };

        let previous = wallet.select(index);
        Ok(ActionOutput::with_data(
            format!(
                "Active wallet is now #{index} ({}). Previously active: #{previous}.",
                info.address
            ),
            json!({ "index": index, "previous": previous, "address": info.address }),
        ))
    }
}
