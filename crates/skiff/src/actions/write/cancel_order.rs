use crate::account::AccountHandle;
use crate::actions::schema::{Args, Field, FieldType, Schema};
use crate::actions::{Descriptor, ExtendedAction};
use crate::agentkit::Agentkit;
use crate::errors::{ActionError, ActionOutput, ActionResult};
use crate::services::swap::sign_cancellation;
use async_trait::async_trait;
use serde_json::json;

static FIELDS: &[Field] = &[Field::required(
    "order_uid",
    FieldType::String,
    "UID of the order to cancel.",
)];

static DESCRIPTOR: Descriptor = Descriptor {
    name: "cancel_swap_order",
    description: "Cancel an open batch-auction swap order. Only orders still open can be cancelled.",
    schema: Schema { fields: FIELDS },
    requires_account: true,
};

pub struct CancelSwapOrder;

#[async_trait]
impl ExtendedAction for CancelSwapOrder {
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
        let uid = args.str("order_uid").unwrap_or_default();

        // Check the remote status before touching the signing path: a
        // filled/expired/cancelled order cannot be cancelled again.
        let order = match kit.swap().get_order(uid).await {
            Ok(o) => o,
            Err(e) => return Err(ActionError::upstream("failed to fetch order", &e)),
        };
        if order.status != "open" {
            return Err(ActionError::with_data(
                "order_not_open",
                format!(
                    "cancellation is not possible: order {uid} is {} (only open orders can be cancelled)",
                    order.status
                ),
                json!({ "uid": uid, "status": order.status }),
            ));
        }

        let Some(signer) = account.owner_signer() else {
            return Err(ActionError::new(
                "unsupported_in_server_mode",
                "cancellations are signed off-chain with the owner key; server wallets cannot sign them.",
            ));
        };

        let cancellation = match sign_cancellation(signer, account.chain.chain_id, uid) {
            Ok(c) => c,
            Err(e) => return Err(ActionError::upstream("cancellation signing failed", &e)),
        };
        match kit.swap().cancel_order(&cancellation).await {
            Ok(()) => Ok(ActionOutput::with_data(
                format!("Cancellation submitted for order {uid}."),
                json!({ "uid": uid }),
            )),
            Err(e) => Err(ActionError::upstream("cancellation failed", &e)),
        }
    }
}
