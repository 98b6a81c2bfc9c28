use crate::account::AccountHandle;
use crate::actions::schema::{Args, Field, FieldType, Schema};
use crate::actions::{Descriptor, ExtendedAction};
use crate::agentkit::Agentkit;
use crate::errors::{ActionError, ActionOutput, ActionResult};
use async_trait::async_trait;
use serde_json::json;

static FIELDS: &[Field] = &[Field::required(
    "order_uid",
    FieldType::String,
    "The order UID returned when the swap order was placed.",
)];

static DESCRIPTOR: Descriptor = Descriptor {
    name: "get_swap_order",
    description: "Check the current status of a batch-auction swap order.",
    schema: Schema { fields: FIELDS },
    requires_account: false,
};

pub struct GetSwapOrder;

#[async_trait]
impl ExtendedAction for GetSwapOrder {
    fn descriptor(&self) -> &'static Descriptor {
        &DESCRIPTOR
    }

    async fn run(
        &self,
        kit: &Agentkit,
        _account: Option<&AccountHandle<'_>>,
        args: &Args,
    ) -> ActionResult {
        let uid = args.str("order_uid").unwrap_or_default();
        match kit.swap().get_order(uid).await {
            Ok(order) => {
                let mut msg = format!("Order {uid}: status {}", order.status);
                if let Some(bought) = &order.executed_buy_amount {
                    msg.push_str(&format!(", executed buy amount {bought} (base units)"));
                }
                Ok(ActionOutput::with_data(
                    msg,
                    json!({ "uid": uid, "status": order.status }),
                ))
            }
            Err(e) => Err(ActionError::upstream("failed to fetch order", &e)),
        }
    }
}
