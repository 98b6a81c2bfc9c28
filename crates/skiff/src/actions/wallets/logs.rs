use crate::account::AccountHandle;
use crate::actions::schema::{Args, Field, FieldType, Schema};
use crate::actions::wallets::{humanize_timestamp, server_wallet};
use crate::actions::{Descriptor, ExtendedAction};
use crate::agentkit::Agentkit;
use crate::errors::{ActionError, ActionOutput, ActionResult};
use async_trait::async_trait;
use serde_json::json;

static FIELDS: &[Field] = &[Field::optional(
    "wallet_index",
    FieldType::Integer,
    "Wallet index to read logs for. Defaults to the active wallet.",
)];

static DESCRIPTOR: Descriptor = Descriptor {
    name: "get_transaction_logs",
    description: "List transactions the wallet server has submitted for a wallet. Server-wallet mode only.",
    schema: Schema { fields: FIELDS },
    requires_account: false,
};

pub struct GetTransactionLogs;

#[async_trait]
impl ExtendedAction for GetTransactionLogs {
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
        let index = args
            .u64("wallet_index")
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or_else(|| wallet.selected());

        let logs = match wallet.directory().transaction_logs(index).await {
            Ok(l) => l,
            Err(e) => return Err(ActionError::upstream("failed to fetch transaction logs", &e)),
        };
        if logs.is_empty() {
            return Ok(ActionOutput::text(format!(
                "No transactions recorded for wallet #{index}."
            )));
        }

        let lines: Vec<String> = logs
            .iter()
            .map(|l| {
                format!(
                    "{} — {} ({})",
                    humanize_timestamp(&l.created_at),
                    l.tx_hash,
                    l.status
                )
            })
            .collect();
        Ok(ActionOutput::with_data(
            format!("Transactions for wallet #{index}:\n{}", lines.join("\n")),
            json!({ "wallet_index": index, "transactions": logs }),
        ))
    }
}
