use crate::account::AccountHandle;
use crate::actions::schema::{self, Args};
use crate::actions::wallets::{humanize_timestamp, server_wallet};
use crate::actions::{Descriptor, ExtendedAction};
use crate::agentkit::Agentkit;
use crate::errors::{ActionError, ActionOutput, ActionResult};
use async_trait::async_trait;
use serde_json::json;

static DESCRIPTOR: Descriptor = Descriptor {
    name: "list_wallets",
    description: "List the wallets managed by the wallet server: index, address and timestamps. Server-wallet mode only. Takes no arguments.",
    schema: schema::EMPTY,
    requires_account: false,
};

pub struct ListWallets;

#[async_trait]
impl ExtendedAction for ListWallets {
    fn descriptor(&self) -> &'static Descriptor {
        &DESCRIPTOR
    }

    async fn run(
        &self,
        kit: &Agentkit,
        _account: Option<&AccountHandle<'_>>,
        _args: &Args,
    ) -> ActionResult {
        let wallet = server_wallet(kit)?;
        let wallets = match wallet.directory().list_wallets().await {
            Ok(w) => w,
            Err(e) => return Err(ActionError::upstream("failed to list wallets", &e)),
        };
        if wallets.is_empty() {
            return Ok(ActionOutput::text("No wallets exist on the server yet."));
        }

        let selected = wallet.selected();
        let lines: Vec<String> = wallets
            .iter()
            .map(|w| {
                let marker = if w.index == selected { " (active)" } else { "" };
                format!(
                    "#{} {}{} — created {}, updated {}",
                    w.index,
                    w.address,
                    marker,
                    humanize_timestamp(&w.created_at),
                    humanize_timestamp(&w.updated_at),
                )
            })
            .collect();

        Ok(ActionOutput::with_data(
            format!("Server wallets:\n{}", lines.join("\n")),
            json!({ "selected": selected, "wallets": wallets }),
        ))
    }
}
