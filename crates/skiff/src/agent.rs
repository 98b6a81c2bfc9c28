//! The LLM-facing runtime: one rig tool adapter per catalog action, all
//! delegating into the dispatcher, plus the interactive REPL.

use crate::agentkit::Agentkit;
use crate::config::LlmConfig;
use crate::dispatcher::dispatch;
use crate::errors::render_result;
use rig::{
    completion::{Prompt as _, ToolDefinition},
    prelude::*,
    providers::openai,
    tool::Tool,
};
use secrecy::ExposeSecret as _;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};

const SYSTEM_PREAMBLE: &str = "\
You are an on-chain wallet agent operating a gasless Smart Account. \
Use the available tools to answer requests; never fabricate balances, \
addresses or transaction hashes. Tool results that start with \"Error:\" \
describe a failure — relay the reason to the user and suggest a fix when \
one is mentioned. Amounts are decimal strings in normal (UI) units.";

const MAX_TOOL_TURNS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    #[error("unknown action: {0}")]
    UnknownAction(&'static str),
}

fn definition_for(kit: &Agentkit, name: &'static str) -> ToolDefinition {
    match kit.registry().find(name) {
        Some(action) => {
            let d = action.descriptor();
            ToolDefinition {
                name: d.name.to_owned(),
                description: d.description.to_owned(),
                parameters: d.schema.to_json_schema(),
            }
        }
        None => ToolDefinition {
            name: name.to_owned(),
            description: String::new(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        },
    }
}

async fn run_action(
    kit: &Agentkit,
    name: &'static str,
    args: &serde_json::Value,
) -> Result<String, ToolCallError> {
    let Some(action) = kit.registry().find(name) else {
        return Err(ToolCallError::UnknownAction(name));
    };
    // Both outcomes travel back through the same string channel; the agent
    // recognizes failures by the "Error:" prefix.
    Ok(render_result(&dispatch(kit, action, args).await))
}

macro_rules! action_tool {
    ($ty:ident, $name:literal) => {
        #[derive(Clone)]
        struct $ty {
            kit: Arc<Agentkit>,
        }

        impl Tool for $ty {
            const NAME: &'static str = $name;
            type Error = ToolCallError;
            type Args = serde_json::Value;
            type Output = String;

            async fn definition(&self, _prompt: String) -> ToolDefinition {
                definition_for(&self.kit, $name)
            }

            async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
                run_action(&self.kit, $name, &args).await
            }
        }
    };
}

action_tool!(GetAddressTool, "get_address");
action_tool!(GetBalanceTool, "get_balance");
action_tool!(GetTokenDetailsTool, "get_token_details");
action_tool!(GetSwapOrderTool, "get_swap_order");
action_tool!(TransferTokenTool, "transfer_token");
action_tool!(SwapTokensTool, "swap_tokens");
action_tool!(CancelSwapOrderTool, "cancel_swap_order");
action_tool!(BridgeTokensTool, "bridge_tokens");
action_tool!(LaunchTokenTool, "launch_token");
action_tool!(RegisterConfidentialTool, "register_confidential");
action_tool!(ConfidentialTransferTool, "confidential_transfer");
action_tool!(GetConfidentialBalanceTool, "get_confidential_balance");
action_tool!(ListWalletsTool, "list_wallets");
action_tool!(UseWalletTool, "use_wallet");
action_tool!(GetTransactionLogsTool, "get_transaction_logs");

/// Run the interactive loop: read prompts from stdin, let the model plan
/// and call actions, print each response, stop on the literal "exit".
pub async fn run_repl(kit: Arc<Agentkit>, llm: &LlmConfig) -> eyre::Result<()> {
    let mut builder = openai::Client::builder(llm.api_key.expose_secret());
    if let Some(base) = &llm.base_url {
        builder = builder.base_url(base);
    }
    let client = builder.build()?;

    let agent = client
        .agent(&llm.model)
        .preamble(SYSTEM_PREAMBLE)
        .tool(GetAddressTool {
            kit: Arc::clone(&kit),
        })
        .tool(GetBalanceTool {
            kit: Arc::clone(&kit),
        })
        .tool(GetTokenDetailsTool {
            kit: Arc::clone(&kit),
        })
        .tool(GetSwapOrderTool {
            kit: Arc::clone(&kit),
        })
        .tool(TransferTokenTool {
            kit: Arc::clone(&kit),
        })
        .tool(SwapTokensTool {
            kit: Arc::clone(&kit),
        })
        .tool(CancelSwapOrderTool {
            kit: Arc::clone(&kit),
        })
        .tool(BridgeTokensTool {
            kit: Arc::clone(&kit),
        })
        .tool(LaunchTokenTool {
            kit: Arc::clone(&kit),
        })
        .tool(RegisterConfidentialTool {
            kit: Arc::clone(&kit),
        })
        .tool(ConfidentialTransferTool {
            kit: Arc::clone(&kit),
        })
        .tool(GetConfidentialBalanceTool {
            kit: Arc::clone(&kit),
        })
        .tool(ListWalletsTool {
            kit: Arc::clone(&kit),
        })
        .tool(UseWalletTool {
            kit: Arc::clone(&kit),
        })
        .tool(GetTransactionLogsTool {
            kit: Arc::clone(&kit),
        })
        .build();

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("skiff {} — chain {}. Type \"exit\" to quit.\n", env!("CARGO_PKG_VERSION"), kit.chain().name).as_bytes())
        .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if prompt == "exit" {
            break;
        }

        match agent.prompt(prompt).multi_turn(MAX_TOOL_TURNS).await {
            Ok(response) => {
                stdout.write_all(response.to_string().as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
            Err(e) => {
                // One failed turn never kills the session.
                tracing::error!(error = %e, "agent turn failed");
                stdout
                    .write_all(format!("Error: {e}\n").as_bytes())
                    .await?;
            }
        }
    }
    Ok(())
}
