use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Successful action output: a human-readable message plus optional
/// structured data for callers that want to branch programmatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutput {
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub data: Value,
}

impl ActionOutput {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: Value::Null,
        }
    }

    pub fn with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

/// A tagged action failure. `kind` is a stable machine-readable code;
/// `message` is the prose shown to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionError {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub data: Value,
}

impl ActionError {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: Value::Null,
        }
    }

    pub fn with_data(kind: &'static str, message: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            message: message.into(),
            data,
        }
    }

    /// The capability failure returned when an action needs an account and
    /// none is configured.
    pub fn no_account(action: &str) -> Self {
        Self::new(
            "no_smart_account",
            format!(
                "Unable to run Action: {action}. A Smart Account is required to run this Action. \
                 Configure a local signer or a server wallet and try again."
            ),
        )
    }

    /// External-dependency failure with the proximate cause attached.
    pub fn upstream(label: &str, err: &eyre::Report) -> Self {
        Self::new("upstream_error", format!("{label}: {err:#}"))
    }
}

pub type ActionResult = Result<ActionOutput, ActionError>;

/// Render an action result into the single string channel the LLM sees.
/// Failures always start with "Error:" so the planner can recognize them.
pub fn render_result(result: &ActionResult) -> String {
    match result {
        Ok(out) => out.message.clone(),
        Err(e) => format!("Error: {}", e.message),
    }
}

/// Internal failures with a fixed shape. Construction-time variants abort
/// startup; the per-call variants are translated into [`ActionError`]s.
#[derive(Debug, Error, Clone)]
pub enum SkiffError {
    #[error("unsupported chain id: {0}")]
    UnsupportedChain(u64),

    #[error("no signing key material: set SKIFF_PRIVATE_KEY or SKIFF_MNEMONIC")]
    MissingKeyMaterial,

    #[error("empty API key")]
    EmptyApiKey,

    #[error("server wallet mode is not configured")]
    ServerWalletNotConfigured,

    #[error("credential revalidation failed: {0}")]
    Reauthorization(String),

    #[error("wallet index {index} not found ({count} wallets available)")]
    WalletIndexOutOfRange { index: u32, count: usize },
}

impl From<SkiffError> for ActionError {
    fn from(e: SkiffError) -> Self {
        let kind = match &e {
            SkiffError::UnsupportedChain(_) => "unsupported_chain",
            SkiffError::MissingKeyMaterial => "missing_key_material",
            SkiffError::EmptyApiKey => "empty_api_key",
            SkiffError::ServerWalletNotConfigured => "server_wallet_not_configured",
            SkiffError::Reauthorization(_) => "reauthorization_failed",
            SkiffError::WalletIndexOutOfRange { .. } => "wallet_index_out_of_range",
        };
        Self::new(kind, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_account_message_names_the_action_and_requirement() {
        let e = ActionError::no_account("get_address");
        assert!(e.message.contains("Unable to run Action: get_address"));
        assert!(e.message.contains("A Smart Account is required"));
        assert_eq!(e.kind, "no_smart_account");
    }

    #[test]
    fn render_prefixes_failures_only() {
        let ok: ActionResult = Ok(ActionOutput::text("Smart Account: 0xabc"));
        assert_eq!(render_result(&ok), "Smart Account: 0xabc");

        let err: ActionResult = Err(ActionError::new("upstream_error", "rpc unreachable"));
        assert_eq!(render_result(&err), "Error: rpc unreachable");
    }
}
