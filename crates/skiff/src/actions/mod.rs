//! The action catalog: every capability the agent can invoke, described by
//! a uniform contract so the dispatcher treats them identically.

pub mod read;
pub mod schema;
pub mod wallets;
pub mod write;

use crate::account::AccountHandle;
use crate::agentkit::Agentkit;
use crate::errors::ActionResult;
use alloy::primitives::U256;
use async_trait::async_trait;
use self::schema::{Args, Schema};
use serde_json::{json, Value};

/// Immutable action descriptor: the machine-readable half of the contract
/// exposed to the planner.
pub struct Descriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: Schema,
    pub requires_account: bool,
}

/// An action that only needs the resolved account handle.
#[async_trait]
pub trait StandardAction: Send + Sync {
    fn descriptor(&self) -> &'static Descriptor;
    async fn run(&self, account: &AccountHandle<'_>, args: &Args) -> ActionResult;
}

/// An action that needs the full agent context: service clients, the owner
/// signing adapter, or the server-wallet directory. The resolved handle is
/// passed along when the action declared `requires_account`.
#[async_trait]
pub trait ExtendedAction: Send + Sync {
    fn descriptor(&self) -> &'static Descriptor;
    async fn run(
        &self,
        kit: &Agentkit,
        account: Option<&AccountHandle<'_>>,
        args: &Args,
    ) -> ActionResult;
}

/// Tagged union over the two execution shapes; the dispatcher branches by
/// pattern match, never by structural probing.
pub enum Action {
    Standard(Box<dyn StandardAction>),
    Extended(Box<dyn ExtendedAction>),
}

impl Action {
    pub fn descriptor(&self) -> &'static Descriptor {
        match self {
            Self::Standard(a) => a.descriptor(),
            Self::Extended(a) => a.descriptor(),
        }
    }
}

/// The fixed catalog. Assembled once at startup by explicit enumeration;
/// adding a capability means adding a line to [`Registry::assemble`].
pub struct Registry {
    actions: Vec<Action>,
}

impl Registry {
    pub fn assemble() -> Self {
        Self {
            actions: vec![
                Action::Standard(Box::new(read::address::GetAddress)),
                Action::Standard(Box::new(read::balance::GetBalance)),
                Action::Extended(Box::new(read::token_details::GetTokenDetails)),
                Action::Extended(Box::new(read::order_status::GetSwapOrder)),
                Action::Standard(Box::new(write::transfer::TransferToken)),
                Action::Extended(Box::new(write::swap::SwapTokens)),
                Action::Extended(Box::new(write::cancel_order::CancelSwapOrder)),
                Action::Extended(Box::new(write::bridge::BridgeTokens)),
                Action::Extended(Box::new(write::launch::LaunchToken)),
                Action::Extended(Box::new(write::confidential::RegisterConfidential)),
                Action::Extended(Box::new(write::confidential::ConfidentialTransfer)),
                Action::Extended(Box::new(write::confidential::GetConfidentialBalance)),
                Action::Extended(Box::new(wallets::list::ListWallets)),
                Action::Extended(Box::new(wallets::switch::UseWallet)),
                Action::Extended(Box::new(wallets::logs::GetTransactionLogs)),
            ],
        }
    }

    pub fn list(&self) -> &[Action] {
        &self.actions
    }

    /// Name lookup. Later registrations shadow earlier ones, so catalog
    /// order is also override order.
    pub fn find(&self, name: &str) -> Option<&Action> {
        self.actions
            .iter()
            .rev()
            .find(|a| a.descriptor().name == name)
    }

    /// The machine-readable catalog dump used by the `actions` subcommand.
    pub fn catalog_json(&self) -> Value {
        let tools: Vec<Value> = self
            .actions
            .iter()
            .map(|a| {
                let d = a.descriptor();
                json!({
                    "name": d.name,
                    "description": d.description,
                    "inputSchema": d.schema.to_json_schema(),
                    "requiresAccount": d.requires_account,
                })
            })
            .collect();
        json!({ "actions": tools })
    }

    #[cfg(test)]
    pub(crate) fn from_actions(actions: Vec<Action>) -> Self {
        Self { actions }
    }
}

pub(crate) fn u256_to_u128_saturating(v: U256) -> u128 {
    u128::try_from(v).unwrap_or(u128::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_are_unique_and_non_empty() {
        let registry = Registry::assemble();
        let mut seen = std::collections::BTreeSet::new();
        for action in registry.list() {
            let d = action.descriptor();
            assert!(!d.name.is_empty(), "action with empty name");
            assert!(!d.description.is_empty(), "{} has no description", d.name);
            assert!(seen.insert(d.name), "duplicate action name: {}", d.name);
        }
        assert!(seen.len() >= 15, "catalog unexpectedly small");
    }

    #[test]
    fn zero_argument_schemas_accept_the_empty_object() {
        let registry = Registry::assemble();
        for action in registry.list() {
            let d = action.descriptor();
            if d.schema.fields.iter().all(|f| !f.required) {
                assert!(
                    d.schema.validate(&json!({})).is_ok(),
                    "{} rejects the empty object",
                    d.name
                );
            }
        }
    }

    #[test]
    fn required_fields_reject_the_empty_object() {
        let registry = Registry::assemble();
        for action in registry.list() {
            let d = action.descriptor();
            if d.schema.fields.iter().any(|f| f.required) {
                assert!(
                    d.schema.validate(&json!({})).is_err(),
                    "{} accepted an empty object despite required fields",
                    d.name
                );
            }
        }
    }

    #[test]
    fn find_prefers_the_latest_registration() {
        let registry = Registry::from_actions(vec![
            Action::Standard(Box::new(read::address::GetAddress)),
            Action::Standard(Box::new(read::balance::GetBalance)),
            // A duplicate name registered later shadows the original.
            Action::Standard(Box::new(read::address::GetAddress)),
        ]);
        let found = registry.find("get_address");
        assert!(found.is_some());
        assert!(registry.find("nope").is_none(), "absent name is None");
    }
}
