//! The single call site through which the agent runtime invokes any action.
//! Expected failures come back as tagged errors, never as panics; only
//! programming-contract violations may propagate past this boundary.

use crate::actions::Action;
use crate::agentkit::Agentkit;
use crate::errors::{ActionError, ActionResult};
use serde_json::Value;

/// Validate arguments, resolve the acting account (revalidating remote
/// credentials once per call), then invoke the action by shape.
pub async fn dispatch(kit: &Agentkit, action: &Action, raw_args: &Value) -> ActionResult {
    let descriptor = action.descriptor();

    if descriptor.requires_account && !kit.is_configured() {
        return Err(ActionError::no_account(descriptor.name));
    }

    let args = match descriptor.schema.validate(raw_args) {
        Ok(a) => a,
        Err(violation) => {
            return Err(ActionError::new(
                "invalid_arguments",
                format!("invalid arguments for {}: {violation}", descriptor.name),
            ))
        }
    };

    // A caller may pin the server wallet for this call only; the selected
    // index is untouched.
    let wallet_index = raw_args
        .get("wallet_index")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok());

    let handle = if descriptor.requires_account {
        match kit.resolve_account(wallet_index).await {
            Ok(h) => h,
            Err(e) => return Err(e.into()),
        }
    } else {
        None
    };

    tracing::debug!(action = descriptor.name, "dispatching action");

    match action {
        Action::Standard(standard) => match &handle {
            Some(h) => standard.run(h, &args).await,
            None => Err(ActionError::no_account(descriptor.name)),
        },
        Action::Extended(extended) => extended.run(kit, handle.as_ref(), &args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::test_support::{CountingAuthority, FakeDirectory};
    use crate::account::{CredentialContext, RemoteCredentials, ServerWallet};
    use crate::agentkit::testkit::test_config;
    use crate::config::chain_for_id;
    use crate::errors::render_result;
    use crate::services::swap::{
        OrderStatus, PlacementError, Quote, QuoteRequest, SignedCancellation, SignedOrder, SwapApi,
    };
    use crate::services::wallet_server::CredentialAuthority;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn find<'a>(kit: &'a Agentkit, name: &str) -> eyre::Result<&'a Action> {
        kit.registry()
            .find(name)
            .ok_or_else(|| eyre::eyre!("{name} missing from catalog"))
    }

    struct FakeSwap {
        status: &'static str,
        cancels: AtomicUsize,
        quotes: AtomicUsize,
    }

    impl FakeSwap {
        fn with_status(status: &'static str) -> Self {
            Self {
                status,
                cancels: AtomicUsize::new(0),
                quotes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SwapApi for FakeSwap {
        async fn get_quote(&self, _req: &QuoteRequest) -> eyre::Result<Quote> {
            self.quotes.fetch_add(1, Ordering::SeqCst);
            eyre::bail!("quote endpoint must not be reached in these tests")
        }

        async fn get_order(&self, uid: &str) -> eyre::Result<OrderStatus> {
            Ok(OrderStatus {
                uid: uid.to_owned(),
                status: self.status.to_owned(),
                executed_buy_amount: None,
            })
        }

        async fn place_order(&self, _order: &SignedOrder) -> Result<String, PlacementError> {
            Err(PlacementError::Rejected {
                description: "order endpoint must not be reached in these tests".into(),
            })
        }

        async fn cancel_order(&self, _c: &SignedCancellation) -> eyre::Result<()> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn account_actions_degrade_without_credentials() -> eyre::Result<()> {
        let kit = Agentkit::read_only(&test_config(43114)?)?;
        for name in ["get_address", "get_balance", "transfer_token", "swap_tokens"] {
            let result = dispatch(&kit, find(&kit, name)?, &json!({})).await;
            let rendered = render_result(&result);
            assert!(
                rendered.contains("A Smart Account is required"),
                "{name} produced: {rendered}"
            );
            assert!(rendered.starts_with("Error:"), "failures carry the prefix");
        }
        Ok(())
    }

    #[tokio::test]
    async fn validation_failures_name_the_offending_fields() -> eyre::Result<()> {
        let kit = Agentkit::with_local_signer(&test_config(43114)?)?;
        let result = dispatch(&kit, find(&kit, "transfer_token")?, &json!({})).await;
        let err = result.err();
        assert!(err.is_some(), "expected validation error");
        if let Some(e) = err {
            assert_eq!(e.kind, "invalid_arguments");
            assert!(e.message.contains("to"));
            assert!(e.message.contains("amount"));
        }
        Ok(())
    }

    #[tokio::test]
    async fn local_mode_reports_the_smart_account_address() -> eyre::Result<()> {
        let kit = Agentkit::with_local_signer(&test_config(43114)?)?;
        let result = dispatch(&kit, find(&kit, "get_address")?, &json!({})).await;
        let out = result.map_err(|e| eyre::eyre!("unexpected failure: {}", e.message))?;
        assert!(out.message.starts_with("Smart Account: 0x"));
        let addr = out
            .message
            .trim_start_matches("Smart Account: ")
            .to_owned();
        assert_eq!(addr.len(), 42, "42-character hex address, got {addr}");
        Ok(())
    }

    #[tokio::test]
    async fn undersized_swaps_fail_before_any_network_call() -> eyre::Result<()> {
        let mut kit = Agentkit::with_local_signer(&test_config(43114)?)?;
        let fake = Arc::new(FakeSwap::with_status("open"));
        kit.set_swap_api(Arc::clone(&fake) as Arc<dyn SwapApi>);

        let result = dispatch(
            &kit,
            find(&kit, "swap_tokens")?,
            &json!({
                "sell_token": "0x9008D19f58AAbD9eD0D60971565AA8510560ab41",
                "buy_token": "0xC92E8bdf79f0507f65a392b0ab4667716BFE0110",
                "amount": "0.00001",
            }),
        )
        .await;

        let err = result.err();
        assert!(err.is_some(), "expected minimum violation");
        if let Some(e) = err {
            assert_eq!(e.kind, "below_minimum");
            assert!(e.message.contains("0.0001"), "states the minimum: {}", e.message);
        }
        assert_eq!(fake.quotes.load(Ordering::SeqCst), 0, "no quote request");
        Ok(())
    }

    #[tokio::test]
    async fn cancellation_refuses_non_open_orders_without_signing() -> eyre::Result<()> {
        let mut kit = Agentkit::with_local_signer(&test_config(43114)?)?;
        let fake = Arc::new(FakeSwap::with_status("fulfilled"));
        kit.set_swap_api(Arc::clone(&fake) as Arc<dyn SwapApi>);

        let uid = format!("0x{}", "ab".repeat(56));
        let result = dispatch(
            &kit,
            find(&kit, "cancel_swap_order")?,
            &json!({ "order_uid": uid }),
        )
        .await;

        let err = result.err();
        assert!(err.is_some(), "expected refusal");
        if let Some(e) = err {
            assert_eq!(e.kind, "order_not_open");
            assert!(e.message.contains("fulfilled"), "includes status: {}", e.message);
        }
        assert_eq!(fake.cancels.load(Ordering::SeqCst), 0, "sign/submit path untouched");
        Ok(())
    }

    #[tokio::test]
    async fn server_wallet_switch_reports_previous_and_takes_effect() -> eyre::Result<()> {
        let mut kit = Agentkit::read_only(&test_config(43114)?)?;
        kit.set_credentials(CredentialContext::ServerWallet(ServerWallet::new(Arc::new(
            FakeDirectory::with_two_wallets(),
        ))));

        let switched = dispatch(&kit, find(&kit, "use_wallet")?, &json!({ "index": 1 })).await;
        let out = switched.map_err(|e| eyre::eyre!("switch failed: {}", e.message))?;
        assert!(out.message.contains("now #1"));
        assert!(out.message.contains("Previously active: #0"));

        let address = dispatch(&kit, find(&kit, "get_address")?, &json!({})).await;
        let out = address.map_err(|e| eyre::eyre!("address failed: {}", e.message))?;
        assert!(
            out.message.contains("0x2222222222222222222222222222222222222222"),
            "next read reflects wallet 1: {}",
            out.message
        );
        Ok(())
    }

    #[tokio::test]
    async fn remote_mode_revalidates_on_every_dispatch() -> eyre::Result<()> {
        let mut kit = Agentkit::read_only(&test_config(43114)?)?;
        let authority = Arc::new(CountingAuthority::new());
        kit.set_credentials(CredentialContext::Remote(RemoteCredentials::new(
            SecretString::new("key-123".into()),
            Arc::clone(&authority) as Arc<dyn CredentialAuthority>,
            chain_for_id(43114)?,
            "https://rpc.invalid.localhost".to_owned(),
            "https://bundler.invalid.localhost".to_owned(),
        )?));

        for _ in 0..2 {
            let result = dispatch(&kit, find(&kit, "get_address")?, &json!({})).await;
            assert!(result.is_ok(), "address read failed: {result:?}");
        }
        assert_eq!(
            authority.calls.load(Ordering::SeqCst),
            2,
            "one authority round trip per call"
        );
        Ok(())
    }

    #[tokio::test]
    async fn revalidation_failure_is_non_fatal_per_call() -> eyre::Result<()> {
        let mut kit = Agentkit::read_only(&test_config(43114)?)?;
        kit.set_credentials(CredentialContext::Remote(RemoteCredentials::new(
            SecretString::new("key-123".into()),
            Arc::new(CountingAuthority::failing()) as Arc<dyn CredentialAuthority>,
            chain_for_id(43114)?,
            "https://rpc.invalid.localhost".to_owned(),
            "https://bundler.invalid.localhost".to_owned(),
        )?));

        let first = dispatch(&kit, find(&kit, "get_address")?, &json!({})).await;
        let err = first.err();
        assert!(err.is_some(), "expected revalidation failure");
        if let Some(e) = err {
            assert_eq!(e.kind, "reauthorization_failed");
        }

        // The instance survives; the next call fails the same way rather
        // than poisoning the context.
        let second = dispatch(&kit, find(&kit, "get_address")?, &json!({})).await;
        assert!(second.is_err());
        Ok(())
    }
}
