//! Batch-auction DEX order book client: quotes, order placement, status and
//! cancellation. Orders are signed EIP-712 by the account owner key; the
//! settlement contract recovers a plain ECDSA signer, which is exactly where
//! smart-account incompatibilities surface (see [`classify_rejection`]).

use crate::config::SETTLEMENT;
use alloy::{
    primitives::{b256, Address, B256, U256},
    signers::{local::PrivateKeySigner, SignerSync as _},
    sol,
    sol_types::{Eip712Domain, SolStruct as _},
};
use async_trait::async_trait;
use eyre::Context as _;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::{str::FromStr as _, time::Duration};

const SWAP_API_TIMEOUT: Duration = Duration::from_secs(20);

/// Documented order book minimum. Orders selling less than this are
/// rejected locally, before any network traffic.
pub const MIN_SELL_UI: &str = "0.0001";

// keccak256("sell") / keccak256("erc20"), fixed by the settlement domain.
const KIND_SELL: B256 = b256!("f3b277728b3fee749481eb3e0b3b48980dbbab78658fc419025cb16eee346775");
const BALANCE_ERC20: B256 =
    b256!("5a28e9363bb942b639270062aa6bb295f434bcdfc42c97267bf003f272060dc9");

sol! {
    struct OrderData {
        address sellToken;
        address buyToken;
        address receiver;
        uint256 sellAmount;
        uint256 buyAmount;
        uint32 validTo;
        bytes32 appData;
        uint256 feeAmount;
        bytes32 kind;
        bool partiallyFillable;
        bytes32 sellTokenBalance;
        bytes32 buyTokenBalance;
    }

    struct OrderCancellations {
        bytes[] orderUids;
    }
}

fn settlement_domain(chain_id: u64) -> Eip712Domain {
    Eip712Domain::new(
        Some("Gnosis Protocol".into()),
        Some("v2".into()),
        Some(U256::from(chain_id)),
        Some(SETTLEMENT),
        None,
    )
}

#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub sell_token: Address,
    pub buy_token: Address,
    pub from: Address,
    pub sell_amount_before_fee: U256,
}

#[derive(Debug, Clone)]
pub struct Quote {
    pub sell_amount: U256,
    pub buy_amount: U256,
    pub fee_amount: U256,
    pub valid_to: u32,
}

#[derive(Debug, Clone)]
pub struct OrderStatus {
    pub uid: String,
    pub status: String,
    pub executed_buy_amount: Option<String>,
}

/// A fully built sell order plus its owner signature, ready for the order
/// book. `owner` is the account the settlement debits (the smart account);
/// `signature` recovers to the EOA owner key.
#[derive(Debug, Clone)]
pub struct SignedOrder {
    pub owner: Address,
    pub sell_token: Address,
    pub buy_token: Address,
    pub receiver: Address,
    pub sell_amount: U256,
    pub buy_amount: U256,
    pub valid_to: u32,
    pub fee_amount: U256,
    pub app_data: B256,
    pub signature: String,
}

#[derive(Debug, Clone)]
pub struct SignedCancellation {
    pub order_uid: String,
    pub signature: String,
}

/// Order placement failures, split so callers can turn the signature-scheme
/// case into actionable guidance instead of surfacing raw API text.
#[derive(Debug)]
pub enum PlacementError {
    /// The order book refused the signature because the recovered signer
    /// differs from the order owner (smart account vs ECDSA).
    SignatureScheme { description: String },
    /// Any other structured rejection from the order book.
    Rejected { description: String },
    Transport(eyre::Report),
}

/// Enforce the documented minimum sell amount. Pure string/decimal math,
/// run before any network I/O (even the token-metadata read) so undersized
/// orders never leave the process.
pub fn check_min_sell(amount_ui: &str, token_label: &str) -> Result<(), String> {
    let amount = Decimal::from_str(amount_ui.trim())
        .map_err(|_| format!("sell amount is not a decimal number: {amount_ui}"))?;
    let min = Decimal::from_str(MIN_SELL_UI).unwrap_or(Decimal::ONE);
    if amount < min {
        return Err(format!(
            "sell amount {amount_ui} is below the protocol minimum; the minimum sell amount is {MIN_SELL_UI} {token_label}"
        ));
    }
    Ok(())
}

/// Map an order book rejection to a typed error. Prefers the structured
/// `errorType` code; plain-text matching is the isolated fallback for
/// responses without one.
pub fn classify_rejection(http_status: u16, body: &str) -> PlacementError {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        let error_type = v.get("errorType").and_then(Value::as_str).unwrap_or("");
        let description = v
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or(body)
            .to_owned();
        if matches!(
            error_type,
            "InvalidSignature" | "WrongOwner" | "UnsupportedSignatureScheme"
        ) {
            return PlacementError::SignatureScheme { description };
        }
        if !error_type.is_empty() {
            return PlacementError::Rejected { description };
        }
    }
    // Fallback only: no structured code in the body.
    if body.to_lowercase().contains("signature") {
        return PlacementError::SignatureScheme {
            description: body.to_owned(),
        };
    }
    PlacementError::Rejected {
        description: format!("order book http {http_status}: {body}"),
    }
}

/// Sign a sell order for the settlement domain with the owner key.
pub fn sign_order(
    signer: &PrivateKeySigner,
    chain_id: u64,
    owner: Address,
    quote: &Quote,
    sell_token: Address,
    buy_token: Address,
    buy_amount_min: U256,
) -> eyre::Result<SignedOrder> {
    let data = OrderData {
        sellToken: sell_token,
        buyToken: buy_token,
        receiver: owner,
        sellAmount: quote.sell_amount,
        buyAmount: buy_amount_min,
        validTo: quote.valid_to,
        appData: B256::ZERO,
        feeAmount: quote.fee_amount,
        kind: KIND_SELL,
        partiallyFillable: false,
        sellTokenBalance: BALANCE_ERC20,
        buyTokenBalance: BALANCE_ERC20,
    };
    let hash = data.eip712_signing_hash(&settlement_domain(chain_id));
    let sig = signer.sign_hash_sync(&hash).context("sign order")?;
    Ok(SignedOrder {
        owner,
        sell_token,
        buy_token,
        receiver: owner,
        sell_amount: quote.sell_amount,
        buy_amount: buy_amount_min,
        valid_to: quote.valid_to,
        fee_amount: quote.fee_amount,
        app_data: B256::ZERO,
        signature: format!("0x{}", hex::encode(sig.as_bytes())),
    })
}

/// Sign an order cancellation for the settlement domain.
pub fn sign_cancellation(
    signer: &PrivateKeySigner,
    chain_id: u64,
    order_uid: &str,
) -> eyre::Result<SignedCancellation> {
    let uid_bytes = hex::decode(order_uid.trim_start_matches("0x")).context("decode order uid")?;
    let data = OrderCancellations {
        orderUids: vec![uid_bytes.into()],
    };
    let hash = data.eip712_signing_hash(&settlement_domain(chain_id));
    let sig = signer.sign_hash_sync(&hash).context("sign cancellation")?;
    Ok(SignedCancellation {
        order_uid: order_uid.to_owned(),
        signature: format!("0x{}", hex::encode(sig.as_bytes())),
    })
}

#[async_trait]
pub trait SwapApi: Send + Sync {
    async fn get_quote(&self, req: &QuoteRequest) -> eyre::Result<Quote>;
    async fn get_order(&self, uid: &str) -> eyre::Result<OrderStatus>;
    async fn place_order(&self, order: &SignedOrder) -> Result<String, PlacementError>;
    async fn cancel_order(&self, cancellation: &SignedCancellation) -> eyre::Result<()>;
}

#[derive(Debug, Clone)]
pub struct HttpSwapApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSwapApi {
    pub fn new(base_url: &str) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SWAP_API_TIMEOUT)
            .build()
            .context("build swap http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.base_url)
    }
}

fn parse_u256_field(v: &Value, field: &str) -> eyre::Result<U256> {
    let s = v
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| eyre::eyre!("quote missing {field}"))?;
    s.parse().with_context(|| format!("parse {field}"))
}

#[async_trait]
impl SwapApi for HttpSwapApi {
    async fn get_quote(&self, req: &QuoteRequest) -> eyre::Result<Quote> {
        let body = json!({
            "sellToken": req.sell_token.to_string(),
            "buyToken": req.buy_token.to_string(),
            "from": req.from.to_string(),
            "kind": "sell",
            "sellAmountBeforeFee": req.sell_amount_before_fee.to_string(),
            "signingScheme": "eip712",
        });
        let resp = self
            .client
            .post(self.url("quote"))
            .json(&body)
            .send()
            .await
            .context("quote request")?;
        let status = resp.status();
        let v: Value = resp.json().await.context("decode quote response")?;
        if !status.is_success() {
            let description = v
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("quote rejected");
            eyre::bail!("quote failed (http {status}): {description}");
        }
        let q = v
            .get("quote")
            .ok_or_else(|| eyre::eyre!("quote response missing quote body"))?;
        Ok(Quote {
            sell_amount: parse_u256_field(q, "sellAmount")?,
            buy_amount: parse_u256_field(q, "buyAmount")?,
            fee_amount: parse_u256_field(q, "feeAmount")?,
            valid_to: q
                .get("validTo")
                .and_then(Value::as_u64)
                .and_then(|x| u32::try_from(x).ok())
                .ok_or_else(|| eyre::eyre!("quote missing validTo"))?,
        })
    }

    async fn get_order(&self, uid: &str) -> eyre::Result<OrderStatus> {
        let resp = self
            .client
            .get(self.url(&format!("orders/{uid}")))
            .send()
            .await
            .context("order status request")?;
        let status = resp.status();
        if status.as_u16() == 404 {
            eyre::bail!("order not found: {uid}");
        }
        if !status.is_success() {
            eyre::bail!("order status http {status}");
        }
        let v: Value = resp.json().await.context("decode order status")?;
        Ok(OrderStatus {
            uid: uid.to_owned(),
            status: v
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_owned(),
            executed_buy_amount: v
                .get("executedBuyAmount")
                .and_then(Value::as_str)
                .map(str::to_owned),
        })
    }

    async fn place_order(&self, order: &SignedOrder) -> Result<String, PlacementError> {
        let body = json!({
            "sellToken": order.sell_token.to_string(),
            "buyToken": order.buy_token.to_string(),
            "receiver": order.receiver.to_string(),
            "sellAmount": order.sell_amount.to_string(),
            "buyAmount": order.buy_amount.to_string(),
            "validTo": order.valid_to,
            "appData": order.app_data.to_string(),
            "feeAmount": order.fee_amount.to_string(),
            "kind": "sell",
            "partiallyFillable": false,
            "sellTokenBalance": "erc20",
            "buyTokenBalance": "erc20",
            "signingScheme": "eip712",
            "signature": order.signature,
            "from": order.owner.to_string(),
        });
        let resp = self
            .client
            .post(self.url("orders"))
            .json(&body)
            .send()
            .await
            .map_err(|e| PlacementError::Transport(eyre::Report::new(e)))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| PlacementError::Transport(eyre::Report::new(e)))?;
        if !status.is_success() {
            return Err(classify_rejection(status.as_u16(), &text));
        }
        // The order book answers with the bare uid as a JSON string.
        let uid = serde_json::from_str::<String>(&text).unwrap_or(text);
        Ok(uid)
    }

    async fn cancel_order(&self, cancellation: &SignedCancellation) -> eyre::Result<()> {
        let body = json!({
            "orderUids": [cancellation.order_uid],
            "signature": cancellation.signature,
            "signingScheme": "eip712",
        });
        let resp = self
            .client
            .delete(self.url("orders"))
            .json(&body)
            .send()
            .await
            .context("cancel request")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            eyre::bail!("cancellation rejected (http {status}): {text}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_sell_is_enforced_below_threshold() {
        let err = check_min_sell("0.00009", "USDC").err();
        assert!(err.is_some(), "expected minimum violation");
        if let Some(msg) = err {
            assert!(msg.contains(MIN_SELL_UI), "message states the minimum");
            assert!(msg.contains("USDC"));
        }
        assert!(check_min_sell("0.0001", "USDC").is_ok());
        assert!(check_min_sell("5", "USDC").is_ok());
    }

    #[test]
    fn min_sell_rejects_non_numeric_amounts() {
        assert!(check_min_sell("lots", "USDC").is_err());
    }

    #[test]
    fn rejection_classifier_prefers_structured_code() {
        let body = r#"{"errorType":"InvalidSignature","description":"recovered signer mismatch"}"#;
        let rejection = classify_rejection(400, body);
        assert!(
            matches!(
                &rejection,
                PlacementError::SignatureScheme { description }
                    if description.contains("recovered signer")
            ),
            "expected signature scheme error, got {rejection:?}"
        );
    }

    #[test]
    fn rejection_classifier_text_fallback_is_last_resort() {
        let fallback = classify_rejection(400, "bad signature bytes");
        assert!(
            matches!(fallback, PlacementError::SignatureScheme { .. }),
            "expected signature scheme error, got {fallback:?}"
        );

        let structured =
            classify_rejection(400, r#"{"errorType":"InsufficientBalance","description":"x"}"#);
        assert!(
            matches!(structured, PlacementError::Rejected { .. }),
            "expected plain rejection, got {structured:?}"
        );
    }

    #[test]
    fn order_signature_is_sixty_five_bytes() -> eyre::Result<()> {
        let signer = PrivateKeySigner::random();
        let quote = Quote {
            sell_amount: U256::from(1_000_000_u64),
            buy_amount: U256::from(500_000_u64),
            fee_amount: U256::from(100_u64),
            valid_to: 1_900_000_000,
        };
        let order = sign_order(
            &signer,
            43114,
            signer.address(),
            &quote,
            Address::ZERO,
            Address::repeat_byte(1),
            U256::from(490_000_u64),
        )?;
        let raw = hex::decode(order.signature.trim_start_matches("0x"))?;
        assert_eq!(raw.len(), 65);
        Ok(())
    }

    #[test]
    fn cancellation_signing_round_trips_uid() -> eyre::Result<()> {
        let signer = PrivateKeySigner::random();
        let uid = format!("0x{}", hex::encode([0xab_u8; 56]));
        let c = sign_cancellation(&signer, 43114, &uid)?;
        assert_eq!(c.order_uid, uid);
        assert!(c.signature.starts_with("0x"));
        Ok(())
    }
}
