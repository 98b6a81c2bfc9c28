//! Cross-chain bridge order creation. The bridge API builds the full
//! on-chain transaction (including its protocol fee in `value`); we only
//! approve the input token and submit what it returns.

use alloy::primitives::{Address, Bytes, U256};
use eyre::Context as _;
use serde_json::Value;
use std::time::Duration;

const BRIDGE_API_TIMEOUT: Duration = Duration::from_secs(20);

/// Sentinel the bridge API uses for the chain-native asset.
pub const NATIVE_TOKEN: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Clone)]
pub struct BridgeOrderRequest {
    pub src_chain_id: u64,
    pub src_token: String,
    pub amount_base: U256,
    pub dst_chain_id: u64,
    pub dst_token: String,
    pub recipient: String,
}

/// The prepared order: a transaction envelope to submit from the sending
/// account, plus the bridge's own estimate of what arrives on the far side.
#[derive(Debug, Clone)]
pub struct BridgeOrder {
    pub tx_to: Address,
    pub tx_data: Bytes,
    pub tx_value: U256,
    pub order_id: Option<String>,
    pub receive_amount: Option<String>,
    pub fulfillment_delay_sec: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct BridgeClient {
    base_url: String,
    client: reqwest::Client,
}

impl BridgeClient {
    pub fn new(base_url: &str) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(BRIDGE_API_TIMEOUT)
            .build()
            .context("build bridge http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client,
        })
    }

    pub async fn create_order_tx(&self, req: &BridgeOrderRequest) -> eyre::Result<BridgeOrder> {
        let url = format!("{}/dln/order/create-tx", self.base_url);
        let amount = req.amount_base.to_string();
        let src_chain = req.src_chain_id.to_string();
        let dst_chain = req.dst_chain_id.to_string();
        let query: Vec<(&str, &str)> = vec![
            ("srcChainId", src_chain.as_str()),
            ("srcChainTokenIn", req.src_token.as_str()),
            ("srcChainTokenInAmount", amount.as_str()),
            ("dstChainId", dst_chain.as_str()),
            ("dstChainTokenOut", req.dst_token.as_str()),
            ("dstChainTokenOutRecipient", req.recipient.as_str()),
            ("prependOperatingExpenses", "true"),
        ];
        let resp = self
            .client
            .get(url)
            .query(&query)
            .send()
            .await
            .context("bridge order request")?;
        let status = resp.status();
        let v: Value = resp.json().await.context("decode bridge response")?;

        if let Some(msg) = v.get("errorMessage").and_then(Value::as_str) {
            eyre::bail!("bridge rejected the order: {msg}");
        }
        if !status.is_success() {
            eyre::bail!("bridge http {status}");
        }

        let tx = v
            .get("tx")
            .ok_or_else(|| eyre::eyre!("bridge response missing tx envelope"))?;
        let to: Address = tx
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| eyre::eyre!("bridge tx missing to"))?
            .parse()
            .context("parse bridge tx target")?;
        let data: Bytes = tx
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or("0x")
            .parse()
            .context("parse bridge tx data")?;
        let value = tx
            .get("value")
            .and_then(Value::as_str)
            .map(|s| {
                s.strip_prefix("0x").map_or_else(
                    || s.parse::<U256>().context("parse bridge tx value"),
                    |h| U256::from_str_radix(h, 16).context("parse bridge tx value"),
                )
            })
            .transpose()?
            .unwrap_or(U256::ZERO);

        Ok(BridgeOrder {
            tx_to: to,
            tx_data: data,
            tx_value: value,
            order_id: v
                .get("orderId")
                .and_then(Value::as_str)
                .map(str::to_owned),
            receive_amount: v
                .pointer("/estimation/dstChainTokenOut/amount")
                .and_then(Value::as_str)
                .map(str::to_owned),
            fulfillment_delay_sec: v
                .pointer("/order/approximateFulfillmentDelay")
                .and_then(Value::as_u64),
        })
    }
}
