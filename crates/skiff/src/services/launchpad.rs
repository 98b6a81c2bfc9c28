//! Meme-token launch service. The REST side signs the launch parameters;
//! the factory contract on chain verifies that signature when the account
//! submits the creation call.

use alloy::{
    primitives::{Address, Bytes, U256},
    sol,
    sol_types::SolCall as _,
};
use eyre::Context as _;
use serde_json::{json, Value};
use std::time::Duration;

const LAUNCHPAD_TIMEOUT: Duration = Duration::from_secs(20);

sol! {
    contract ITokenFactory {
        function createToken(bytes createArg, bytes sign) external payable;
    }
}

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub creator: Address,
    pub chain_id: u64,
    /// Optional creator buy-in, in native base units, executed atomically
    /// with the launch.
    pub initial_buy_base: U256,
}

/// Signed launch parameters returned by the service, ready for the factory.
#[derive(Debug, Clone)]
pub struct LaunchTicket {
    pub create_arg: Bytes,
    pub signature: Bytes,
    pub value: U256,
    pub predicted_address: Option<Address>,
}

pub fn create_token_calldata(ticket: &LaunchTicket) -> Bytes {
    Bytes::from(
        ITokenFactory::createTokenCall {
            createArg: ticket.create_arg.clone(),
            sign: ticket.signature.clone(),
        }
        .abi_encode(),
    )
}

#[derive(Debug, Clone)]
pub struct LaunchpadClient {
    base_url: String,
    client: reqwest::Client,
}

impl LaunchpadClient {
    pub fn new(base_url: &str) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(LAUNCHPAD_TIMEOUT)
            .build()
            .context("build launchpad http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client,
        })
    }

    pub async fn prepare_launch(&self, req: &LaunchRequest) -> eyre::Result<LaunchTicket> {
        let url = format!("{}/v1/tokens", self.base_url);
        let body = json!({
            "name": req.name,
            "symbol": req.symbol,
            "description": req.description,
            "creator": req.creator.to_string(),
            "chain_id": req.chain_id,
            "initial_buy": req.initial_buy_base.to_string(),
        });
        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("launchpad request")?;
        let status = resp.status();
        let v: Value = resp.json().await.context("decode launchpad response")?;
        if !status.is_success() {
            let msg = v
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("launch rejected");
            eyre::bail!("launchpad refused the token (http {status}): {msg}");
        }

        let data = v.get("data").unwrap_or(&v);
        let create_arg: Bytes = data
            .get("create_arg")
            .and_then(Value::as_str)
            .ok_or_else(|| eyre::eyre!("launchpad response missing create_arg"))?
            .parse()
            .context("parse create_arg")?;
        let signature: Bytes = data
            .get("signature")
            .and_then(Value::as_str)
            .ok_or_else(|| eyre::eyre!("launchpad response missing signature"))?
            .parse()
            .context("parse launch signature")?;
        let value = data
            .get("value")
            .and_then(Value::as_str)
            .map(|s| s.parse::<U256>().context("parse launch value"))
            .transpose()?
            .unwrap_or(req.initial_buy_base);
        let predicted_address = data
            .get("token_address")
            .and_then(Value::as_str)
            .map(|s| s.parse::<Address>().context("parse predicted token address"))
            .transpose()?;

        Ok(LaunchTicket {
            create_arg,
            signature,
            value,
            predicted_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_token_calldata_embeds_both_payloads() {
        let ticket = LaunchTicket {
            create_arg: Bytes::from(vec![0x11; 8]),
            signature: Bytes::from(vec![0x22; 65]),
            value: U256::ZERO,
            predicted_address: None,
        };
        let data = create_token_calldata(&ticket);
        assert!(data.len() > 4 + 8 + 65, "selector + offsets + payloads");
    }
}
