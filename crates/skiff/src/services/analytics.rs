//! Token-analytics GraphQL client. Read-only; used to evaluate tokens
//! before trading them.

use eyre::Context as _;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::{str::FromStr as _, time::Duration};

const ANALYTICS_TIMEOUT: Duration = Duration::from_secs(15);

const TOKEN_QUERY: &str = "\
query TokenDetails($address: String!, $networkId: Int!) {\n\
  token(input: { address: $address, networkId: $networkId }) {\n\
    name\n\
    symbol\n\
    info { circulatingSupply }\n\
    priceUSD\n\
    liquidity\n\
    volume24\n\
    holders\n\
  }\n\
}";

#[derive(Debug, Clone)]
pub struct TokenDetails {
    pub name: String,
    pub symbol: String,
    pub price_usd: Option<Decimal>,
    pub liquidity_usd: Option<Decimal>,
    pub volume_24h_usd: Option<Decimal>,
    pub holders: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AnalyticsClient {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

fn decimal_field(v: &Value, field: &str) -> Option<Decimal> {
    match v.get(field) {
        Some(Value::String(s)) => Decimal::from_str(s).ok(),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

impl AnalyticsClient {
    pub fn new(url: &str, api_key: &str) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(ANALYTICS_TIMEOUT)
            .build()
            .context("build analytics http client")?;
        Ok(Self {
            url: url.to_owned(),
            api_key: api_key.to_owned(),
            client,
        })
    }

    pub async fn token_details(&self, chain_id: u64, token: &str) -> eyre::Result<TokenDetails> {
        let body = json!({
            "query": TOKEN_QUERY,
            "variables": { "address": token, "networkId": chain_id },
        });
        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("analytics request")?;
        let status = resp.status();
        if !status.is_success() {
            eyre::bail!("analytics http {status}");
        }
        let v: Value = resp.json().await.context("decode analytics response")?;
        if let Some(errors) = v.get("errors").and_then(Value::as_array) {
            if let Some(first) = errors.first() {
                let msg = first
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown graphql error");
                eyre::bail!("analytics query failed: {msg}");
            }
        }
        let t = v
            .pointer("/data/token")
            .filter(|x| !x.is_null())
            .ok_or_else(|| eyre::eyre!("token not found in analytics dataset: {token}"))?;
        Ok(TokenDetails {
            name: t
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_owned(),
            symbol: t
                .get("symbol")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_owned(),
            price_usd: decimal_field(t, "priceUSD"),
            liquidity_usd: decimal_field(t, "liquidity"),
            volume_24h_usd: decimal_field(t, "volume24"),
            holders: t.get("holders").and_then(Value::as_u64),
        })
    }
}

impl TokenDetails {
    /// One-paragraph rendering for the agent channel.
    pub fn summarize(&self, token: &str) -> String {
        let mut parts = vec![format!("{} ({}) at {token}", self.name, self.symbol)];
        if let Some(p) = self.price_usd {
            parts.push(format!("price ${p}"));
        }
        if let Some(l) = self.liquidity_usd {
            parts.push(format!("liquidity ${l}"));
        }
        if let Some(vol) = self.volume_24h_usd {
            parts.push(format!("24h volume ${vol}"));
        }
        if let Some(h) = self.holders {
            parts.push(format!("{h} holders"));
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_field_accepts_strings_and_numbers() {
        let v = json!({ "a": "1.25", "b": 3, "c": true });
        assert_eq!(decimal_field(&v, "a"), Decimal::from_str("1.25").ok());
        assert_eq!(decimal_field(&v, "b"), Decimal::from_str("3").ok());
        assert_eq!(decimal_field(&v, "c"), None);
        assert_eq!(decimal_field(&v, "missing"), None);
    }

    #[test]
    fn summary_includes_known_fields_only() {
        let d = TokenDetails {
            name: "Wrapped AVAX".into(),
            symbol: "WAVAX".into(),
            price_usd: Decimal::from_str("31.5").ok(),
            liquidity_usd: None,
            volume_24h_usd: None,
            holders: Some(1200),
        };
        let s = d.summarize("0xb31f66aa3c1e785363f0875a1b74e27b85fd66c7");
        assert!(s.contains("WAVAX"));
        assert!(s.contains("price $31.5"));
        assert!(s.contains("1200 holders"));
        assert!(!s.contains("liquidity"));
    }
}
