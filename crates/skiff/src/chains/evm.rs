use crate::retry::{with_backoff, BackoffConfig};
use alloy::{
    primitives::{Address, Bytes, B256, U256},
    providers::{Provider as _, RootProvider},
    rpc::types::TransactionReceipt,
    sol,
    sol_types::SolCall as _,
};
use eyre::Context as _;
use reqwest::Client;
use std::{str::FromStr as _, time::Duration};
use tokio::time::sleep;

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_RPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

type EvmProvider = RootProvider;

sol! {
    #[sol(rpc)]
    contract IERC20 {
        function name() external view returns (string);
        function balanceOf(address account) external view returns (uint256);
        function totalSupply() external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function allowance(address owner, address spender) external view returns (uint256);
        function transfer(address to, uint256 value) returns (bool);
        function approve(address spender, uint256 value) returns (bool);
    }
}

/// Minimal token identity used when rendering balances and quotes.
#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub decimals: u8,
    pub symbol: String,
}

/// One EVM chain endpoint: name, id, and its JSON-RPC URL. All reads go
/// through bounded-timeout providers with retry; writes never retry.
#[derive(Debug, Clone)]
pub struct EvmChain {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
}

impl EvmChain {
    pub fn new(name: &str, chain_id: u64, rpc_url: &str) -> Self {
        Self {
            name: name.to_owned(),
            chain_id,
            rpc_url: rpc_url.to_owned(),
        }
    }

    pub fn parse_address(s: &str) -> eyre::Result<Address> {
        Address::from_str(s.trim()).with_context(|| format!("invalid address: {s}"))
    }

    fn provider_for_url(url: &str) -> eyre::Result<EvmProvider> {
        let u: reqwest::Url = url
            .parse()
            .with_context(|| format!("invalid rpc url: {url}"))?;
        let client = Client::builder()
            .timeout(DEFAULT_RPC_TIMEOUT)
            .connect_timeout(DEFAULT_RPC_CONNECT_TIMEOUT)
            .build()
            .context("build rpc http client")?;
        let http = alloy::transports::http::Http::with_client(client, u);
        let rpc_client = alloy::rpc::client::RpcClient::new(http, false);
        Ok(RootProvider::new(rpc_client))
    }

    pub fn provider(&self) -> eyre::Result<EvmProvider> {
        Self::provider_for_url(self.rpc_url.as_str())
    }

    async fn with_retry<T, Fut>(
        &self,
        context_label: &'static str,
        f: impl Fn(EvmProvider) -> Fut + Sync + Send,
    ) -> eyre::Result<T>
    where
        T: Send,
        Fut: std::future::Future<Output = eyre::Result<T>> + Send,
    {
        let cfg = BackoffConfig::default();
        with_backoff(&cfg, context_label, || {
            let url = self.rpc_url.clone();
            let f = &f;
            async move {
                let p = Self::provider_for_url(&url)?;
                f(p).await
            }
        })
        .await
    }

    pub async fn get_native_balance(&self, addr: Address) -> eyre::Result<U256> {
        self.with_retry("get balance", |p| async move {
            let v = p.get_balance(addr).await.context("get balance")?;
            Ok(v)
        })
        .await
    }

    pub async fn get_erc20_balance(
        &self,
        token: Address,
        owner: Address,
    ) -> eyre::Result<(U256, TokenMetadata)> {
        self.with_retry("erc20 balance", |p| async move {
            let c = IERC20::new(token, &p);
            let bal = c.balanceOf(owner).call().await.context("erc20 balanceOf")?;
            let decimals = c.decimals().call().await.context("erc20 decimals")?;
            let symbol = c
                .symbol()
                .call()
                .await
                .unwrap_or_else(|_| "ERC20".to_owned());
            Ok((bal, TokenMetadata { decimals, symbol }))
        })
        .await
    }

    pub async fn get_erc20_metadata(&self, token: Address) -> eyre::Result<TokenMetadata> {
        self.with_retry("erc20 metadata", |p| async move {
            let c = IERC20::new(token, &p);
            let decimals = c.decimals().call().await.context("erc20 decimals")?;
            let symbol = c
                .symbol()
                .call()
                .await
                .unwrap_or_else(|_| "ERC20".to_owned());
            Ok(TokenMetadata { decimals, symbol })
        })
        .await
    }

    pub async fn get_erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> eyre::Result<U256> {
        self.with_retry("erc20 allowance", |p| async move {
            let c = IERC20::new(token, &p);
            let v = c
                .allowance(owner, spender)
                .call()
                .await
                .context("erc20 allowance")?;
            Ok(v)
        })
        .await
    }

    pub async fn get_contract_code(&self, addr: Address) -> eyre::Result<Bytes> {
        self.with_retry("get code", |p| async move {
            let code = p.get_code_at(addr).await.context("get code")?;
            Ok(code)
        })
        .await
    }

    pub async fn get_gas_price(&self) -> eyre::Result<u128> {
        self.with_retry("get gas price", |p| async move {
            let v = p.get_gas_price().await.context("get gas price")?;
            Ok(v)
        })
        .await
    }

    pub async fn get_base_fee(&self) -> eyre::Result<Option<u128>> {
        self.with_retry("get base fee", |p| async move {
            let block = p
                .get_block_by_number(alloy::rpc::types::BlockNumberOrTag::Pending)
                .await
                .context("get pending block")?;
            Ok(block.and_then(|b| b.header.base_fee_per_gas.map(u128::from)))
        })
        .await
    }

    pub async fn get_tx_receipt(&self, tx: B256) -> eyre::Result<Option<TransactionReceipt>> {
        self.with_retry("get tx receipt", |p| async move {
            let r = p
                .get_transaction_receipt(tx)
                .await
                .context("get transaction receipt")?;
            Ok(r)
        })
        .await
    }

    pub async fn wait_for_tx_receipt(
        &self,
        tx: B256,
        timeout: Duration,
    ) -> eyre::Result<TransactionReceipt> {
        let start = std::time::Instant::now();
        loop {
            if start.elapsed() > timeout {
                eyre::bail!("timed out waiting for tx receipt");
            }
            if let Some(r) = self.get_tx_receipt(tx).await? {
                return Ok(r);
            }
            sleep(Duration::from_millis(250)).await;
        }
    }
}

pub fn erc20_transfer_calldata(to: Address, value: U256) -> Bytes {
    Bytes::from(IERC20::transferCall { to, value }.abi_encode())
}

pub fn erc20_approve_calldata(spender: Address, value: U256) -> Bytes {
    Bytes::from(IERC20::approveCall { spender, value }.abi_encode())
}

/// Fee policy for user operations: priority = max(1.5 gwei, gas_price/10),
/// max_fee = base_fee * 2 + priority.
pub fn compute_eip1559_fees(base_fee: u128, gas_price: u128) -> (u128, u128) {
    let min_priority: u128 = 1_500_000_000; // 1.5 gwei
    let priority = std::cmp::max(min_priority, gas_price / 10);

    let mut max_fee = base_fee.saturating_mul(2).saturating_add(priority);
    let min_fee = base_fee.saturating_add(priority);
    if max_fee < min_fee {
        max_fee = min_fee;
    }
    (max_fee, priority)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_policy_enforces_priority_floor() {
        let (max_fee, priority) = compute_eip1559_fees(10_000_000_000, 1_000_000_000);
        assert_eq!(priority, 1_500_000_000, "floor applies when gas price low");
        assert_eq!(max_fee, 10_000_000_000 * 2 + 1_500_000_000);
    }

    #[test]
    fn fee_policy_scales_priority_with_gas_price() {
        let (_, priority) = compute_eip1559_fees(10_000_000_000, 100_000_000_000);
        assert_eq!(priority, 10_000_000_000);
    }

    #[test]
    fn parse_address_rejects_garbage() {
        assert!(EvmChain::parse_address("0x1234").is_err());
        assert!(EvmChain::parse_address("0x9008D19f58AAbD9eD0D60971565AA8510560ab41").is_ok());
    }

    #[test]
    fn transfer_calldata_has_selector() {
        let data = erc20_transfer_calldata(Address::ZERO, U256::from(1_u64));
        // transfer(address,uint256) selector
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data.len(), 4 + 32 + 32);
    }

    #[test]
    fn approve_calldata_has_selector() {
        let data = erc20_approve_calldata(Address::ZERO, U256::MAX);
        // approve(address,uint256) selector
        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
    }
}
