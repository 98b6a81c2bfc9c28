//! Thin client for the account-abstraction surface: counterfactual account
//! addresses, user-operation construction/signing, and the bundler/paymaster
//! JSON-RPC endpoints. Validation and bundling semantics stay on the other
//! side of this boundary.

use crate::chains::evm::{compute_eip1559_fees, EvmChain};
use crate::config::{ACCOUNT_FACTORY, ACCOUNT_PROXY_INIT_CODE_HASH, ENTRY_POINT};
use alloy::{
    primitives::{aliases::U192, keccak256, Address, Bytes, B256, U256},
    signers::{local::PrivateKeySigner, SignerSync as _},
    sol,
    sol_types::{SolCall as _, SolValue as _},
};
use eyre::Context as _;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

const USER_OP_WAIT_TIMEOUT: Duration = Duration::from_secs(90);
const USER_OP_POLL_INTERVAL: Duration = Duration::from_millis(1500);

sol! {
    #[sol(rpc)]
    contract IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }

    contract IAccountFactory {
        function createAccount(address owner, uint256 index) external returns (address);
    }

    contract ISmartAccount {
        function execute(address dest, uint256 value, bytes calldata func) external;
        function executeBatch(address[] calldata dest, uint256[] calldata value, bytes[] calldata func) external;
    }
}

/// A single inner call carried by a user operation.
#[derive(Debug, Clone)]
pub struct Call {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Outcome of a user-operation submission. `tx_hash` is only present after
/// the bundler reports inclusion (i.e. when the caller waited).
#[derive(Debug, Clone)]
pub struct Submission {
    pub user_op_hash: B256,
    pub tx_hash: Option<B256>,
    pub confirmed: bool,
}

/// ERC-4337 v0.6 user operation with native field types. Converted to the
/// camelCase hex-quantity wire shape only at the RPC boundary.
#[derive(Debug, Clone)]
pub struct UserOp {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOp {
    pub fn to_rpc_value(&self) -> Value {
        json!({
            "sender": self.sender.to_string(),
            "nonce": format!("0x{:x}", self.nonce),
            "initCode": self.init_code.to_string(),
            "callData": self.call_data.to_string(),
            "callGasLimit": format!("0x{:x}", self.call_gas_limit),
            "verificationGasLimit": format!("0x{:x}", self.verification_gas_limit),
            "preVerificationGas": format!("0x{:x}", self.pre_verification_gas),
            "maxFeePerGas": format!("0x{:x}", self.max_fee_per_gas),
            "maxPriorityFeePerGas": format!("0x{:x}", self.max_priority_fee_per_gas),
            "paymasterAndData": self.paymaster_and_data.to_string(),
            "signature": self.signature.to_string(),
        })
    }
}

/// The v0.6 user-operation hash: keccak over the packed op, the entry point
/// and the chain id. Computed locally so signing needs no extra round trip.
pub fn user_op_hash(op: &UserOp, entry_point: Address, chain_id: u64) -> B256 {
    let packed = (
        op.sender,
        op.nonce,
        keccak256(&op.init_code),
        keccak256(&op.call_data),
        op.call_gas_limit,
        op.verification_gas_limit,
        op.pre_verification_gas,
        op.max_fee_per_gas,
        op.max_priority_fee_per_gas,
        keccak256(&op.paymaster_and_data),
    )
        .abi_encode();
    keccak256((keccak256(packed), entry_point, U256::from(chain_id)).abi_encode())
}

/// Predict the account address offline, the same CREATE2 derivation the
/// factory performs on deployment.
pub fn counterfactual_address(owner: Address, index: U256) -> Address {
    let salt = keccak256((owner, index).abi_encode());
    ACCOUNT_FACTORY.create2(salt, ACCOUNT_PROXY_INIT_CODE_HASH)
}

fn parse_quantity(v: &Value) -> eyre::Result<U256> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            if let Some(hexpart) = s.strip_prefix("0x") {
                U256::from_str_radix(hexpart, 16).context("parse hex quantity")
            } else {
                U256::from_str_radix(s, 10).context("parse decimal quantity")
            }
        }
        Value::Number(n) => {
            let u = n.as_u64().ok_or_else(|| eyre::eyre!("negative quantity"))?;
            Ok(U256::from(u))
        }
        _ => eyre::bail!("unexpected quantity shape: {v}"),
    }
}

fn parse_hash(v: &Value) -> eyre::Result<B256> {
    let s = v.as_str().ok_or_else(|| eyre::eyre!("expected hash string"))?;
    s.trim().parse().context("parse 32-byte hash")
}

/// Gas limits + paymaster data returned by `pm_sponsorUserOperation`.
#[derive(Debug, Clone)]
pub struct Sponsorship {
    pub paymaster_and_data: Bytes,
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
}

/// JSON-RPC client for one bundler/paymaster endpoint.
#[derive(Debug, Clone)]
pub struct BundlerClient {
    url: String,
    client: reqwest::Client,
}

impl BundlerClient {
    pub fn new(url: String) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build bundler http client")?;
        Ok(Self { url, client })
    }

    async fn call(&self, method: &str, params: Value) -> eyre::Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("bundler rpc {method}"))?;
        let status = resp.status();
        let v: Value = resp
            .json()
            .await
            .with_context(|| format!("decode bundler response for {method}"))?;
        if let Some(err) = v.get("error") {
            let msg = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown bundler error");
            eyre::bail!("bundler rejected {method}: {msg}");
        }
        if !status.is_success() {
            eyre::bail!("bundler http {status} for {method}");
        }
        v.get("result")
            .cloned()
            .ok_or_else(|| eyre::eyre!("bundler response missing result for {method}"))
    }

    pub async fn sponsor_user_operation(&self, op: &UserOp) -> eyre::Result<Sponsorship> {
        let result = self
            .call(
                "pm_sponsorUserOperation",
                json!([op.to_rpc_value(), ENTRY_POINT.to_string()]),
            )
            .await?;
        let pad = result
            .get("paymasterAndData")
            .and_then(Value::as_str)
            .ok_or_else(|| eyre::eyre!("paymaster response missing paymasterAndData"))?;
        Ok(Sponsorship {
            paymaster_and_data: pad.parse().context("parse paymasterAndData")?,
            pre_verification_gas: parse_quantity(
                result
                    .get("preVerificationGas")
                    .unwrap_or(&Value::String("0x0".into())),
            )?,
            verification_gas_limit: parse_quantity(
                result
                    .get("verificationGasLimit")
                    .unwrap_or(&Value::String("0x0".into())),
            )?,
            call_gas_limit: parse_quantity(
                result
                    .get("callGasLimit")
                    .unwrap_or(&Value::String("0x0".into())),
            )?,
        })
    }

    pub async fn send_user_operation(&self, op: &UserOp) -> eyre::Result<B256> {
        let result = self
            .call(
                "eth_sendUserOperation",
                json!([op.to_rpc_value(), ENTRY_POINT.to_string()]),
            )
            .await?;
        parse_hash(&result)
    }

    /// `None` while the op is still pending in the mempool.
    pub async fn get_user_operation_receipt(
        &self,
        user_op_hash: B256,
    ) -> eyre::Result<Option<(B256, bool)>> {
        let result = self
            .call(
                "eth_getUserOperationReceipt",
                json!([user_op_hash.to_string()]),
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let success = result
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let tx_hash = result
            .get("receipt")
            .and_then(|r| r.get("transactionHash"))
            .map(parse_hash)
            .transpose()?
            .ok_or_else(|| eyre::eyre!("user op receipt missing transactionHash"))?;
        Ok(Some((tx_hash, success)))
    }
}

/// A configured smart account: owner signer, target chain, bundler binding
/// and the predicted account address. Built once per credential context.
#[derive(Debug, Clone)]
pub struct SmartAccount {
    owner: PrivateKeySigner,
    chain: EvmChain,
    index: U256,
    address: Address,
    bundler: BundlerClient,
}

impl SmartAccount {
    pub fn new(
        owner: PrivateKeySigner,
        chain: EvmChain,
        bundler_url: String,
        index: U256,
    ) -> eyre::Result<Self> {
        let address = counterfactual_address(owner.address(), index);
        Ok(Self {
            owner,
            chain,
            index,
            address,
            bundler: BundlerClient::new(bundler_url)?,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner_signer(&self) -> &PrivateKeySigner {
        &self.owner
    }

    fn init_code(&self) -> Bytes {
        let call = IAccountFactory::createAccountCall {
            owner: self.owner.address(),
            index: self.index,
        }
        .abi_encode();
        let mut out = Vec::with_capacity(20 + call.len());
        out.extend_from_slice(ACCOUNT_FACTORY.as_slice());
        out.extend_from_slice(&call);
        Bytes::from(out)
    }

    fn encode_calls(calls: &[Call]) -> eyre::Result<Bytes> {
        match calls {
            [] => eyre::bail!("no calls to execute"),
            [only] => Ok(Bytes::from(
                ISmartAccount::executeCall {
                    dest: only.to,
                    value: only.value,
                    func: only.data.clone(),
                }
                .abi_encode(),
            )),
            many => Ok(Bytes::from(
                ISmartAccount::executeBatchCall {
                    dest: many.iter().map(|c| c.to).collect(),
                    value: many.iter().map(|c| c.value).collect(),
                    func: many.iter().map(|c| c.data.clone()).collect(),
                }
                .abi_encode(),
            )),
        }
    }

    async fn next_nonce(&self) -> eyre::Result<U256> {
        let provider = self.chain.provider()?;
        let ep = IEntryPoint::new(ENTRY_POINT, &provider);
        let nonce = ep
            .getNonce(self.address, U192::ZERO)
            .call()
            .await
            .context("entry point getNonce")?;
        Ok(nonce)
    }

    /// Build, sponsor, sign and submit a user operation carrying `calls`.
    /// Dependent calls must already be ordered by the caller; they execute
    /// atomically in order inside the account.
    pub async fn execute(&self, calls: &[Call], wait: bool) -> eyre::Result<Submission> {
        let call_data = Self::encode_calls(calls)?;
        let nonce = self.next_nonce().await?;

        let deployed = !self.chain.get_contract_code(self.address).await?.is_empty();
        let init_code = if deployed {
            Bytes::new()
        } else {
            self.init_code()
        };

        let gas_price = self.chain.get_gas_price().await?;
        let base_fee = self.chain.get_base_fee().await?.unwrap_or(gas_price);
        let (max_fee, priority) = compute_eip1559_fees(base_fee, gas_price);

        let mut op = UserOp {
            sender: self.address,
            nonce,
            init_code,
            call_data,
            call_gas_limit: U256::ZERO,
            verification_gas_limit: U256::ZERO,
            pre_verification_gas: U256::ZERO,
            max_fee_per_gas: U256::from(max_fee),
            max_priority_fee_per_gas: U256::from(priority),
            paymaster_and_data: Bytes::new(),
            // Placeholder with the final signature's length so gas estimation
            // on the paymaster side is stable.
            signature: Bytes::from(vec![0_u8; 65]),
        };

        let sponsorship = self
            .bundler
            .sponsor_user_operation(&op)
            .await
            .context("paymaster sponsorship")?;
        op.paymaster_and_data = sponsorship.paymaster_and_data;
        op.pre_verification_gas = sponsorship.pre_verification_gas;
        op.verification_gas_limit = sponsorship.verification_gas_limit;
        op.call_gas_limit = sponsorship.call_gas_limit;

        let hash = user_op_hash(&op, ENTRY_POINT, self.chain.chain_id);
        let sig = self
            .owner
            .sign_message_sync(hash.as_slice())
            .context("sign user operation")?;
        op.signature = Bytes::from(sig.as_bytes().to_vec());

        let user_op_hash = self.bundler.send_user_operation(&op).await?;

        if !wait {
            return Ok(Submission {
                user_op_hash,
                tx_hash: None,
                confirmed: false,
            });
        }

        let start = std::time::Instant::now();
        loop {
            if start.elapsed() > USER_OP_WAIT_TIMEOUT {
                eyre::bail!("timed out waiting for user operation {user_op_hash}");
            }
            if let Some((tx_hash, success)) =
                self.bundler.get_user_operation_receipt(user_op_hash).await?
            {
                return Ok(Submission {
                    user_op_hash,
                    tx_hash: Some(tx_hash),
                    confirmed: success,
                });
            }
            sleep(USER_OP_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn owner() -> Address {
        address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
    }

    #[test]
    fn counterfactual_address_is_deterministic() {
        let a = counterfactual_address(owner(), U256::ZERO);
        let b = counterfactual_address(owner(), U256::ZERO);
        assert_eq!(a, b);
        let s = a.to_string();
        assert_eq!(s.len(), 42, "0x + 40 hex chars");
        assert!(s.starts_with("0x"));
    }

    #[test]
    fn counterfactual_address_varies_with_index() {
        let a = counterfactual_address(owner(), U256::ZERO);
        let b = counterfactual_address(owner(), U256::from(1_u64));
        assert_ne!(a, b);
    }

    #[test]
    fn user_op_hash_binds_chain_id() {
        let op = UserOp {
            sender: owner(),
            nonce: U256::ZERO,
            init_code: Bytes::new(),
            call_data: Bytes::new(),
            call_gas_limit: U256::ZERO,
            verification_gas_limit: U256::ZERO,
            pre_verification_gas: U256::ZERO,
            max_fee_per_gas: U256::ZERO,
            max_priority_fee_per_gas: U256::ZERO,
            paymaster_and_data: Bytes::new(),
            signature: Bytes::new(),
        };
        let h1 = user_op_hash(&op, ENTRY_POINT, 43114);
        let h2 = user_op_hash(&op, ENTRY_POINT, 8453);
        assert_ne!(h1, h2);
    }

    #[test]
    fn rpc_shape_uses_camel_case_hex_quantities() {
        let op = UserOp {
            sender: owner(),
            nonce: U256::from(7_u64),
            init_code: Bytes::new(),
            call_data: Bytes::from(vec![0xde, 0xad]),
            call_gas_limit: U256::from(100_000_u64),
            verification_gas_limit: U256::from(80_000_u64),
            pre_verification_gas: U256::from(21_000_u64),
            max_fee_per_gas: U256::from(2_u64),
            max_priority_fee_per_gas: U256::from(1_u64),
            paymaster_and_data: Bytes::new(),
            signature: Bytes::new(),
        };
        let v = op.to_rpc_value();
        assert_eq!(v.get("nonce").and_then(Value::as_str), Some("0x7"));
        assert_eq!(v.get("callData").and_then(Value::as_str), Some("0xdead"));
        assert!(v.get("maxFeePerGas").is_some());
        assert!(v.get("max_fee_per_gas").is_none());
    }

    #[test]
    fn parse_quantity_accepts_hex_and_decimal() {
        assert_eq!(
            parse_quantity(&Value::String("0x10".into())).ok(),
            Some(U256::from(16_u64))
        );
        assert_eq!(
            parse_quantity(&Value::String("16".into())).ok(),
            Some(U256::from(16_u64))
        );
        assert_eq!(
            parse_quantity(&serde_json::json!(16)).ok(),
            Some(U256::from(16_u64))
        );
    }
}
