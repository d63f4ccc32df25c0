//! Single- and batched-call facade over the node's JSON-RPC endpoint.
//!
//! Wraps [`alloy_rpc_client::RpcClient`] over HTTP, the same transport stack
//! `x402-chain-eip155`'s [`Eip155ChainProvider`] builds its fillers on top
//! of — here used directly, without the filler/wallet middleware pipeline,
//! because nonce allocation and signing are handled explicitly by
//! [`crate::nonce`] and [`crate::keystore`] rather than through Alloy's
//! provider fillers.

pub mod types;

use alloy_primitives::{Address, Bytes, U256};
use alloy_rpc_client::{BatchRequest, ClientBuilder, RpcClient};
use alloy_transport::{TransportError, TransportErrorKind};
use url::Url;

pub use types::{CallArg, FullBlock, Transaction};

/// Method selector for ERC-20 `balanceOf(address)`.
pub const BALANCE_OF_SELECTOR: &str = "0x70a08231";
/// Gas suggestion used for the `eth_call` probe against `balanceOf`.
const BALANCE_OF_GAS: u64 = 30_000;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("rpc transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("node returned an empty block (not yet propagated)")]
    Empty,
    #[error("malformed hex integer: {0}")]
    BadHex(String),
}

/// Facade over a single JSON-RPC endpoint, exposing the operations the
/// scanner, submitter, and signer need. All integer-valued RPC results are
/// hex strings on the wire; callers get them normalized to arbitrary
/// precision via [`hex_to_u256`].
#[derive(Clone)]
pub struct RpcGateway {
    client: RpcClient,
}

impl RpcGateway {
    pub fn new(url: Url) -> Self {
        let client = ClientBuilder::default().http(url);
        Self { client }
    }

    pub async fn latest_block_number(&self) -> Result<U256, RpcError> {
        let hex: String = self.client.request("eth_blockNumber", ()).await?;
        hex_to_u256(&hex)
    }

    pub async fn block_by_number(
        &self,
        number: U256,
        full: bool,
    ) -> Result<Option<FullBlock>, RpcError> {
        let hex_number = format!("0x{number:x}");
        let block: FullBlock = self
            .client
            .request("eth_getBlockByNumber", (hex_number, full))
            .await?;
        Ok(if block.is_empty() { None } else { Some(block) })
    }

    pub async fn block_by_hash(
        &self,
        hash: &str,
        full: bool,
    ) -> Result<Option<FullBlock>, RpcError> {
        let block: FullBlock = self
            .client
            .request("eth_getBlockByHash", (hash.to_owned(), full))
            .await?;
        Ok(if block.is_empty() { None } else { Some(block) })
    }

    pub async fn tx_by_hash(&self, hash: &str) -> Result<Option<Transaction>, RpcError> {
        let tx: Option<Transaction> = self
            .client
            .request("eth_getTransactionByHash", (hash.to_owned(),))
            .await?;
        Ok(tx)
    }

    pub async fn balance_native(&self, address: Address) -> Result<U256, RpcError> {
        let hex: String = self
            .client
            .request("eth_getBalance", (address, "latest"))
            .await?;
        hex_to_u256(&hex)
    }

    pub async fn eth_call(&self, call: &CallArg) -> Result<Bytes, RpcError> {
        let hex: String = self.client.request("eth_call", (call, "latest")).await?;
        Ok(Bytes::from(hex::decode(hex.trim_start_matches("0x")).map_err(
            |_| RpcError::BadHex(hex.clone()),
        )?))
    }

    pub async fn tx_count(&self, address: Address, tag: &str) -> Result<u64, RpcError> {
        let hex: String = self
            .client
            .request("eth_getTransactionCount", (address, tag.to_owned()))
            .await?;
        Ok(hex_to_u256(&hex)?.to::<u64>())
    }

    pub async fn send_raw(&self, raw: &[u8]) -> Result<String, RpcError> {
        let hex = format!("0x{}", hex::encode(raw));
        let tx_hash: String = self
            .client
            .request("eth_sendRawTransaction", (hex,))
            .await?;
        Ok(tx_hash)
    }

    /// Batched `eth_getTransactionByHash`. Results preserve request order;
    /// a per-element RPC failure is surfaced in that element's slot rather
    /// than failing the whole batch.
    pub async fn batch_tx_by_hash(
        &self,
        hashes: &[String],
    ) -> Result<Vec<Result<Option<Transaction>, RpcError>>, RpcError> {
        let mut batch: BatchRequest = self.client.new_batch();
        let mut waiters = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let waiter = batch
                .add_call("eth_getTransactionByHash", &(hash.clone(),))
                .map_err(|e| RpcError::Transport(TransportErrorKind::custom(e).into()))?;
            waiters.push(waiter);
        }
        batch.send().await?;
        let mut results = Vec::with_capacity(waiters.len());
        for waiter in waiters {
            results.push(waiter.await.map_err(RpcError::from));
        }
        Ok(results)
    }

    /// Batched `eth_getBalance`. See [`Self::batch_tx_by_hash`] for ordering
    /// and per-element failure semantics.
    pub async fn batch_balance_native(
        &self,
        addresses: &[Address],
    ) -> Result<Vec<Result<U256, RpcError>>, RpcError> {
        let mut batch: BatchRequest = self.client.new_batch();
        let mut waiters = Vec::with_capacity(addresses.len());
        for address in addresses {
            let waiter = batch
                .add_call("eth_getBalance", &(*address, "latest"))
                .map_err(|e| RpcError::Transport(TransportErrorKind::custom(e).into()))?;
            waiters.push(waiter);
        }
        batch.send().await?;
        let mut results = Vec::with_capacity(waiters.len());
        for waiter in waiters {
            results.push(match waiter.await {
                Ok(hex) => hex_to_u256(&hex),
                Err(e) => Err(RpcError::from(e)),
            });
        }
        Ok(results)
    }

    /// Batched `eth_call`, used for ERC-20 `balanceOf` across many
    /// (contract, holder) pairs in one round trip.
    pub async fn batch_eth_call(
        &self,
        calls: &[CallArg],
    ) -> Result<Vec<Result<Bytes, RpcError>>, RpcError> {
        let mut batch: BatchRequest = self.client.new_batch();
        let mut waiters = Vec::with_capacity(calls.len());
        for call in calls {
            let waiter = batch
                .add_call::<_, String>("eth_call", &(call, "latest"))
                .map_err(|e| RpcError::Transport(TransportErrorKind::custom(e).into()))?;
            waiters.push(waiter);
        }
        batch.send().await?;
        let mut results = Vec::with_capacity(waiters.len());
        for waiter in waiters {
            results.push(match waiter.await {
                Ok(hex) if hex.is_empty() => Ok(Bytes::new()),
                Ok(hex) => hex::decode(hex.trim_start_matches("0x"))
                    .map(Bytes::from)
                    .map_err(|_| RpcError::BadHex(hex)),
                Err(e) => Err(RpcError::from(e)),
            });
        }
        Ok(results)
    }

    /// Builds the `eth_call` argument for an ERC-20 `balanceOf(address)`
    /// probe: selector `0x70a08231` followed by the 20-byte address
    /// left-padded to 32 bytes, gas suggestion `30000`.
    pub fn erc20_balance_call(contract: Address, holder: Address) -> CallArg {
        let mut data = String::from(BALANCE_OF_SELECTOR);
        data.push_str(&"00".repeat(12));
        data.push_str(&hex::encode(holder));
        CallArg {
            to: contract,
            gas: Some(format!("0x{BALANCE_OF_GAS:x}")),
            data: Some(data),
        }
    }
}

/// Parses a `0x`-prefixed (or bare) hex integer into a [`U256`].
pub fn hex_to_u256(hex: &str) -> Result<U256, RpcError> {
    let trimmed = hex.trim_start_matches("0x");
    if trimmed.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(trimmed, 16).map_err(|_| RpcError::BadHex(hex.to_owned()))
}

/// Parses a hex-or-decimal integer into an `i64`, accepting both forms the
/// way legacy rows in this schema may carry `block_number`/timestamps.
pub fn hex_to_i64(value: &str) -> Result<i64, RpcError> {
    if let Some(stripped) = value.strip_prefix("0x") {
        i64::from_str_radix(stripped, 16).map_err(|_| RpcError::BadHex(value.to_owned()))
    } else {
        value.parse().map_err(|_| RpcError::BadHex(value.to_owned()))
    }
}
