//! Wire-format types returned by the node's JSON-RPC methods.
//!
//! Fields are kept as the raw strings the node sends (hex-prefixed integers,
//! `0x`-prefixed hashes) rather than eagerly parsed, mirroring how the
//! original source stored them. Callers normalize explicitly via
//! [`crate::rpc::hex_to_u256`] / [`crate::rpc::hex_to_i64`].

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// A full block as returned by `eth_getBlockByNumber`/`eth_getBlockByHash`
/// with `includeTransactions = true`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FullBlock {
    /// Hex-encoded block number. Empty when the node has no such block yet.
    #[serde(default)]
    pub number: String,
    pub hash: String,
    #[serde(rename = "parentHash")]
    pub parent_hash: String,
    /// Hex-encoded UNIX timestamp.
    pub timestamp: String,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl FullBlock {
    /// A node signals "block not yet propagated" with an empty `number` field.
    pub fn is_empty(&self) -> bool {
        self.number.is_empty()
    }
}

/// An Ethereum transaction as returned by `eth_getTransactionByHash` or
/// embedded in a full block body. All numeric fields keep their original hex
/// form; nothing here is parsed eagerly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub value: String,
    #[serde(default)]
    pub input: String,
    pub gas: String,
    #[serde(rename = "gasPrice", default)]
    pub gas_price: String,
    pub nonce: String,
    #[serde(rename = "blockHash", default)]
    pub block_hash: Option<String>,
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<String>,
    #[serde(rename = "transactionIndex", default)]
    pub transaction_index: Option<String>,
}

/// Arguments for `eth_call`, used for `balanceOf` and raw calldata probes.
#[derive(Debug, Clone, Serialize)]
pub struct CallArg {
    pub to: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}
