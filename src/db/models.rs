//! Row types for the block/transaction store, matching the schema the
//! bootstrap migration creates.

use sqlx::FromRow;

/// A scanned block. `fork` is set once the reconciler determines this row's
/// chain diverges from the canonical chain as of a later scan.
///
/// `id` is a surrogate key, not `block_number`: after a same-height reorg the
/// stale row at a height is kept (with `fork = true`) alongside the new
/// canonical row at that same height, so `block_number` cannot be unique.
#[derive(Debug, Clone, FromRow)]
pub struct BlockRecord {
    pub id: i64,
    pub block_number: i64,
    pub block_hash: String,
    pub parent_hash: String,
    pub timestamp: i64,
    pub fork: bool,
    pub create_time: i64,
}

/// A transaction embedded in a scanned block.
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRecord {
    pub tx_hash: String,
    pub block_number: i64,
    pub block_hash: String,
    pub from_address: String,
    pub to_address: Option<String>,
    pub value: String,
    pub input: String,
    pub gas: String,
    pub gas_price: String,
    pub nonce: i64,
    pub create_time: i64,
}
