//! Relational store for scanned blocks and transactions.
//!
//! Grounded on the original `dao/mysql.go`: a connection-pool wrapper with
//! configurable max-connections and connection-lifetime options, and an
//! idempotent `CreateTables`/`Sync2` bootstrap, here expressed as plain
//! `CREATE TABLE IF NOT EXISTS` statements run once on connect rather than
//! through an ORM. Table names are prefixable (`<prefix>block`,
//! `<prefix>transaction`), same as the original's configurable table prefix.

pub mod models;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;

pub use models::{BlockRecord, TransactionRecord};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Pool-construction options, mirroring the original `MysqlOptions`.
#[derive(Debug, Clone)]
pub struct DbOptions {
    pub max_connections: u32,
    /// `0` means connections are never force-recycled on a lifetime timer.
    pub conn_lifetime_secs: u64,
    pub table_prefix: String,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            max_connections: 20,
            conn_lifetime_secs: 0,
            table_prefix: "eth_".to_owned(),
        }
    }
}

/// Storage operations the scanner and fork reconciler need. A trait so the
/// scanner can be driven against an in-memory fake in tests instead of a
/// live MySQL instance.
#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn upsert_block(&self, block: &BlockRecord) -> Result<(), DbError>;
    async fn insert_transactions(&self, txs: &[TransactionRecord]) -> Result<(), DbError>;
    /// Marks every stored block in `(from_number, to_number]` as a fork,
    /// matching the reconciler's `>`/`<=` range rule. Rows are never deleted
    /// or overwritten by this — a later `upsert_block` for the same height
    /// inserts the new canonical row alongside the one just marked.
    async fn mark_fork_range(&self, from_number: i64, to_number: i64) -> Result<(), DbError>;
    /// The canonical (non-forked) row at `number`, if one has been stored.
    async fn block_by_number(&self, number: i64) -> Result<Option<BlockRecord>, DbError>;
    async fn last_confirmed_block(&self) -> Result<Option<BlockRecord>, DbError>;
}

/// MySQL-backed [`BlockStore`].
pub struct MySqlBlockStore {
    pool: MySqlPool,
    block_table: String,
    tx_table: String,
}

impl MySqlBlockStore {
    pub async fn connect(dsn: &str, options: &DbOptions) -> Result<Self, DbError> {
        let mut pool_options = MySqlPoolOptions::new().max_connections(options.max_connections);
        if options.conn_lifetime_secs > 0 {
            pool_options =
                pool_options.max_lifetime(Duration::from_secs(options.conn_lifetime_secs));
        }
        let pool = pool_options.connect(dsn).await?;
        let store = Self {
            pool,
            block_table: format!("{}block", options.table_prefix),
            tx_table: format!("{}transaction", options.table_prefix),
        };
        store.bootstrap().await?;
        Ok(store)
    }

    async fn bootstrap(&self) -> Result<(), DbError> {
        // `block_number` is deliberately not the primary key: Scenario 2
        // requires a stale row and its replacement to coexist at the same
        // height (the stale one left behind with `fork = TRUE`), so two rows
        // can share a `block_number`. `id` is the surrogate key; uniqueness
        // is enforced on `(block_number, block_hash)` instead, which also
        // makes re-scanning an already-seen block idempotent.
        let block_ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
                block_number BIGINT NOT NULL,
                block_hash VARCHAR(66) NOT NULL,
                parent_hash VARCHAR(66) NOT NULL,
                timestamp BIGINT NOT NULL,
                fork BOOLEAN NOT NULL DEFAULT FALSE,
                create_time BIGINT NOT NULL,
                UNIQUE KEY uq_number_hash (block_number, block_hash),
                INDEX idx_block_number (block_number),
                INDEX idx_block_hash (block_hash)
            )",
            table = self.block_table
        );
        let tx_ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                tx_hash VARCHAR(66) NOT NULL PRIMARY KEY,
                block_number BIGINT NOT NULL,
                block_hash VARCHAR(66) NOT NULL,
                from_address VARCHAR(42) NOT NULL,
                to_address VARCHAR(42),
                value VARCHAR(78) NOT NULL,
                input LONGTEXT NOT NULL,
                gas VARCHAR(32) NOT NULL,
                gas_price VARCHAR(32) NOT NULL,
                nonce BIGINT NOT NULL,
                create_time BIGINT NOT NULL,
                INDEX idx_block_number (block_number)
            )",
            table = self.tx_table
        );
        sqlx::query(&block_ddl).execute(&self.pool).await?;
        sqlx::query(&tx_ddl).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl BlockStore for MySqlBlockStore {
    async fn upsert_block(&self, block: &BlockRecord) -> Result<(), DbError> {
        // Keyed on (block_number, block_hash): re-inserting the same block
        // is idempotent, but a different hash at the same height (a reorg's
        // new canonical block) inserts a second row rather than clobbering
        // the stale one that `mark_fork_range` already flagged.
        let query = format!(
            "INSERT INTO {table} (block_number, block_hash, parent_hash, timestamp, fork, create_time)
             VALUES (?, ?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                parent_hash = VALUES(parent_hash), timestamp = VALUES(timestamp),
                fork = VALUES(fork)",
            table = self.block_table
        );
        sqlx::query(&query)
            .bind(block.block_number)
            .bind(&block.block_hash)
            .bind(&block.parent_hash)
            .bind(block.timestamp)
            .bind(block.fork)
            .bind(block.create_time)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_transactions(&self, txs: &[TransactionRecord]) -> Result<(), DbError> {
        if txs.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.begin().await?;
        let query = format!(
            "INSERT INTO {table} (tx_hash, block_number, block_hash, from_address, to_address,
                value, input, gas, gas_price, nonce, create_time)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE block_number = VALUES(block_number)",
            table = self.tx_table
        );
        for tx in txs {
            sqlx::query(&query)
                .bind(&tx.tx_hash)
                .bind(tx.block_number)
                .bind(&tx.block_hash)
                .bind(&tx.from_address)
                .bind(&tx.to_address)
                .bind(&tx.value)
                .bind(&tx.input)
                .bind(&tx.gas)
                .bind(&tx.gas_price)
                .bind(tx.nonce)
                .bind(tx.create_time)
                .execute(&mut *conn)
                .await?;
        }
        conn.commit().await?;
        Ok(())
    }

    async fn mark_fork_range(&self, from_number: i64, to_number: i64) -> Result<(), DbError> {
        let query = format!(
            "UPDATE {table} SET fork = TRUE WHERE block_number > ? AND block_number <= ?",
            table = self.block_table
        );
        sqlx::query(&query)
            .bind(from_number)
            .bind(to_number)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns the canonical (`fork = FALSE`) row at `number`, if any. A
    /// height that has been reorged away from still keeps its stale row(s)
    /// in storage, but callers asking "what's at block N" want the current
    /// view of the chain, not history.
    async fn block_by_number(&self, number: i64) -> Result<Option<BlockRecord>, DbError> {
        let query = format!(
            "SELECT id, block_number, block_hash, parent_hash, timestamp, fork, create_time
             FROM {table} WHERE block_number = ? AND fork = FALSE
             ORDER BY id DESC LIMIT 1",
            table = self.block_table
        );
        let row = sqlx::query_as::<_, BlockRecord>(&query)
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn last_confirmed_block(&self) -> Result<Option<BlockRecord>, DbError> {
        let query = format!(
            "SELECT id, block_number, block_hash, parent_hash, timestamp, fork, create_time
             FROM {table} WHERE fork = FALSE ORDER BY block_number DESC LIMIT 1",
            table = self.block_table
        );
        let row = sqlx::query_as::<_, BlockRecord>(&query)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
