//! Block scanner: follows the chain head, persists blocks and transactions,
//! and delegates fork detection to [`fork::ForkReconciler`] on every tick.

pub mod fork;

use std::time::Duration;

use alloy_primitives::U256;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::db::{BlockRecord, BlockStore, TransactionRecord};
use crate::rpc::{FullBlock, RpcError, RpcGateway};
use crate::scanner::fork::{AncestorSource, ForkError, ForkReconciler};

/// Delay between consecutive scan ticks once caught up with the chain head.
const TICK_INTERVAL: Duration = Duration::from_secs(1);
/// How long to wait for the next block to be produced before re-polling.
const HEAD_POLL_INTERVAL: Duration = Duration::from_secs(4);
/// Backoff schedule applied while a block is momentarily empty
/// (`RpcError::Empty`): 250ms, 500ms, 1s, 2s, 4s, 8s, then capped at 8s.
const BACKOFF_SCHEDULE_MS: &[u64] = &[250, 500, 1000, 2000, 4000, 8000];
/// Number of backoff attempts before giving up on a missing block.
const MAX_BACKOFF_ATTEMPTS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Db(#[from] crate::db::DbError),
    #[error(transparent)]
    Fork(#[from] ForkError),
    #[error("block never appeared after {MAX_BACKOFF_ATTEMPTS} attempts")]
    BlockPermanentlyMissing,
}

/// Source of chain-head data the scanner needs.
#[async_trait]
pub trait BlockSource: AncestorSource {
    async fn latest_block_number(&self) -> Result<U256, RpcError>;
}

#[async_trait]
impl BlockSource for RpcGateway {
    async fn latest_block_number(&self) -> Result<U256, RpcError> {
        RpcGateway::latest_block_number(self).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    Init,
    Scanning,
    ForkPending,
    Stopped,
}

pub struct BlockScanner<'a, S: BlockSource, D: BlockStore> {
    source: &'a S,
    store: &'a D,
    state: ScannerState,
    next_number: i64,
}

impl<'a, S: BlockSource, D: BlockStore> BlockScanner<'a, S, D> {
    pub fn new(source: &'a S, store: &'a D, start_number: i64) -> Self {
        Self {
            source,
            store,
            state: ScannerState::Init,
            next_number: start_number,
        }
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    /// Runs the scan loop until `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: &CancellationToken) -> Result<(), ScanError> {
        self.state = ScannerState::Scanning;
        loop {
            if shutdown.is_cancelled() {
                self.state = ScannerState::Stopped;
                return Ok(());
            }

            let head = self.source.latest_block_number().await?;
            let head = head.to::<i64>();
            if self.next_number > head {
                tokio::select! {
                    _ = tokio::time::sleep(HEAD_POLL_INTERVAL) => {}
                    _ = shutdown.cancelled() => {
                        self.state = ScannerState::Stopped;
                        return Ok(());
                    }
                }
                continue;
            }

            self.scan_one(self.next_number).await?;

            if self.state == ScannerState::ForkPending {
                // Re-run Init: re-anchor next_number from persistence (the
                // reconciler has already rewritten the stored history) before
                // resuming forward scanning, rather than blindly continuing
                // past the detected fork.
                self.reanchor().await?;
            } else {
                self.next_number += 1;
            }

            tokio::select! {
                _ = tokio::time::sleep(TICK_INTERVAL) => {}
                _ = shutdown.cancelled() => {
                    self.state = ScannerState::Stopped;
                    return Ok(());
                }
            }
        }
    }

    /// Re-derives `next_number` from the store's canonical chain tip, the
    /// same seed logic used at startup: resume one past the last confirmed
    /// block, or fall back to the chain head if the store is somehow empty.
    /// Transitions back to `Scanning` once done.
    async fn reanchor(&mut self) -> Result<(), ScanError> {
        self.state = ScannerState::Init;
        self.next_number = match self.store.last_confirmed_block().await? {
            Some(block) => block.block_number + 1,
            None => self.source.latest_block_number().await?.to::<i64>(),
        };
        self.state = ScannerState::Scanning;
        Ok(())
    }

    /// Fetches, fork-checks, and persists block `number`, backing off on a
    /// momentarily-empty response until [`MAX_BACKOFF_ATTEMPTS`] is reached.
    async fn scan_one(&mut self, number: i64) -> Result<(), ScanError> {
        let block = self.fetch_with_backoff(number).await?;

        let reconciler = ForkReconciler::new(self.source, self.store);
        match reconciler.check(&block, number).await {
            Ok(Some(_ancestor)) => self.state = ScannerState::ForkPending,
            Ok(None) => self.state = ScannerState::Scanning,
            Err(err) => return Err(err.into()),
        }

        let timestamp = crate::rpc::hex_to_i64(&block.timestamp)?;
        self.store
            .upsert_block(&BlockRecord {
                id: 0,
                block_number: number,
                block_hash: block.hash.clone(),
                parent_hash: block.parent_hash.clone(),
                timestamp,
                fork: false,
                create_time: timestamp,
            })
            .await?;

        let records = block
            .transactions
            .iter()
            .map(|tx| transaction_record(&block, tx))
            .collect::<Result<Vec<_>, ScanError>>()?;
        self.store.insert_transactions(&records).await?;

        Ok(())
    }

    async fn fetch_with_backoff(&self, number: i64) -> Result<FullBlock, ScanError> {
        for attempt in 0..MAX_BACKOFF_ATTEMPTS {
            match self
                .source
                .block_by_number(number)
                .await
                .map_err(ScanError::from)
            {
                Ok(Some(block)) => return Ok(block),
                Ok(None) | Err(ScanError::Rpc(RpcError::Empty)) => {
                    let delay_ms = BACKOFF_SCHEDULE_MS
                        [attempt.min(BACKOFF_SCHEDULE_MS.len() - 1)];
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(other) => return Err(other),
            }
        }
        Err(ScanError::BlockPermanentlyMissing)
    }
}

fn transaction_record(
    block: &FullBlock,
    tx: &crate::rpc::Transaction,
) -> Result<TransactionRecord, ScanError> {
    let nonce = crate::rpc::hex_to_i64(&tx.nonce)?;
    Ok(TransactionRecord {
        tx_hash: tx.hash.clone(),
        block_number: crate::rpc::hex_to_i64(&block.number)?,
        block_hash: block.hash.clone(),
        from_address: tx.from.clone(),
        to_address: tx.to.clone(),
        value: tx.value.clone(),
        input: tx.input.clone(),
        gas: tx.gas.clone(),
        gas_price: tx.gas_price.clone(),
        nonce,
        create_time: 0,
    })
}
