//! Transaction submitter: combines the RPC gateway, nonce manager, and
//! keystore to send signed native and ERC-20 transfers.
//!
//! The critical invariant is that the cached nonce only advances after
//! `eth_sendRawTransaction` succeeds — [`crate::nonce::NonceManager::with_allocated_nonce`]
//! enforces that by construction, since it only calls `increment` once the
//! inner future (which performs the send) returns `Ok`.

use alloy_primitives::{Address, U256};

/// Native ether always scales by 18 decimal places.
const NATIVE_DECIMALS: u32 = 18;

use crate::erc20;
use crate::keystore::{Keystore, KeystoreError};
use crate::nonce::{NonceError, NonceManager};
use crate::rpc::{RpcError, RpcGateway};
use crate::tx::{self, TxParams};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Nonce(#[from] NonceError),
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
    #[error(transparent)]
    Scale(#[from] erc20::ScaleError),
}

pub struct TransactionSubmitter<'a> {
    rpc: &'a RpcGateway,
    nonces: &'a NonceManager,
    keystore: &'a Keystore,
}

impl<'a> TransactionSubmitter<'a> {
    pub fn new(rpc: &'a RpcGateway, nonces: &'a NonceManager, keystore: &'a Keystore) -> Self {
        Self {
            rpc,
            nonces,
            keystore,
        }
    }

    /// Sends a native-asset transfer of `value_str` (a human-readable ether
    /// amount, scaled by 18 decimal places) from `from` to `to`.
    pub async fn send_native_transfer(
        &self,
        from: Address,
        to: Address,
        value_str: &str,
        gas_limit: u64,
        gas_price: u128,
    ) -> Result<String, SubmitError> {
        let value = erc20::scale(value_str, NATIVE_DECIMALS)?;
        self.send_raw_with_nonce(from, to, value, Default::default(), gas_limit, gas_price)
            .await
    }

    /// Sends an ERC-20 `transfer` of `value_str` (scaled by `decimals`) of
    /// `contract` tokens from `from` to `receiver`.
    pub async fn send_erc20_transfer(
        &self,
        from: Address,
        contract: Address,
        receiver: Address,
        value_str: &str,
        decimals: u32,
        gas_limit: u64,
        gas_price: u128,
    ) -> Result<String, SubmitError> {
        let scaled = erc20::scale(value_str, decimals)?;
        let data = erc20::transfer_calldata(receiver, scaled);
        self.send_raw_with_nonce(from, contract, U256::ZERO, data, gas_limit, gas_price)
            .await
    }

    async fn send_raw_with_nonce(
        &self,
        from: Address,
        to: Address,
        value: U256,
        data: alloy_primitives::Bytes,
        gas_limit: u64,
        gas_price: u128,
    ) -> Result<String, SubmitError> {
        self.nonces
            .with_allocated_nonce(self.rpc, from, |nonce| async move {
                let unsigned = tx::build_legacy(&TxParams {
                    to,
                    value,
                    data,
                    nonce,
                    gas_limit,
                    gas_price,
                });
                let raw = tx::sign_and_encode(self.keystore, from, unsigned)
                    .map_err(SubmitError::from)?;
                self.rpc.send_raw(&raw).await.map_err(SubmitError::from)
            })
            .await
    }
}
