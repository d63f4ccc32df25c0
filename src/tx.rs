//! Legacy (pre-EIP-1559), chain-id-less transaction construction and RLP
//! encoding.
//!
//! The original signed transactions with `ks.SignTx(account, tx, nil)` — no
//! chain ID, the pre-EIP-155 legacy format. `alloy_consensus::TxLegacy` with
//! `chain_id: None` reproduces that exactly; `alloy_network::TxSignerSync`
//! plus [`alloy_consensus::SignableTransaction::into_signed`] produce the
//! same signed RLP a node's `eth_sendRawTransaction` expects.

use alloy_consensus::{Signed, SignableTransaction, TxLegacy};
use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_rlp::{Decodable, Encodable};

use crate::keystore::{Keystore, KeystoreError};

/// Parameters for building an unsigned legacy transaction.
#[derive(Debug, Clone)]
pub struct TxParams {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
}

/// Builds the unsigned legacy transaction described by `params`. No chain ID
/// is set, matching the original's `SignTx(account, tx, nil)` call.
pub fn build_legacy(params: &TxParams) -> TxLegacy {
    TxLegacy {
        chain_id: None,
        nonce: params.nonce,
        gas_price: params.gas_price,
        gas_limit: params.gas_limit,
        to: TxKind::Call(params.to),
        value: params.value,
        input: params.data.clone(),
    }
}

/// Signs `tx` with `keystore`'s unlocked signer for `from`, then RLP-encodes
/// the signed transaction into the raw bytes `eth_sendRawTransaction` wants.
pub fn sign_and_encode(
    keystore: &Keystore,
    from: Address,
    mut tx: TxLegacy,
) -> Result<Bytes, KeystoreError> {
    let signature = keystore.sign(from, &mut tx)?;
    let signed = tx.into_signed(signature);
    let mut out = Vec::new();
    signed.encode(&mut out);
    Ok(Bytes::from(out))
}
