//! Crate-wide error aggregation used by [`crate`]'s entry point.

use crate::db::DbError;
use crate::keystore::KeystoreError;
use crate::nonce::NonceError;
use crate::rpc::RpcError;
use crate::scanner::ScanError;
use crate::submitter::SubmitError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
    #[error(transparent)]
    Nonce(#[from] NonceError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("missing required configuration: {0}")]
    Config(String),
}
