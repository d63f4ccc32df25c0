//! Ethereum block-ingestion and transaction-relay engine.
//!
//! The crate is organized around the six components described in the design:
//! an RPC gateway (`rpc`), a nonce manager (`nonce`), a keystore-backed signer
//! (`keystore`), a transaction submitter (`tx`, `submitter`, `erc20`), a block
//! scanner (`scanner`), and a fork reconciler (`scanner::fork`), all backed by
//! a relational store (`db`).

pub mod config;
pub mod db;
pub mod erc20;
pub mod error;
pub mod keystore;
pub mod nonce;
pub mod rpc;
pub mod scanner;
pub mod shutdown;
pub mod submitter;
pub mod tx;
