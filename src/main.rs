//! Entry point: loads configuration, wires up the RPC gateway, store,
//! nonce manager, keystore, and scanner, then runs until a shutdown signal
//! arrives.

use eth_relay::config::Config;
use eth_relay::db::{BlockStore, MySqlBlockStore};
use eth_relay::error::EngineError;
use eth_relay::keystore::Keystore;
use eth_relay::nonce::NonceManager;
use eth_relay::rpc::RpcGateway;
use eth_relay::scanner::BlockScanner;
use eth_relay::shutdown::ShutdownSignal;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(%err, "eth-relay exited with an error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), EngineError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::load();

    let rpc_url = config
        .rpc
        .parse()
        .map_err(|_| EngineError::Config(format!("invalid --rpc url: {}", config.rpc)))?;
    let rpc = RpcGateway::new(rpc_url);

    let store = MySqlBlockStore::connect(&config.mysql, &config.db_options()).await?;

    let nonces = NonceManager::new();
    let keystore = Keystore::new(&config.keystore_dir);

    let start_block = match store.last_confirmed_block().await? {
        Some(block) => block.block_number + 1,
        None => seed_start_block_from_head(&rpc).await?,
    };

    let shutdown = ShutdownSignal::new();
    shutdown.install();
    let token = shutdown.token();

    tracing::info!(start_block, rpc = %config.rpc, "starting block scanner");

    let mut scanner = BlockScanner::new(&rpc, &store, start_block);
    scanner.run(&token).await?;

    tracing::info!("eth-relay shut down cleanly");
    Ok(())
}

/// Init on an empty database: seed the starting block from the chain's
/// current head rather than an arbitrary configured number. The head block
/// is fetched (to confirm it is actually available) but not persisted here —
/// the first regular scan tick at this number performs the real insert.
async fn seed_start_block_from_head(rpc: &RpcGateway) -> Result<i64, EngineError> {
    let head_number = rpc.latest_block_number().await?;
    let head_block = rpc.block_by_number(head_number, false).await?;
    let head_block = head_block.ok_or_else(|| {
        EngineError::Config(format!("chain head block {head_number} unavailable at startup"))
    })?;
    tracing::info!(
        block_number = %head_number,
        block_hash = %head_block.hash,
        "seeding scanner start position from chain head"
    );
    Ok(head_number.to::<i64>())
}
