//! Walk a wallet through its whole lifecycle against an on-disk store.
//!
//! Run with: `cargo run --example wallet_lifecycle_demo`
//! Set `RUST_LOG=seedvault=debug` for the internal trace.
//!
//! - create a password-protected wallet and pass the backup check
//! - lock, restart from disk, unlock
//! - wipe, leaving the directory empty
//!
//! The audit trail is written next to the wallet directory as JSON lines.

use std::collections::HashMap;
use std::sync::Arc;

use seedvault::{
    Argon2Params, FileAuditSink, FileSlotStore, WalletConfig, WalletController,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let base = std::env::temp_dir().join("seedvault_demo");
    let audit_path = std::env::temp_dir().join("seedvault_demo_audit.jsonl");

    // Lighter than the default so the demo finishes quickly.
    let config = WalletConfig {
        argon2: Argon2Params {
            m_cost: 19_456,
            t_cost: 2,
            p_cost: 1,
        },
        ..WalletConfig::default()
    };

    // 1. Create and back up
    let wallet = WalletController::new(config.clone(), Arc::new(FileSlotStore::new(&base)))?;
    wallet.add_audit_sink(Box::new(FileAuditSink::new(&audit_path)?));
    wallet.restore().await?;

    let identity = wallet.create_wallet("demo password").await?;
    println!("created {} ({})", identity.address, identity.security_level);

    let positions = wallet.begin_backup().await?;
    let shown: Vec<usize> = positions.iter().map(|p| p.position).collect();
    println!("backup check asks for words {shown:?}");

    let answers: HashMap<usize, String> = wallet.with_mnemonic(|m| {
        positions
            .iter()
            .filter_map(|p| m.word(p.index).map(|w| (p.index, w.to_string())))
            .collect()
    })?;
    wallet.verify_backup(&answers).await?;
    println!("backup verified, state: {}", wallet.state());

    // 2. Lock and "restart"
    wallet.lock()?;
    drop(wallet);

    let wallet = WalletController::new(config, Arc::new(FileSlotStore::new(&base)))?;
    wallet.add_audit_sink(Box::new(FileAuditSink::new(&audit_path)?));
    println!("restored: {}", wallet.restore().await?.state);

    if let Err(e) = wallet.unlock("not the password").await {
        println!("wrong password rejected: {e}");
    }
    wallet.unlock("demo password").await?;
    println!("unlocked: {}", wallet.state());

    // 3. Wipe
    wallet.wipe().await?;
    println!("wiped: {}", wallet.state());
    println!("audit trail: {}", audit_path.display());

    Ok(())
}
