use clap::Parser;
use escrow_ledger::application::engine::EscrowEngine;
use escrow_ledger::config::Config;
use escrow_ledger::domain::ports::LedgerStoreBox;
use escrow_ledger::infrastructure::in_memory::{
    InMemoryAccountDirectory, InMemoryHouseCatalog, InMemoryLedgerStore,
};
use escrow_ledger::interfaces::csv::command_reader::CommandReader;
use escrow_ledger::interfaces::csv::wallet_writer::WalletWriter;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command script CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// TOML configuration with accounts, houses and settings
    #[arg(long)]
    config: Option<PathBuf>,
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(path: PathBuf) -> Result<LedgerStoreBox> {
    let store = escrow_ledger::infrastructure::rocksdb::RocksDBStore::open(path)?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(path: PathBuf) -> Result<LedgerStoreBox> {
    tracing::warn!(
        path = %path.display(),
        "built without `storage-rocksdb`, falling back to the in-memory store"
    );
    Ok(Arc::new(InMemoryLedgerStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_env();
            config
        }
        None => Config::from_env()?,
    };
    if cli.db_path.is_some() {
        config.db_path = cli.db_path;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .into_diagnostic()?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let store = match config.db_path.clone() {
        Some(path) => open_store(path)?,
        None => Arc::new(InMemoryLedgerStore::new()),
    };
    let engine = EscrowEngine::new(
        store,
        Arc::new(InMemoryAccountDirectory::with_accounts(config.accounts)),
        Arc::new(InMemoryHouseCatalog::with_houses(config.houses)),
        Arc::new(config.virtual_port.generator()),
        config.orders,
    );

    // Process commands
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(command) => {
                if let Err(e) = engine.execute(command).await {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    // Output final state
    let wallets = engine.wallet_report().await?;
    let stdout = io::stdout();
    let mut writer = WalletWriter::new(stdout.lock());
    writer.write_wallets(wallets)?;

    Ok(())
}
