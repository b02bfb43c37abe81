use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

use ckb_ledger_sync::config::LedgerConfig;
use ckb_ledger_sync::ledger::address::Address;
use ckb_ledger_sync::ledger::domain::{format_ckb, Network, SyncMode, Transaction};
use ckb_ledger_sync::ledger::index::{LightClientRpc, SharedIndex};
use ckb_ledger_sync::ledger::runtime::LedgerWallet;
use ckb_ledger_sync::persistence::{StateStore, DB_PATH};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    New,
    Recent,
    Full,
    Custom,
}

impl ModeArg {
    fn into_sync_mode(self, height: Option<u64>) -> SyncMode {
        match self {
            ModeArg::New => SyncMode::NewWallet,
            ModeArg::Recent => SyncMode::Recent,
            ModeArg::Full => SyncMode::FullHistory,
            ModeArg::Custom => SyncMode::Custom(height),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index readiness and sync progress of the address.
    Status,
    /// Register the address with the light client.
    Register {
        #[arg(long, value_enum, default_value_t = ModeArg::Recent)]
        mode: ModeArg,
        #[arg(long)]
        height: Option<u64>,
    },
    /// Re-register from an explicit point, even ahead of the current one.
    Resync {
        #[arg(long, value_enum, default_value_t = ModeArg::Recent)]
        mode: ModeArg,
        #[arg(long)]
        height: Option<u64>,
    },
    Balance,
    History,
    /// Print an unsigned transfer as JSON. Signing happens elsewhere.
    Build {
        #[arg(long)]
        to: String,
        /// Amount in shannons.
        #[arg(long)]
        amount: u64,
    },
    /// Broadcast a signed transaction and follow it.
    Submit {
        #[arg(long)]
        tx_file: PathBuf,
    },
    Track {
        #[arg(long)]
        tx_hash: String,
    },
    /// Reconcile in the background until Ctrl-C.
    Watch,
}

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "CKB_NETWORK", default_value = "testnet")]
    network: Network,

    #[arg(long, env = "CKB_LIGHT_CLIENT_URL", default_value = "http://127.0.0.1:9000")]
    rpc_url: String,

    #[arg(long, default_value = DB_PATH)]
    state_path: PathBuf,

    /// Address whose cells are tracked.
    #[arg(long)]
    address: String,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let address = Address::parse_for(&args.address, args.network)?;
    let index: SharedIndex = Arc::new(LightClientRpc::new(&args.rpc_url)?);
    let store = StateStore::load_or_create(&args.state_path)?;
    let wallet = LedgerWallet::new(LedgerConfig::for_network(args.network), address, index, store)?;

    log::info!("[CLI] {} via {}", args.network, args.rpc_url);
    wallet.start().await?;

    match args.command {
        Command::Status => print_status(&wallet).await?,
        Command::Register { mode, height } => {
            let outcome = wallet.register(mode.into_sync_mode(height)).await?;
            println!("[CLI] Registered, syncing from block {}", outcome.from_block);
        }
        Command::Resync { mode, height } => {
            let outcome = wallet.resync(mode.into_sync_mode(height)).await?;
            println!("[CLI] Resync from block {}", outcome.from_block);
        }
        Command::Balance => {
            let snapshot = wallet.refresh().await?;
            println!("-----------------------------------");
            println!("Balance:     {} CKB", format_ckb(snapshot.balance));
            println!("Live cells:  {}", snapshot.live_cells.len());
            println!("As of block: {}", snapshot.as_of_block);
            println!("-----------------------------------");
        }
        Command::History => {
            wallet.refresh().await?;
            for r in wallet.history() {
                println!(
                    "{} {:>10} {:<5} {:>20} CKB  fee {:>8}  conf {}",
                    r.tx_hash,
                    r.block_number,
                    format!("{:?}", r.direction).to_lowercase(),
                    format_ckb(r.amount),
                    r.fee,
                    r.confirmations
                );
            }
        }
        Command::Build { to, amount } => {
            wallet.refresh().await?;
            let unsigned = wallet.build(&to, amount)?;
            println!("{}", serde_json::to_string_pretty(&unsigned)?);
        }
        Command::Submit { tx_file } => {
            let raw = std::fs::read_to_string(&tx_file)
                .with_context(|| format!("reading {}", tx_file.display()))?;
            let tx: Transaction = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", tx_file.display()))?;
            let tx_hash = wallet.submit(&tx).await?;
            println!("[CLI] Submitted {}", tx_hash);
            follow(&wallet).await;
        }
        Command::Track { tx_hash } => {
            wallet.track(&tx_hash)?;
            follow(&wallet).await;
        }
        Command::Watch => watch(&wallet).await?,
    }

    Ok(())
}

async fn print_status(wallet: &LedgerWallet) -> Result<()> {
    let status = wallet.account_status().await?;
    println!("-----------------------------------");
    println!("Address:     {}", status.address);
    println!("Registered:  {}", status.is_registered);
    println!("Tip:         {}", status.tip);
    println!("Synced to:   {}", status.synced_to_block);
    println!("Progress:    {:.2}%", status.sync_progress * 100.0);
    println!("Synced:      {}", status.is_synced);
    println!("Indexed:     {} CKB", format_ckb(status.indexed_capacity));
    println!("-----------------------------------");
    Ok(())
}

/// Prints lifecycle changes until tracking stops; Ctrl-C stops tracking.
async fn follow(wallet: &LedgerWallet) {
    let mut rx = wallet.lifecycle_stream();
    let done = wallet.wait_tracking();
    tokio::pin!(done);

    loop {
        tokio::select! {
            _ = &mut done => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = rx.borrow_and_update().clone();
                println!("[CLI] {:?}: {}", snap.state, snap.message);
            }
            _ = tokio::signal::ctrl_c() => {
                println!("[CLI] Stopping tracking, the transaction is not affected");
                wallet.cancel_tracking();
            }
        }
    }

    let last = rx.borrow().clone();
    println!("-----------------------------------");
    println!("Transaction: {}", last.tx_hash.as_deref().unwrap_or("-"));
    println!("State:       {:?}", last.state);
    println!("Message:     {}", last.message);
    println!("Attempts:    {}", last.attempts);
    println!("-----------------------------------");
}

async fn watch(wallet: &LedgerWallet) -> Result<()> {
    let cancel = CancellationToken::new();
    let reconcile = wallet.spawn_reconcile_loop(cancel.clone());
    if let Some(tx_hash) = wallet.resume_pending()? {
        println!("[CLI] Following pending send {}", tx_hash);
    }

    let mut balance = wallet.balance_stream();
    loop {
        tokio::select! {
            changed = balance.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(snap) = balance.borrow_and_update().clone() {
                    println!(
                        "[CLI] Balance {} CKB ({} cells) at block {}",
                        format_ckb(snap.balance),
                        snap.live_cells.len(),
                        snap.as_of_block
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!("[CLI] Shutting down");
    cancel.cancel();
    wallet.cancel_tracking();
    reconcile.await?;
    Ok(())
}
