//! Ledger client CLI - one-shot queries and transactions from the terminal

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use ethers::types::U256;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

use ledger_client::config::CONFIG_ENV_VAR;
use ledger_client::{metrics, units, Account, CancelSignal, MethodCall, Session, Settings};

#[derive(Parser, Debug)]
#[command(name = "ledger-client", version, about = "EVM transaction client")]
struct Cli {
    /// Configuration file
    #[arg(long, env = CONFIG_ENV_VAR, default_value = "config/default.toml")]
    config: PathBuf,

    /// Print Prometheus metrics after the command completes
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the address of the configured key
    Address,
    /// Ether balance of an address, or of the configured account
    Balance { address: Option<String> },
    /// Current block height
    BlockNumber,
    /// Pending nonce of the configured account
    Nonce,
    ChainId,
    /// Wait for a submitted transaction and print its receipt
    Receipt { hash: String },
    /// Deployed byte code at an address
    Code { address: String },
    /// Send ether; VALUE is in ether
    Transfer { to: String, value: String },
    /// Call a contract method
    Invoke {
        contract: String,
        method: String,
        /// Ether attached to the call
        #[arg(long, default_value = "0")]
        value: String,
        /// Method argument as TYPE=VALUE, in declaration order
        #[arg(long = "arg", value_parser = parse_arg)]
        args: Vec<(String, String)>,
    },
}

fn parse_arg(input: &str) -> Result<(String, String), String> {
    input
        .split_once('=')
        .map(|(ty, value)| (ty.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected TYPE=VALUE, got '{}'", input))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let private_key = settings.private_key()?;

    if let Command::Address = cli.command {
        println!("{}", Account::from_private_key(&private_key)?.address_hex());
        return Ok(());
    }

    let session = Session::from_settings(&settings, &private_key)?;
    info!("Connected to {}", settings.endpoint());

    let result = run(&session, cli.command).await;
    session.close();

    if cli.metrics {
        print!("{}", metrics::render()?);
    }
    result
}

async fn run(session: &Session, command: Command) -> Result<()> {
    match command {
        Command::Address => println!("{}", session.address_hex()),
        Command::Balance { address } => {
            let address = address.unwrap_or_else(|| session.address_hex());
            println!("{}", session.ether_balance(&address).await?);
        }
        Command::BlockNumber => println!("{}", session.block_number().await?),
        Command::Nonce => println!("{}", session.nonce().await?),
        Command::ChainId => println!("{}", session.chain_id().await?),
        Command::Receipt { hash } => {
            let receipt = session.wait_for_receipt(&hash).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Command::Code { address } => println!("0x{}", session.byte_code(&address).await?),
        Command::Transfer { to, value } => {
            let value = units::parse_ether(&value)?;
            let unsigned = session.create_tx(&to, Default::default(), value).await?;
            print_receipt(session, unsigned).await?;
        }
        Command::Invoke {
            contract,
            method,
            value,
            args,
        } => {
            let call = MethodCall::with_args(method, args);
            let value: U256 = units::parse_ether(&value)?;
            let unsigned = session.create_tx(&contract, call.encode()?, value).await?;
            print_receipt(session, unsigned).await?;
        }
    }
    Ok(())
}

/// Send and print the receipt; Ctrl+C abandons the wait, not the transaction
async fn print_receipt(
    session: &Session,
    unsigned: ledger_client::tx::UnsignedTransaction,
) -> Result<()> {
    let (handle, cancel) = CancelSignal::pair();
    let watcher = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Interrupted, abandoning confirmation wait");
        handle.cancel();
    });

    let receipt = session.send_tx_with_cancel(unsigned, cancel).await;
    watcher.abort();

    let receipt = receipt?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    if !receipt.is_success() {
        return Err(anyhow!(
            "transaction {:?} failed on chain",
            receipt.transaction_hash
        ));
    }
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ledger_client=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
