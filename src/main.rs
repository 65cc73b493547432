//! DeFi chat agent CLI
//!
//! Interactive chat loop plus a few read-only helpers against the chain.

use clap::{Parser, Subcommand};
use defai_agent::chain::{self, ChainClient, RpcChain};
use defai_agent::dex::QuoteEngine;
use defai_agent::tokens::TokenRegistry;
use defai_agent::units::format_units;
use defai_agent::wallet::SecureWallet;
use defai_agent::{Config, Dispatcher, Error, Result, RpcConfig, PRIVATE_KEY_ENV};
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "defai-agent")]
#[command(about = "Chat-driven DeFi agent for Flare")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent on stdin
    Chat,

    /// Quote a swap through the configured router
    Quote {
        /// Token to sell (symbol)
        #[arg(long)]
        from: String,

        /// Token to buy (symbol)
        #[arg(long)]
        to: String,

        /// Amount of `from`, in whole units
        #[arg(long, default_value = "1")]
        amount: Decimal,
    },

    /// Show a native or token balance
    Balance {
        /// Account to inspect (defaults to the PRIVATE_KEY account)
        #[arg(long)]
        address: Option<String>,

        /// Token symbol (defaults to the native asset)
        #[arg(long)]
        token: Option<String>,
    },

    /// Show pool reserves for a token pair
    Liquidity {
        #[arg(long)]
        a: String,

        #[arg(long)]
        b: String,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    let fmt_layer = if cli.json_logs {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Chat => run_chat(config).await,
        Commands::Quote { from, to, amount } => run_quote(config, from, to, amount).await,
        Commands::Balance { address, token } => run_balance(config, address, token).await,
        Commands::Liquidity { a, b } => run_liquidity(config, a, b).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn connect(config: &Config) -> Result<Arc<dyn ChainClient>> {
    let rpc_config = RpcConfig::from_env();
    let url = rpc_config.for_network(config.network).ok_or_else(|| {
        Error::Config(format!("no RPC endpoint for {}", config.network.name()))
    })?;
    tracing::info!(network = config.network.name(), "Connecting to RPC");
    Ok(Arc::new(RpcChain::new(
        url,
        config.network.chain_id(),
        config.rpc.clone(),
    )?))
}

fn load_wallet() -> Option<SecureWallet> {
    let key = std::env::var(PRIVATE_KEY_ENV).ok()?;
    match SecureWallet::from_secret(&SecretString::from(key)) {
        Ok(wallet) => {
            tracing::info!(address = %wallet.address(), "Loaded wallet from PRIVATE_KEY");
            Some(wallet)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load wallet from PRIVATE_KEY");
            None
        }
    }
}

fn registry(config: &Config) -> Arc<TokenRegistry> {
    Arc::new(TokenRegistry::new(&config.dex, config.network.native_symbol()))
}

async fn run_chat(config: Config) -> Result<()> {
    let chain = connect(&config)?;
    let wallet = load_wallet();
    if wallet.is_none() {
        tracing::warn!("No PRIVATE_KEY set - a fresh account is generated on first use");
    }

    let mut dispatcher = Dispatcher::from_config(&config, chain, wallet)?;
    let session = dispatcher.open_session();
    tracing::info!(session = %session, dex = %config.dex.name, "Chat session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"> ").await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
            continue;
        }
        if matches!(line.trim(), "/quit" | "/exit") {
            break;
        }
        let response = dispatcher.handle(session, &line).await;
        stdout
            .write_all(format!("{}\n> ", response.text).as_bytes())
            .await?;
        stdout.flush().await?;
    }
    dispatcher.close_session(session).await;
    Ok(())
}

async fn run_quote(config: Config, from: String, to: String, amount: Decimal) -> Result<()> {
    let chain = connect(&config)?;
    let engine = QuoteEngine::new(chain, registry(&config), config.dex.clone())
        .with_simulation(config.simulation, config.simulated_rate);

    let quote = engine.get_quote(&from, &to, amount).await?;
    println!("{}", serde_json::to_string_pretty(&quote)?);
    Ok(())
}

async fn run_balance(config: Config, address: Option<String>, token: Option<String>) -> Result<()> {
    let owner = match address {
        Some(address) => defai_agent::dex::builder::parse_address(&address)?,
        None => load_wallet()
            .map(|w| w.address())
            .ok_or_else(|| Error::Wallet("pass --address or set PRIVATE_KEY".to_string()))?,
    };
    let chain = connect(&config)?;
    let registry = registry(&config);
    let token = match token {
        Some(symbol) => registry.resolve(&symbol)?,
        None => registry.native(),
    };

    let decimals = registry.decimals(chain.as_ref(), &token).await?;
    let balance = if token.is_native() {
        chain.get_balance(owner).await?
    } else {
        chain::erc20_balance(chain.as_ref(), token.address, owner).await?
    };
    println!("{} {} ({})", format_units(balance, decimals), token.symbol, owner);
    Ok(())
}

async fn run_liquidity(config: Config, a: String, b: String) -> Result<()> {
    let chain = connect(&config)?;
    let engine = QuoteEngine::new(chain, registry(&config), config.dex.clone());
    let info = engine.check_liquidity(&a, &b).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
