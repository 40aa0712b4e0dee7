use clap::Parser;
use color_eyre::eyre::{
    Result,
    eyre,
};
use jackpot_client::{
    config::RawConfig,
    types::Address,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::OnceLock,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};
use url::Url;

mod app;
mod demo;
mod signer;
mod ui;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Terminal dashboard for the on-chain jackpot.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Published package id of the jackpot contract
    #[arg(long, env = "JACKPOT_PACKAGE_ID")]
    package_id: Option<String>,

    /// Shared GameRegistry object id
    #[arg(long, env = "JACKPOT_GAME_REGISTRY")]
    game_registry: Option<String>,

    /// Shared RoundHistory object id
    #[arg(long, env = "JACKPOT_ROUND_HISTORY")]
    round_history: Option<String>,

    #[arg(long, env = "JACKPOT_ADMIN_CAP")]
    admin_cap: Option<String>,

    /// Pin a pool instead of following the registry pointer
    #[arg(long, env = "JACKPOT_CURRENT_POOL")]
    current_pool: Option<String>,

    /// devnet, testnet, mainnet or localnet
    #[arg(long, env = "JACKPOT_NETWORK")]
    network: Option<String>,

    /// Override the fullnode URL of the selected network
    #[arg(long, env = "JACKPOT_RPC_URL")]
    rpc_url: Option<Url>,

    /// Accept the placeholder package id (local development only)
    #[arg(long)]
    allow_placeholder: bool,

    /// Connect this address instead of the one remembered from the last run
    #[arg(long, env = "JACKPOT_ADDRESS")]
    address: Option<Address>,

    /// Where the wallet session and exported transactions live
    #[arg(long, env = "JACKPOT_SESSION_DIR")]
    session_dir: Option<String>,

    /// Mix simulated purchases into the activity panel
    #[arg(long)]
    demo: bool,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

impl Args {
    fn raw_config(&self) -> RawConfig {
        RawConfig {
            package_id: self.package_id.clone(),
            admin_cap: self.admin_cap.clone(),
            game_registry: self.game_registry.clone(),
            round_history: self.round_history.clone(),
            current_pool: self.current_pool.clone(),
            network: self.network.clone(),
            rpc_url: self.rpc_url.as_ref().map(Url::to_string),
            allow_placeholder: self.allow_placeholder,
        }
    }
}

// The dashboard owns the terminal, so logs only go to a file.
fn init_tracing(log_dir: &Path) -> Result<()> {
    let appender = rolling::daily(log_dir, "jackpot-tui.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!(e))
}

fn print_config_diagnostic(err: &jackpot_client::Error) {
    eprintln!("jackpot-tui cannot start: {err}");
    eprintln!();
    eprintln!("Set the contract identifiers with flags or environment variables:");
    eprintln!("  --package-id     JACKPOT_PACKAGE_ID");
    eprintln!("  --game-registry  JACKPOT_GAME_REGISTRY");
    eprintln!("  --round-history  JACKPOT_ROUND_HISTORY");
    eprintln!("  --network        JACKPOT_NETWORK (default devnet)");
    eprintln!();
    eprintln!("Run with --help for the full list.");
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(&args.log_dir)?;
    tracing::info!("starting jackpot-tui");

    let config = match args.raw_config().validate() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "invalid configuration");
            print_config_diagnostic(&err);
            std::process::exit(2);
        }
    };

    let options = app::AppOptions {
        address: args.address,
        session_dir: args.session_dir,
        demo: args.demo,
    };
    app::run_app(config, options).await
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn args__flags_fill_raw_config() {
        // given
        let args = Args::parse_from([
            "jackpot-tui",
            "--package-id",
            "0x1",
            "--game-registry",
            "0x2",
            "--round-history",
            "0x3",
            "--network",
            "testnet",
            "--rpc-url",
            "https://rpc.example.org",
        ]);

        // when
        let config = args.raw_config().validate().unwrap();

        // then
        assert_eq!(config.game_registry, Address::from_u8(2));
        assert_eq!(config.rpc_url(), "https://rpc.example.org/");
        assert!(!args.demo);
    }

    #[test]
    fn args__rejects_malformed_rpc_url() {
        // when
        let result = Args::try_parse_from(["jackpot-tui", "--rpc-url", "not a url"]);

        // then
        assert!(result.is_err());
    }
}
