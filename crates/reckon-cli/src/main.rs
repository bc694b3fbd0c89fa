use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

mod commands;

use commands::{requests, sync};

#[derive(Parser)]
#[command(name = "reckon")]
#[command(about = "Broker-state reconciliation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Configuration utilities
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },

    /// Fetch history + pending pages from the exchange and merge them
    Import {
        #[command(subcommand)]
        book: ImportCmd,
    },

    /// Gate a local request into the store
    Submit(SubmitArgs),

    /// Cancel matching requests
    Cancel(CancelArgs),

    /// Expire requests and stop legs past their expiry time
    Sweep {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations (also seeds the reference tables).
    Migrate,
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Compute layered config hash + print canonical JSON
    Hash {
        /// Paths in merge order (base -> env -> account...)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ImportCmd {
    Orders(SyncArgs),
    Stops(SyncArgs),
}

#[derive(Args)]
struct SyncArgs {
    /// Layered config paths in merge order
    #[arg(long = "config", required = true)]
    config_paths: Vec<String>,

    /// Overrides sync.deadline_secs
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[derive(Args)]
struct SubmitArgs {
    #[arg(long = "config", required = true)]
    config_paths: Vec<String>,

    /// Instrument symbol (e.g. BTC-USDT)
    #[arg(long)]
    symbol: String,

    /// Position side: long | short | net
    #[arg(long, default_value = "net")]
    side: String,

    /// buy | sell
    #[arg(long)]
    action: String,

    #[arg(long)]
    size: Decimal,

    /// Omit for a market request
    #[arg(long)]
    price: Option<Decimal>,

    /// Request type code (limit, market, post_only, ...)
    #[arg(long = "type", default_value = "limit")]
    request_type: String,

    /// Update this request instead of the position's newest open one
    #[arg(long)]
    request: Option<String>,

    #[arg(long, default_value_t = false)]
    reduce_only: bool,

    #[arg(long)]
    memo: Option<String>,

    /// Expiry from now; defaults to requests.default_expiry_secs
    #[arg(long)]
    expiry_secs: Option<i64>,
}

#[derive(Args)]
struct CancelArgs {
    #[arg(long = "config", required = true)]
    config_paths: Vec<String>,

    /// Request key (client order id)
    #[arg(long)]
    request: Option<String>,

    /// Instrument symbol; cancels on that position
    #[arg(long)]
    symbol: Option<String>,

    #[arg(long, default_value = "net")]
    side: String,

    /// Statuses to match (repeatable); defaults to the active ones
    #[arg(long = "status")]
    statuses: Vec<String>,

    #[arg(long)]
    memo: Option<String>,

    /// Also cancel the stop legs on the position
    #[arg(long, default_value_t = false)]
    stops: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = reckon_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = reckon_db::status(&pool).await?;
                    println!("db_ok={} has_requests_table={}", s.ok, s.has_requests_table);
                }
                DbCmd::Migrate => {
                    reckon_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Config { cmd } => match cmd {
            ConfigCmd::Hash { paths } => {
                let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
                let loaded = reckon_config::load_layered_yaml(&path_refs)?;
                println!("config_hash={}", loaded.config_hash);
                println!("{}", loaded.canonical_json);
            }
        },

        Commands::Import { book } => match book {
            ImportCmd::Orders(a) => {
                sync::import(sync::Feed::Orders, &a.config_paths, a.deadline_secs).await?
            }
            ImportCmd::Stops(a) => {
                sync::import(sync::Feed::Stops, &a.config_paths, a.deadline_secs).await?
            }
        },

        Commands::Submit(a) => {
            requests::submit(requests::SubmitInput {
                config_paths: a.config_paths,
                symbol: a.symbol,
                side: a.side,
                action: a.action,
                size: a.size,
                price: a.price,
                request_type: a.request_type,
                request: a.request,
                reduce_only: a.reduce_only,
                memo: a.memo,
                expiry_secs: a.expiry_secs,
            })
            .await?
        }

        Commands::Cancel(a) => {
            requests::cancel(requests::CancelInput {
                config_paths: a.config_paths,
                request: a.request,
                symbol: a.symbol,
                side: a.side,
                statuses: a.statuses,
                memo: a.memo,
                stops: a.stops,
            })
            .await?
        }

        Commands::Sweep { config_paths } => requests::sweep(&config_paths).await?,
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
