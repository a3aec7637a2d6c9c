// src/main.rs — chatrelay entry point

use std::path::PathBuf;

use clap::Parser;

use chatrelay::api::{start_server, ApiState};
use chatrelay::infra::config::Config;
use chatrelay::infra::logger;
use chatrelay::store::StoreManager;

#[derive(Parser, Debug)]
#[command(name = "chatrelay", version, about = "Chat-session front end for a multi-agent research assistant")]
struct Cli {
    /// Path to config.toml (defaults to ~/.chatrelay/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured listen port
    #[arg(long)]
    port: Option<u16>,

    /// Override the configured database path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = if let Some(ref path) = cli.config {
        let config = Config::load_from(path)?;
        config.validate()?;
        config
    } else {
        Config::load()?
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(db) = cli.db {
        config.server.db_path = Some(db);
    }

    let db_path = config.db_path();
    tracing::info!("opening store at {}", db_path.display());
    let manager = StoreManager::open(&db_path)?;
    let (kv, _store_task) = manager.spawn();

    let state = ApiState::new(kv, config);
    start_server(state).await
}
