//! Ladder CLI
//!
//! Runs ladder operations against a local SQLite database.

mod commands;
mod style;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use ladder_engine::{Caller, EngineConfig, LadderEngine, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;
use style::print_error;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "ladder")]
#[command(about = "Ladder ranking and challenge engine", version)]
struct Cli {
    /// SQLite database file (overrides the config file)
    #[arg(long, env = "LADDER_DB")]
    db: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "LADDER_CONFIG")]
    config: Option<PathBuf>,

    /// Ladder to operate on (defaults to the configured or current ladder)
    #[arg(short, long)]
    ladder: Option<String>,

    /// Identity of the caller
    #[arg(long = "as", default_value = "local", env = "LADDER_USER")]
    user: String,

    /// Act with admin rights
    #[arg(long)]
    admin: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Join the ladder at the bottom
    Signup,
    /// Leave the ladder
    Leave,
    /// Challenge another player
    Challenge { opponent: String },
    /// Cancel your pending challenge (admins may name a player)
    Cancel { target: Option<String> },
    /// Report the result of your pending challenge
    Report {
        #[arg(value_enum)]
        result: GameResult,
        /// Report on behalf of this player (admin)
        target: Option<String>,
    },
    /// Reverse a player's latest played challenge (admin)
    Dispute { target: String },
    /// Remove a player from the ladder (admin)
    Kick {
        /// Player id, or `#<rank>`
        target: String,
    },
    /// Randomize the ranking while signups are open (admin)
    Shuffle,
    /// Show or adjust a player's strikes (admin)
    Strikes {
        target: String,
        #[arg(default_value_t = 0, allow_hyphen_values = true)]
        delta: i32,
    },
    /// Block a player from challenging and being challenged (admin)
    Timeout { target: String, days: u32 },
    /// Show your standing and pending challenge
    Status,
    /// List players you can challenge right now
    Candidates,
    /// Print the ranking
    Ranking,
    /// Read or write settings (admin)
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Time out overdue challenges (admin)
    Sweep,
    /// Sweep periodically until interrupted
    Watch,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Get {
        name: String,
        /// Read the global value instead of the ladder's
        #[arg(long)]
        global: bool,
    },
    Set {
        name: String,
        value: String,
        /// Write the global value instead of a ladder override
        #[arg(long)]
        global: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum GameResult {
    Win,
    Loss,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ladder_engine=debug,info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.database_path = db.clone();
    }
    debug!("Opening ladder database {}", config.database_path.display());

    let engine = Arc::new(LadderEngine::new(SqliteStore::open(
        &config.database_path,
    )?));
    let ladder = match cli.ladder.clone().or_else(|| config.default_ladder.clone()) {
        Some(ladder) => ladder,
        None => engine.current_ladder()?,
    };
    let caller = if cli.admin {
        Caller::admin(cli.user.clone())
    } else {
        Caller::player(cli.user.clone())
    };

    let ctx = commands::Context {
        engine,
        ladder,
        caller,
        json: cli.json,
    };

    match cli.command {
        Commands::Signup => commands::signup(&ctx),
        Commands::Leave => commands::leave(&ctx),
        Commands::Challenge { opponent } => commands::challenge(&ctx, &opponent),
        Commands::Cancel { target } => commands::cancel(&ctx, target.as_deref()),
        Commands::Report { result, target } => {
            commands::report(&ctx, result == GameResult::Win, target.as_deref())
        }
        Commands::Dispute { target } => commands::dispute(&ctx, &target),
        Commands::Kick { target } => commands::kick(&ctx, &target),
        Commands::Shuffle => commands::shuffle(&ctx),
        Commands::Strikes { target, delta } => commands::strikes(&ctx, &target, delta),
        Commands::Timeout { target, days } => commands::timeout(&ctx, &target, days),
        Commands::Status => commands::status(&ctx),
        Commands::Candidates => commands::candidates(&ctx),
        Commands::Ranking => commands::ranking(&ctx),
        Commands::Config { action } => match action {
            ConfigAction::Get { name, global } => commands::config_get(&ctx, &name, global),
            ConfigAction::Set {
                name,
                value,
                global,
            } => commands::config_set(&ctx, &name, &value, global),
        },
        Commands::Sweep => commands::sweep(&ctx),
        Commands::Watch => commands::watch(&ctx, &config).await,
    }
}
