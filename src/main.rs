//! Binary entrypoint for the tinypet CLI.
//!
//! Commands:
//! - `start` - run the bot with every adapter enabled in the config
//! - `init` - write a starter `config.toml`
//! - `status` - count players and list quarantined ones
//! - `inspect <identity>` - print one player record as JSON
//! - `release <identity>` - clear a quarantine flag after a manual repair
//!
//! The bot must be stopped for `status`, `inspect` and `release`: the data
//! directory is locked by whichever process opened it first.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::info;

use tinypet::adapters;
use tinypet::config::Config;
use tinypet::gateway::Gateway;
use tinypet::sim::{PetError, PetStore, PetStoreBuilder, PlayerId};

#[derive(Parser)]
#[command(name = "tinypet")]
#[command(about = "A virtual pet that lives in your chat")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Start,
    /// Write a default configuration file
    Init,
    /// Show player counts and quarantined players
    Status,
    /// Print a player's stored record as JSON
    Inspect {
        /// Player identity, e.g. telegram:12345
        identity: String,
    },
    /// Clear a player's quarantine flag
    Release {
        /// Player identity, e.g. telegram:12345
        identity: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            config.validate()?;
            info!("Starting tinypet v{}", env!("CARGO_PKG_VERSION"));
            let adapters = adapters::from_config(&config)?;
            if adapters.is_empty() {
                return Err(anyhow!(
                    "No adapters enabled. Turn on [console], [telegram] or [irc] in {}",
                    cli.config
                ));
            }
            let gateway = Gateway::new(config)?;
            gateway.run(adapters).await?;
        }
        Commands::Init => {
            if std::path::Path::new(&cli.config).exists() {
                return Err(anyhow!("{} already exists, not overwriting", cli.config));
            }
            Config::create_default(&cli.config).await?;
            println!("Wrote default configuration to {}", cli.config);
            println!("Enable an adapter and run `tinypet start`.");
        }
        Commands::Status => {
            let config = require_config(pre_config, &cli.config).await?;
            let store = open_store(&config)?;
            let ids = store.list_player_ids()?;
            let mut active = 0usize;
            let mut unreadable = 0usize;
            for id in &ids {
                match store.load(id) {
                    Ok(record) if record.active => active += 1,
                    Ok(_) => {}
                    Err(_) => unreadable += 1,
                }
            }
            println!("tinypet status");
            println!("  data dir:   {}", config.storage.data_dir);
            println!("  players:    {}", ids.len());
            println!("  active:     {}", active);
            println!("  unreadable: {}", unreadable);
            let flagged = store.flagged()?;
            if flagged.is_empty() {
                println!("  quarantined: none");
            } else {
                println!("  quarantined:");
                for (id, reason) in flagged {
                    println!("    {} - {}", id, reason);
                }
            }
        }
        Commands::Inspect { identity } => {
            let config = require_config(pre_config, &cli.config).await?;
            let store = open_store(&config)?;
            let id = parse_identity(&identity)?;
            match store.load(&id) {
                Ok(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                Err(PetError::Quarantined(_)) => {
                    let reason = store
                        .flagged()?
                        .into_iter()
                        .find(|(flagged, _)| flagged == id.as_str())
                        .map(|(_, reason)| reason)
                        .unwrap_or_default();
                    println!("{} is quarantined: {}", id, reason);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Release { identity } => {
            let config = require_config(pre_config, &cli.config).await?;
            let store = open_store(&config)?;
            let id = parse_identity(&identity)?;
            if store.release(&id)? {
                println!("Released {}", id);
            } else {
                println!("{} was not quarantined", id);
            }
        }
    }

    Ok(())
}

async fn require_config(pre: Option<Config>, path: &str) -> Result<Config> {
    match pre {
        Some(config) => Ok(config),
        None => Config::load(path).await,
    }
}

fn open_store(config: &Config) -> Result<PetStore> {
    PetStoreBuilder::new(&config.storage.data_dir)
        .rules(config.simulation.clone())
        .open()
        .map_err(|e| anyhow!("Cannot open {} (is the bot running?): {}", config.storage.data_dir, e))
}

fn parse_identity(raw: &str) -> Result<PlayerId> {
    PlayerId::parse(raw).ok_or_else(|| anyhow!("'{}' is not an identity like telegram:12345", raw))
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    // sled is chatty at debug
    builder.filter_module("sled", log::LevelFilter::Warn);

    let file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    if let Some(f) = file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the terminal only when someone is watching it
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    builder.init();
}
