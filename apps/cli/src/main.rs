//! # modsync CLI Entry Point
//!
//! Synchronizes a local folder with a published modpack.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use modsync::{
    ConsoleInterface, HasherRegistry, Location, Side, SourceResolver, SyncConfig, UpdateManager,
    UpdateOptions, UpdateOutcome, UserInterface, DEFAULT_CACHE_FILE,
};

/// Keep a modpack folder in sync with its published pack file.
#[derive(Parser, Debug)]
#[command(name = "modsync", version, about)]
struct Cli {
    /// URL or path of the pack descriptor (pack.toml)
    pack: String,

    /// Side to install for: client, server or both
    #[arg(short, long, default_value = "client")]
    side: Side,

    /// Accepted for compatibility with launcher setups; the console is the only interface
    #[arg(short = 'g', long)]
    no_gui: bool,

    /// Title shown in front of progress output
    #[arg(long)]
    title: Option<String>,

    /// Folder the pack is installed into
    #[arg(long, default_value = ".")]
    pack_folder: PathBuf,

    /// Cache file, relative to the pack folder unless absolute
    #[arg(long, default_value = DEFAULT_CACHE_FILE)]
    meta_file: PathBuf,

    /// MultiMC instance folder holding mmc-pack.json, relative to the pack folder
    #[arg(long, default_value = "..")]
    multimc_folder: PathBuf,

    /// Seconds to wait for data from a server before giving up on a file
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// API key for resolving CurseForge downloads
    #[arg(long)]
    curseforge_api_key: Option<String>,

    /// Install the files that worked even if others failed
    #[arg(long)]
    continue_on_error: bool,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let mut ui = ConsoleInterface::new().with_continue_on_error(cli.continue_on_error);
    if let Some(title) = &cli.title {
        ui = ui.with_title(title.clone());
    }
    if cli.no_gui {
        debug!("Console interface requested");
    }

    match run(&cli, &ui).await {
        Ok(outcome) => {
            info!(?outcome, "Done");
            if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            match err.downcast_ref::<modsync::SyncError>() {
                Some(sync_error) => ui.report_fatal(sync_error),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, ui: &ConsoleInterface) -> anyhow::Result<UpdateOutcome> {
    let pack_location = Location::parse(&cli.pack)?;
    let options = UpdateOptions::new(pack_location, &cli.pack_folder)
        .with_side(cli.side)
        .with_cache_file(&cli.meta_file)
        .with_launcher_folder(&cli.multimc_folder);

    tokio::fs::create_dir_all(&cli.pack_folder)
        .await
        .with_context(|| format!("Cannot create pack folder {}", cli.pack_folder.display()))?;

    let mut config =
        SyncConfig::default().with_curseforge_api_key(cli.curseforge_api_key.clone());
    if let Some(secs) = cli.timeout {
        config = config.with_read_timeout(Duration::from_secs(secs));
    }
    let resolver = SourceResolver::with_defaults(&config)?;
    let hashers = HasherRegistry::with_defaults();

    let outcome = UpdateManager::new(options, config, &resolver, &hashers, ui)
        .run()
        .await?;
    Ok(outcome)
}
