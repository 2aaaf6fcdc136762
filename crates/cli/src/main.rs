mod config_commands;
mod load_commands;
mod tree_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    ribbon_config::RibbonConfig,
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "ribbon", about = "Ribbon: extension command loader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./ribbon.toml and the user config dir).
    #[arg(long, global = true, env = "RIBBON_CONFIG")]
    config: Option<PathBuf>,

    /// Custom data directory (cache artifacts, command logs).
    #[arg(long, global = true, env = "RIBBON_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Extension search root; repeat to add more. Replaces the configured roots.
    #[arg(long = "search-path", short = 's', global = true)]
    search_paths: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, bind and materialize every extension into a headless UI.
    Load {
        /// Print the load summary as JSON.
        #[arg(long)]
        json: bool,
        /// Keep running and reload when extension files change.
        #[cfg(feature = "file-watcher")]
        #[arg(long)]
        watch: bool,
    },
    /// Load everything, then invoke one command by unique id.
    Run {
        unique_id: String,
        /// Use the command's configure entry point.
        #[arg(long)]
        configure: bool,
        /// Extra arguments passed to the script.
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Parse one extension directory and print its component tree.
    Tree {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the content hash of an extension directory.
    Hash { path: PathBuf },
    /// Cache artifact management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the artifact directory.
    Path,
    /// Delete every cached tree and binding artifact.
    Clear,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RibbonConfig> {
    let mut config = match &cli.config {
        Some(path) => ribbon_config::load_config(path)?,
        None => ribbon_config::discover_and_load(),
    };
    if !cli.search_paths.is_empty() {
        config.extensions.search_paths = cli.search_paths.clone();
    }
    debug!(search_paths = ?config.extensions.search_paths, "configuration loaded");
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "ribbon starting");

    if let Some(ref dir) = cli.data_dir {
        ribbon_config::set_data_dir(dir.clone());
    }

    match &cli.command {
        #[cfg(feature = "file-watcher")]
        Commands::Load { json, watch } => {
            let config = load_config(&cli)?;
            if *watch {
                load_commands::watch(config).await
            } else {
                load_commands::load(config, *json).await
            }
        },
        #[cfg(not(feature = "file-watcher"))]
        Commands::Load { json } => load_commands::load(load_config(&cli)?, *json).await,
        Commands::Run {
            unique_id,
            configure,
            args,
        } => load_commands::run(load_config(&cli)?, unique_id, *configure, args.clone()).await,
        Commands::Tree { path, json } => {
            tree_commands::tree(&load_config(&cli)?, path, *json)
        },
        Commands::Hash { path } => tree_commands::hash(path),
        Commands::Cache { action } => {
            let config = load_config(&cli)?;
            let store = ribbon_cache::CacheStore::from_config(&config);
            match action {
                CacheAction::Path => println!("{}", store.dir().display()),
                CacheAction::Clear => {
                    let removed = store.clear()?;
                    println!("Removed {removed} artifact(s) from {}", store.dir().display());
                },
            }
            Ok(())
        },
        Commands::Config { action } => config_commands::handle_config(action, cli.config.as_deref()),
    }
}
