use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sanctuary::{
    encyclopedia::Encyclopedia,
    model::ItemKind,
    rng::RngManager,
    web::{self, AppState},
    Catalog, Config, Sanctuary, SanctuarySettings,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Virtual Backyard Bird Sanctuary server")]
struct Cli {
    /// Path to the server configuration YAML
    #[arg(long, default_value = "fixtures/sanctuary.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Override the listen host
        #[arg(long)]
        host: Option<String>,

        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,

        /// Override the attraction seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Load and validate the catalog and encyclopedia, then exit
    Check,
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("sanctuary={default_level},tower_http=info,warn").into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_encyclopedia(config: &Config) -> Option<Arc<Encyclopedia>> {
    let path = config.encyclopedia.as_ref()?;
    match Encyclopedia::load(path) {
        Ok(book) => {
            info!("loaded {} encyclopedia entries from {}", book.len(), path.display());
            Some(Arc::new(book))
        }
        Err(err) => {
            warn!("encyclopedia unavailable ({}): {err}", path.display());
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_yaml(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    init_tracing(&config.logging.level);

    let catalog = Catalog::load(&config.catalog)
        .with_context(|| format!("Failed to load catalog {}", config.catalog.display()))?;
    info!(
        birds = catalog.birds().len(),
        accessories = catalog.items(ItemKind::Accessory).len(),
        food = catalog.items(ItemKind::Food).len(),
        "catalog loaded"
    );
    let encyclopedia = load_encyclopedia(&config);

    match cli.command {
        Command::Check => {
            println!(
                "Catalog OK: {} birds, {} accessories, {} food; encyclopedia: {}",
                catalog.birds().len(),
                catalog.items(ItemKind::Accessory).len(),
                catalog.items(ItemKind::Food).len(),
                encyclopedia
                    .as_ref()
                    .map(|book| format!("{} entries", book.len()))
                    .unwrap_or_else(|| "none".to_string()),
            );
            Ok(())
        }
        Command::Serve { host, port, seed } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let rng = seed
                .or(config.game.seed)
                .map(RngManager::new)
                .unwrap_or_else(RngManager::from_entropy);
            info!(seed = rng.master_seed(), "attraction seed");

            let settings = SanctuarySettings {
                seed: rng.master_seed(),
                starting_coins: config.game.starting_coins,
                mismatch_penalty: config.game.mismatch_penalty,
            };
            let sanctuary = Arc::new(Sanctuary::new(Arc::new(catalog), settings));
            let state = Arc::new(AppState::new(sanctuary, encyclopedia));
            web::run(state, &config.server.host, config.server.port).await
        }
    }
}
