use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use std::net::SocketAddr;
use std::path::PathBuf;
use taxonomy_reorder::api::{self, TermStore};
use taxonomy_reorder::app::ReorderApp;
use taxonomy_reorder::config::{sanitize_key, ReorderConfig, NONCE_ENV};
use taxonomy_reorder::render::render_outline;
use taxonomy_reorder::sync::{HttpRemote, SyncController};
use taxonomy_reorder::tree::{parent_of, validate_forest, Forest};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the reference terms server
    Serve {
        /// The address to bind to
        #[arg(short, long, default_value = "127.0.0.1:37240")]
        addr: SocketAddr,
        /// YAML file with the taxonomies and terms to serve
        #[arg(long)]
        seed: Option<PathBuf>,
        /// Nonce clients must send; empty accepts any request
        #[arg(long, env = NONCE_ENV, default_value = "")]
        nonce: String,
    },
    /// Client commands
    Client {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Overrides the configured REST base URL
        #[arg(long)]
        url: Option<String>,
        /// Taxonomy to work on; defaults to the configured default
        #[arg(short, long)]
        taxonomy: Option<String>,
        #[command(subcommand)]
        command: ClientCommands,
    },
    /// Validate a configuration file
    CheckConfig {
        /// Path to the YAML configuration
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum ClientCommands {
    /// Display the term tree
    Tree {
        /// Show every configured taxonomy
        #[arg(long)]
        all: bool,
        /// Print JSON instead of an outline
        #[arg(long)]
        json: bool,
    },
    /// Move a term under a new parent and save
    Move {
        /// The term to move
        id: i32,
        /// The new parent term id, 0 for the root
        #[arg(long)]
        to: i32,
        /// Position among the new siblings; appends when omitted
        #[arg(long)]
        index: Option<usize>,
    },
    /// Upload a new tree structure from JSON file
    Upload {
        /// Path to JSON file containing the tree structure
        file: PathBuf,
    },
}

fn client_config(
    config: Option<PathBuf>,
    url: Option<String>,
    taxonomy: Option<&str>,
) -> anyhow::Result<ReorderConfig> {
    let mut config = match config {
        Some(path) => ReorderConfig::load(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => {
            let mut config = ReorderConfig::with_taxonomies(&[taxonomy.unwrap_or("category")])?;
            config.apply_env_overrides();
            config
        }
    };
    if let Some(url) = url {
        config.rest_base = url;
    }
    Ok(config)
}

async fn serve(addr: SocketAddr, seed: Option<PathBuf>, nonce: String) -> anyhow::Result<()> {
    let store = match seed {
        Some(path) => {
            let yaml = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            TermStore::from_yaml_str(&yaml)?
        }
        None => TermStore::new(),
    };

    let app = api::create_router(store, &nonce);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn print_tree(config: &ReorderConfig, taxonomy: &str, all: bool, json: bool) -> anyhow::Result<()> {
    let controller = SyncController::new(HttpRemote::from_config(config));
    let names: Vec<&str> = if all {
        config.taxonomies.iter().map(|t| t.name.as_str()).collect()
    } else {
        vec![taxonomy]
    };

    let results = join_all(names.iter().map(|name| controller.load(name))).await;

    for (name, result) in names.iter().zip(results) {
        let forest = result?;
        if json {
            println!("{}", serde_json::to_string_pretty(&forest)?);
        } else {
            if all {
                println!("{}:", config.label(name).unwrap_or(*name));
            }
            if forest.is_empty() {
                println!("No terms found for {}.", name);
            } else {
                print!("{}", render_outline(&forest));
            }
        }
    }
    Ok(())
}

async fn move_term(
    config: ReorderConfig,
    taxonomy: &str,
    id: i32,
    to: i32,
    index: Option<usize>,
) -> anyhow::Result<()> {
    let remote = HttpRemote::from_config(&config);
    let mut app = ReorderApp::new(config, remote);
    app.select(taxonomy).await?;

    if parent_of(app.store().forest(), id).is_none() {
        bail!("Term {} not found in {}", id, taxonomy);
    }

    app.drag(id, to, index.unwrap_or(usize::MAX))?;
    let applied = app.pump();
    if let Some(rejected) = app.take_rejected().into_iter().next() {
        bail!("Move rejected: {}", rejected);
    }
    if applied == 0 {
        println!("Nothing to do, term {} is already there.", id);
        return Ok(());
    }

    let message = app.save().await?;
    println!("{}", message);
    print!("{}", render_outline(app.store().forest()));
    Ok(())
}

async fn upload(config: &ReorderConfig, taxonomy: &str, file: PathBuf) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let forest: Forest = serde_json::from_str(&content)?;
    validate_forest(&forest)?;

    let controller = SyncController::new(HttpRemote::from_config(config));
    let outcome = controller.save(&forest, taxonomy).await?;
    println!("{}", outcome.message);
    print!("{}", render_outline(&outcome.forest));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { addr, seed, nonce } => serve(addr, seed, nonce).await,
        Commands::Client {
            config,
            url,
            taxonomy,
            command,
        } => {
            let taxonomy = taxonomy.map(|taxonomy| sanitize_key(&taxonomy));
            let config = client_config(config, url, taxonomy.as_deref())?;
            let taxonomy = taxonomy.unwrap_or_else(|| config.default_taxonomy().to_string());
            match command {
                ClientCommands::Tree { all, json } => print_tree(&config, &taxonomy, all, json).await,
                ClientCommands::Move { id, to, index } => {
                    move_term(config, &taxonomy, id, to, index).await
                }
                ClientCommands::Upload { file } => upload(&config, &taxonomy, file).await,
            }
        }
        Commands::CheckConfig { path } => {
            let config = ReorderConfig::load(&path)
                .with_context(|| format!("Invalid configuration {}", path.display()))?;
            println!(
                "OK: {} taxonomies, default {}",
                config.taxonomies.len(),
                config.default_taxonomy()
            );
            Ok(())
        }
    }
}
