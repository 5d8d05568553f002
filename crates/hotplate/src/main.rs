use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use hotplate::http::{build_router, AppState};
use hotplate::{decide, initialize_root, DecideRequest, HotplateConfig, RootError};
use hotplate_notify::{ExternalService, SharedSecret};

/// Hotplate: access policy and webhook secrets for a Hotplate site.
#[derive(Parser, Debug)]
#[command(name = "hotplate", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the policy and webhook endpoints over HTTP
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Evaluate one decision request read from a JSON file
    Decide {
        /// JSON file with {actor, op, path, existing?, proposed?}; `-` for stdin
        #[arg(long)]
        request: PathBuf,
    },

    /// Print a freshly generated secret
    GenerateSecret {
        /// Secret length (defaults to the configured length)
        #[arg(long)]
        length: Option<usize>,
    },

    /// Replace a webhook secret in the document snapshot
    Rotate {
        /// calendar-edit, calendar-view or mail
        #[arg(long)]
        service: ExternalService,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("hotplate=debug,hotplate_policy=debug,hotplate_notify=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hotplate=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<HotplateConfig, RootError> {
    match path {
        Some(p) => HotplateConfig::load(p),
        None => HotplateConfig::load(&HotplateConfig::default_config_path()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), RootError> {
    let config = load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::Serve { bind, port } => cmd_serve(config, bind, port).await,
        Commands::Decide { request } => cmd_decide(config, &request),
        Commands::GenerateSecret { length } => cmd_generate_secret(&config, length),
        Commands::Rotate { service } => cmd_rotate(config, service),
    }
}

async fn cmd_serve(
    mut config: HotplateConfig,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<(), RootError> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let addr = format!("{}:{}", config.server.bind, config.server.port);

    let state = Arc::new(AppState {
        root: initialize_root(config)?,
    });
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "hotplate server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("shutting down");
    state.root.shutdown().await
}

fn cmd_decide(config: HotplateConfig, request: &Path) -> Result<(), RootError> {
    let raw = if request.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(request)?
    };
    let request: DecideRequest = serde_json::from_str(&raw)?;

    let state = initialize_root(config)?;
    let verdict = decide(state.store.as_ref(), &request)?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

fn cmd_generate_secret(config: &HotplateConfig, length: Option<usize>) -> Result<(), RootError> {
    let length = length.unwrap_or(config.rotation.secret_length);
    let mut rotation = config.rotation.clone();
    rotation.secret_length = length;
    let policy = rotation.to_policy()?;
    let secret: SharedSecret = policy.next_secret(&mut rand::thread_rng());
    println!("{}", secret.expose());
    Ok(())
}

fn cmd_rotate(config: HotplateConfig, service: ExternalService) -> Result<(), RootError> {
    let state = initialize_root(config)?;
    state.force_rotate(service)?;
    state.persist()?;
    println!("Rotated the {} secret.", service);
    println!("  Snapshot: {}", state.config.data_file.display());
    Ok(())
}
