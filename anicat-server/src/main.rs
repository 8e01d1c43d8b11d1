use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anicat_config::{Config, ConfigLoad, ConfigLoader};
use anicat_server::{
    AppState, create_app, manifest::Manifest, startup::Services,
    static_build::StaticBuilder,
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "anicat-server")]
#[command(about = "Anime catalog addon backed by AniList, TMDB and Kitsu")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to the TOML config file
    #[arg(short, long, env = "ANICAT_CONFIG")]
    config: Option<PathBuf>,

    /// Path to a .env file (defaults to ./.env when present)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (the default)
    Serve,
    /// Pre-render the manifest, catalogs and metas to static JSON files
    Build(BuildArgs),
}

#[derive(ClapArgs, Debug, Clone)]
struct BuildArgs {
    /// Output directory
    #[arg(long, default_value = "dist")]
    out: PathBuf,

    /// Pages to render per catalog
    #[arg(long, default_value_t = 2)]
    pages: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.serve)?;

    match cli.command {
        Some(Command::Build(args)) => run_build(config, args).await,
        Some(Command::Serve) | None => run_server(config).await,
    }
}

fn load_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &args.env_file {
        loader = loader.with_env_file(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "using config file");
    }
    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => warn!(hint = %hint, "{}", warning.message),
            None => warn!("{}", warning.message),
        }
    }

    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    Ok(config)
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let services = Services::bootstrap(&config).await?;
    let maintenance = services.spawn_maintenance(&config);

    let manifest = Manifest::new(
        services.orchestrator.catalogs(),
        config.server.public_url.as_deref(),
    );
    let app = create_app(AppState::new(services.orchestrator.clone(), manifest));

    let bind = (config.server.host.as_str(), config.server.port);
    let listener = tokio::net::TcpListener::bind(bind).await.with_context(|| {
        format!("failed to bind {}:{}", config.server.host, config.server.port)
    })?;
    let addr: SocketAddr = listener.local_addr()?;
    info!(%addr, "anicat listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in maintenance {
        task.abort();
    }
    services.persist_snapshots().await;
    info!("shutdown complete");
    Ok(())
}

async fn run_build(config: Config, args: BuildArgs) -> anyhow::Result<()> {
    let services = Services::bootstrap(&config).await?;
    let manifest = Manifest::new(
        services.orchestrator.catalogs(),
        config.server.public_url.as_deref(),
    );

    let report = StaticBuilder::new(
        Arc::clone(&services.orchestrator),
        manifest,
        &args.out,
        args.pages,
    )
    .run()
    .await
    .with_context(|| format!("static build into {} failed", args.out.display()))?;

    services.persist_snapshots().await;
    info!(
        pages = report.catalog_pages,
        metas = report.metas,
        "static build written to {}",
        args.out.display()
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
