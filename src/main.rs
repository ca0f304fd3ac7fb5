use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use m3undle::{
    config::Config,
    database::Database,
    pipeline::RefreshPipeline,
    services::{EventBus, RefreshCoordinator},
    web::WebServer,
};

#[derive(Parser)]
#[command(name = "m3undle")]
#[command(version)]
#[command(about = "Self-hosted IPTV lineup manager with stable client endpoints")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("m3undle={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting m3undle v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }

    info!("Using database: {}", config.database.url);

    // An unreachable database at startup is fatal; everything after this
    // point degrades rather than exits.
    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    let (stop_tx, stop_rx) = watch::channel(false);

    let events = EventBus::new();
    let pipeline = RefreshPipeline::new(database.clone(), config.snapshot.clone());
    let coordinator = RefreshCoordinator::new(
        pipeline,
        events,
        config.refresh.clone(),
        stop_rx.clone(),
    );

    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator.run().await {
                error!("Refresh coordinator failed: {}", e);
            }
        });
    }

    {
        let stop_tx = stop_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                let _ = stop_tx.send(true);
            }
        });
    }

    let server = WebServer::new(config, database)?;
    server.serve(stop_rx).await?;

    info!("Shutdown complete");
    Ok(())
}
