use anyhow::Context as _;
use apollo_gateway::GatewayConfig;
use apollo_gateway::RegistryMode;
use apollo_gateway_server::accounts;
use apollo_gateway_server::admin_router;
use apollo_gateway_server::router;
use apollo_gateway_server::AppState;
use clap::Parser;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "apollo_gateway=info,apollo_gateway_server=info";

/// Serves the demo accounts schema over HTTP and WebSocket
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address of the GraphQL listener
    #[arg(long, default_value = "127.0.0.1:4000")]
    listen: SocketAddr,

    /// Address of the persisted query administration listener
    #[arg(long, default_value = "127.0.0.1:4001")]
    admin_listen: SocketAddr,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only run allowed persisted queries, overriding `registry_mode` from the configuration
    #[arg(long)]
    whitelist: bool,

    /// Persisted query manifest whose operations are registered and allowed at startup
    #[arg(long)]
    manifest: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read(path)
                .with_context(|| format!("reading configuration {}", path.display()))?;
            GatewayConfig::from_json(&json)
                .with_context(|| format!("parsing configuration {}", path.display()))?
        }
        None => GatewayConfig::default(),
    };
    if args.whitelist {
        config.registry_mode = RegistryMode::Whitelist;
    }

    let gateway = accounts::gateway(config)?;
    if let Some(path) = &args.manifest {
        let json = std::fs::read(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        gateway
            .load_manifest(&json)
            .with_context(|| format!("loading manifest {}", path.display()))?;
    }
    let state = AppState::new(gateway).with_extractor(accounts::extract_viewer);

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    let admin_listener = TcpListener::bind(args.admin_listen)
        .await
        .with_context(|| format!("binding {}", args.admin_listen))?;
    tracing::info!(
        listen = %args.listen,
        admin_listen = %args.admin_listen,
        registry_mode = ?state.gateway.registry().mode(),
        "serving"
    );

    tokio::try_join!(
        axum::serve(listener, router(state.clone())).into_future(),
        axum::serve(admin_listener, admin_router(state)).into_future(),
    )?;
    Ok(())
}
