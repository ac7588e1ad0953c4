//! Pyramid store HTTP server binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use pyramid_server::{build_router, CorsPolicy, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "pyramid-server")]
#[command(about = "HTTP server for pyramid Zarr stores")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8000")]
    listen: String,

    /// Directory containing the pyramid store(s)
    #[arg(short, long, default_value = "public/data")]
    data_dir: PathBuf,

    /// URL path prefix the store is mounted under
    #[arg(long, default_value = "/data")]
    route_prefix: String,

    /// Comma-separated allowed origins; empty allows any origin
    #[arg(long, default_value = "", env = "PYRAMID_ALLOWED_ORIGINS")]
    allowed_origins: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting pyramid server");

    let config = ServerConfig {
        listen: args.listen,
        route_prefix: args.route_prefix,
        data_dir: args.data_dir,
        cors: CorsPolicy::from_origin_list(&args.allowed_origins),
    };

    // Startup-time misconfiguration (missing directory) is fatal;
    // per-request errors never are.
    let app = build_router(&config)?;

    let addr: SocketAddr = config.listen.parse()?;
    info!(
        address = %addr,
        data_dir = %config.data_dir.display(),
        prefix = %config.route_prefix,
        "Listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
