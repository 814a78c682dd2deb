use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

mod app;
mod http;
mod proxy;

/// A multi-stage, zero-trust chat pipeline serving Kellogg's personal site.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to a TOML config file. Falls back to `CHAT_CONFIG`, then
    /// `~/.chat-pipeline/config.toml`, then built-in defaults.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_gateway=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = chat_core::config::AppConfig::load(cli.config.as_deref())
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "config load failed, using defaults");
            chat_core::config::AppConfig::default()
        });

    let metrics_handle = app::install_metrics_recorder();

    let host = config.server.host.clone();
    let port = config.server.port;
    let state = Arc::new(app::AppState::new(config, metrics_handle)?);
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!(%addr, "chat gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
