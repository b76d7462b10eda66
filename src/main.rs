use claude_gateway::config::config_search_paths;
use claude_gateway::{build_router, AppState, ProxyConfig, Route};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "claude-gateway",
    about = "Messages API gateway: serve Claude-style clients from OpenAI-compatible providers",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Provider preset name (overrides config)
    #[arg(long)]
    provider: Option<String>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claude_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ref provider) = cli.provider {
        config.apply_provider_override(provider);
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let state = AppState::new(config.clone(), client)?;

    let mode = match config.resolve_route("")? {
        Route::Passthrough => "passthrough".to_string(),
        Route::Transcode { transcoder, .. } => transcoder,
    };

    info!("claude-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("  Provider:  {}", config.provider.name);
    info!("  Base URL:  {}", state.base_url);
    info!("  Mode:      {}", mode);
    info!("  API keys:  {}", state.keys.len());
    info!("  Models:    {} mapped", config.models.len());

    let app = build_router(Arc::new(state));
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  ANTHROPIC_BASE_URL=http://localhost:{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
