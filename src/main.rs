use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use oncoally::server::ChatServer;
use oncoally::{config_agent_factory, init_logging, AppConfig, OncoError};

/// Serve the chat assistant over HTTP.
#[derive(Debug, Parser)]
#[command(name = "oncoally", version, about)]
struct Args {
    /// TOML configuration file; defaults plus environment variables when omitted.
    #[arg(short, long, env = "ONCOALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address.
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_env_or_file(path)?,
        None => AppConfig::from_env()?,
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_logging(&config.logging)?;

    tracing::info!(
        app = %config.branding.app_name,
        provider = ?config.model.provider,
        model = %config.model.model,
        endpoint = config.model.endpoint.as_deref().unwrap_or("<unset>"),
        policy = ?config.assistant.context_policy,
        "configuration loaded"
    );
    if config.model.api_key.is_none() {
        tracing::warn!("no model API key configured; every question will get the error reply");
    }

    let ip: IpAddr = config.server.host.parse().map_err(|err| {
        OncoError::Config(format!("invalid host `{}`: {err}", config.server.host))
    })?;
    let addr = SocketAddr::new(ip, config.server.port);

    let config = Arc::new(config);
    let server = ChatServer::new(Arc::clone(&config), config_agent_factory(config));
    server.serve(addr).await?;
    Ok(())
}
