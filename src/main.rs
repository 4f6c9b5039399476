//! CLA ledger service
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (secrets from the environment or .env)
//! CLA_TOKEN=... CLA_HOOK_SECRET=... cla-ledger
//!
//! # Start with a config file
//! cla-ledger --config /etc/cla-ledger/config.toml
//!
//! # Override listen address and database
//! cla-ledger --listen 0.0.0.0:8080 --database-path /var/lib/cla/cla.sled
//! ```

use anyhow::Context as _;
use clap::Parser;
use cla_ledger::{AppContext, Config, GitHubStatusClient, HttpServer, Store};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cla-ledger")]
#[command(about = "Contributor License Agreement tracking service")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "CLA_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long, env = "CLA_LISTEN")]
    listen: Option<String>,

    /// Agreement database path
    #[arg(long, env = "CLA_DATABASE_PATH")]
    database_path: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Status API token
    #[arg(long, env = "CLA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Webhook shared secret
    #[arg(long, env = "CLA_HOOK_SECRET", hide_env_values = true)]
    hook_secret: Option<String>,

    /// OAuth client id
    #[arg(long, env = "CLA_CLIENT_ID")]
    client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "CLA_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Slack API token for the team roster
    #[arg(long, env = "SLACK_TOKEN", hide_env_values = true)]
    slack_token: Option<String>,
}

impl Args {
    /// Apply command line and environment overrides on top of the file config
    fn apply(self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if let Some(path) = self.database_path {
            config.cla.database_path = path;
        }
        if self.token.is_some() {
            config.cla.token = self.token;
        }
        if self.hook_secret.is_some() {
            config.cla.hook_secret = self.hook_secret;
        }
        if self.client_id.is_some() {
            config.cla.client_id = self.client_id;
        }
        if self.client_secret.is_some() {
            config.cla.client_secret = self.client_secret;
        }
        if self.slack_token.is_some() {
            config.slack.token = self.slack_token;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("cla_ledger={},info", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    info!("Starting cla-ledger v{}", env!("CARGO_PKG_VERSION"));
    info!(config = %config.summary(), "Configuration loaded");

    let bind_addr: SocketAddr = config
        .server
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.server.listen))?;

    let store = Arc::new(Store::open(&config.cla.database_path)?);
    let config = Arc::new(config);

    let ctx = AppContext::new(config.clone(), store.clone(), status_client(&config)?)?;
    let extra = ctx.registry.seed(&config.cla.agreements)?;
    info!(
        agreements = ctx.registry.list_agreements()?.len(),
        configured = extra,
        "Agreement registry ready"
    );

    let server = Arc::new(HttpServer::new(Arc::new(ctx), bind_addr));

    tokio::select! {
        result = server.clone().run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    // In-flight connections may still hold the context
    drop(server);
    match Arc::try_unwrap(store) {
        Ok(store) => store.close()?,
        Err(store) => store.flush()?,
    }
    Ok(())
}

fn status_client(config: &Config) -> anyhow::Result<Arc<dyn cla_ledger::StatusApi>> {
    let token = config.cla.token.as_deref().unwrap_or_default();
    let client = GitHubStatusClient::new(&config.cla.api_url, token, config.request_timeout())?;
    Ok(Arc::new(client))
}
