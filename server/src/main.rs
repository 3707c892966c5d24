//! guardctl
//!
//! Discord bot for operating a CrowdSec / reverse-proxy container stack.

use anyhow::Context as _;
use clap::Parser;
use guardctl_core::{mask_token, DiscordWebhookBackend, NotificationManager};
use serenity::all::{Client, GatewayIntents, Http};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

mod commands;
mod config;
mod confirm;
mod discord;
mod dispatch;
mod routes;
mod state;

use config::Config;
use discord::{ChannelBackend, Handler};
use state::AppState;

/// guardctl Discord bot
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (environment variables when omitted)
    #[arg(short, long, env = "GUARDCTL_CONFIG")]
    config: Option<String>,

    /// Liveness endpoint address, overriding the configuration
    #[arg(long)]
    health_addr: Option<String>,

    /// Do not run the background health monitor
    #[arg(long)]
    no_monitor: bool,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,guardctl=debug".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Alert sinks for the health monitor
fn build_notifier(config: &Config, http: Arc<Http>) -> NotificationManager {
    let mut notifier = NotificationManager::new();

    if let Some(channel_id) = config.alert_channel_id.filter(|id| *id != 0) {
        notifier.add_backend(Arc::new(ChannelBackend::new(http, channel_id)));
    }
    if let Some(url) = config.webhook_url.as_deref().filter(|u| !u.is_empty()) {
        notifier.add_backend(Arc::new(
            DiscordWebhookBackend::new(reqwest::Client::new(), url).with_username("guardctl"),
        ));
    }

    if notifier.backend_names().is_empty() {
        warn!("No alert channel or webhook configured; monitor alerts are only logged");
    } else {
        info!(backends = ?notifier.backend_names(), "Alert sinks configured");
    }
    notifier
}

#[tokio::main]
#[instrument]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    // Parse CLI args
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(addr) = args.health_addr {
        config.health_addr = addr;
    }
    info!(
        containers = ?config.containers,
        guild = config.guild_id,
        token = %mask_token(&config.discord_token),
        "Starting guardctl"
    );

    let interval = Duration::from_secs(config.monitor_interval_secs);
    let state = AppState::new(config).context("Failed to connect to the container engine")?;

    // Liveness endpoint
    let listener = TcpListener::bind(&state.config.health_addr)
        .await
        .with_context(|| format!("Failed to bind {}", state.config.health_addr))?;
    info!(addr = %state.config.health_addr, "Health endpoint listening");
    let app = routes::health_routes().layer(tower_http::trace::TraceLayer::new_for_http());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Health endpoint stopped");
        }
    });

    // Discord client
    let mut client = Client::builder(&state.config.discord_token, GatewayIntents::GUILDS)
        .event_handler(Handler::new(state.clone()))
        .await
        .context("Failed to create Discord client")?;

    // Health monitor
    let monitor = if args.no_monitor {
        info!("Health monitor disabled");
        None
    } else {
        let notifier = build_notifier(&state.config, client.http.clone());
        Some(Arc::new(state.monitor(notifier)).spawn(interval))
    };

    tokio::select! {
        result = client.start() => result.context("Discord client stopped")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    if let Some(handle) = monitor {
        handle.abort();
    }
    Ok(())
}
