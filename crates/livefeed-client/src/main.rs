//! # livefeed
//!
//! Tails the update channel and prints each decoded event as a JSON line.
//!
//! ## Usage
//!
//! ```bash
//! # All categories from the default endpoint
//! livefeed --token "$TOKEN"
//!
//! # Only order updates, custom config
//! livefeed --token "$TOKEN" --config ./livefeed.toml --category order
//!
//! # Endpoint from the environment
//! LIVEFEED_WS_HOST=feed.internal LIVEFEED_WS_PORT=443 LIVEFEED_WS_SECURE=true livefeed
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use livefeed_client::{metrics, ChannelConfig, LifecycleEvent, UpdateChannel};
use livefeed_protocol::{Category, Payload};
use secrecy::SecretString;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tail the Livefeed update channel
#[derive(Parser, Debug)]
#[command(name = "livefeed", version, about, long_about = None)]
struct Args {
    /// Credential attached to the connection
    #[arg(long, env = "LIVEFEED_TOKEN", hide_env_values = true)]
    token: String,

    /// Configuration file (defaults to the standard search paths)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Category to print; repeat for several (default: all)
    #[arg(long = "category", value_name = "NAME")]
    categories: Vec<String>,

    /// Endpoint host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Endpoint port (overrides config)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Events go to stdout, logs to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livefeed=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&args)?;

    if config.metrics.enabled {
        match metrics::start_metrics_server(config.metrics.port) {
            Ok(_) => metrics::init_metrics(),
            Err(e) => error!(error = %e, "Failed to start metrics server"),
        }
    }

    let channel = UpdateChannel::from_config(&config);

    if args.categories.is_empty() {
        for category in Category::ALL {
            channel.subscribe(category, print_payload);
        }
    } else {
        for name in &args.categories {
            channel
                .subscribe_named(name, print_payload)
                .with_context(|| format!("Cannot subscribe to {name:?}"))?;
        }
    }

    let mut events = channel.lifecycle();
    channel.connect(SecretString::new(args.token))?;
    info!(endpoint = %channel.endpoint(), "Tailing update channel");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(LifecycleEvent::GivenUp { attempts }) => {
                    channel.disconnect().await;
                    bail!("Connection failed after {attempts} reconnect attempts");
                }
                Ok(event) => debug!(%event, "Lifecycle"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Lifecycle events lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    channel.disconnect().await;
    Ok(())
}

fn load_config(args: &Args) -> Result<ChannelConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = ChannelConfig::from_file(path)?;
            config.apply_env_overrides()?;
            config
        }
        None => ChannelConfig::load()?,
    };

    if let Some(host) = &args.host {
        config.endpoint.host = host.clone();
    }
    if let Some(port) = args.port {
        config.endpoint.port = port;
    }
    config.validate().context("Invalid endpoint arguments")?;
    Ok(config)
}

fn print_payload(payload: &Payload) {
    let data = match payload.to_value() {
        Ok(data) => data,
        Err(e) => {
            warn!(kind = payload.kind(), error = %e, "Cannot print payload");
            return;
        }
    };

    let line = serde_json::json!({ "type": payload.kind(), "data": data });
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{line}");
}
