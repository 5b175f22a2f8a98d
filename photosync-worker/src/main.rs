mod http;
mod orchestrator;

use photosync_core::Config;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("photosync={}", level_filter(&config.log_level)).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        root = %config.photos_base_path.display(),
        health_check_port = config.health_check_port,
        "photosync worker starting"
    );

    if let Err(err) = orchestrator::run(config).await {
        error!(error = %err, "worker exited with a fatal error");
        std::process::exit(1);
    }

    Ok(())
}

/// Maps `SYNC_LOG_LEVEL` to the `tracing`/`RUST_LOG` verbosity syntax; any
/// value `tracing`'s own filter doesn't recognize falls back to `info`.
fn level_filter(log_level: &str) -> &'static str {
    match log_level.to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" => "error",
        _ => "info",
    }
}
