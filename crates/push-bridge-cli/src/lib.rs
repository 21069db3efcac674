//! # Pub/Sub Push Bridge CLI
//!
//! Command-line entry point: parses flags, initializes logging, loads
//! settings, and runs the bridge until SIGINT or SIGTERM.
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |---|---|
//! | 0 | Clean shutdown after a signal |
//! | 2 | Invalid command line (reported by clap) |
//! | 3 | Configuration error |
//! | 4 | Setup error (client creation, missing subscription) |
//! | 5 | Consumption loop failed |
//! | 6 | Logging could not be initialized |

pub mod settings;

use clap::Parser;
use push_bridge_core::{
    Bridge, BridgeError, ConfigError, ConsumerError, PushClientConfig, SetupError,
    ShutdownCoordinator,
};
use settings::{BridgeSettings, Overrides};
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// Deliver Pub/Sub subscription messages to an HTTP endpoint as push requests
#[derive(Debug, Parser)]
#[command(name = "pubsub-push-bridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Emulates a Pub/Sub push subscription for local development")]
pub struct Cli {
    /// Project that owns the subscription
    #[arg(long)]
    pub project: Option<String>,

    /// Subscription to pull messages from
    #[arg(long)]
    pub subscription: Option<String>,

    /// Endpoint that receives the push requests [default: http://localhost:8080]
    #[arg(long)]
    pub url: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "PUSH_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level, used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,
}

impl Cli {
    /// Values that override file and environment settings
    pub fn overrides(&self) -> Overrides {
        Overrides {
            project: self.project.clone(),
            subscription: self.subscription.clone(),
            url: self.url.clone(),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI operation errors
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to load settings: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("Message consumption failed: {0}")]
    Consumer(#[from] ConsumerError),

    #[error("Failed to initialize logging: {message}")]
    Logging { message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Settings(_) | Self::Configuration(_) => 3,
            Self::Setup(_) => 4,
            Self::Consumer(_) => 5,
            Self::Logging { .. } => 6,
        }
    }
}

impl From<BridgeError> for CliError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Config(e) => Self::Configuration(e),
            BridgeError::Setup(e) => Self::Setup(e),
            BridgeError::Consumer(e) => Self::Consumer(e),
        }
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Parse arguments, initialize logging, and run the bridge
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    run(&cli).await
}

/// Run the bridge for already parsed arguments
///
/// Signal handlers are installed before any setup, so an interrupt during
/// startup still ends in a clean shutdown. Returns once the bridge has shut
/// down after a signal, or with the first fatal error.
pub async fn run(cli: &Cli) -> Result<(), CliError> {
    let shutdown = ShutdownCoordinator::new();
    let signals = match shutdown.listen() {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!(error = %e, "Failed to install shutdown signal handlers");
            None
        }
    };

    let result = run_bridge(cli, shutdown.token()).await;

    if let Some(signals) = signals {
        signals.abort();
    }
    result
}

async fn run_bridge(cli: &Cli, token: CancellationToken) -> Result<(), CliError> {
    let mut settings = BridgeSettings::load(cli.config.as_deref())?;
    settings.apply_overrides(cli.overrides());
    let resolved = settings.resolve()?;

    info!(
        project = %resolved.bridge.project(),
        subscription = %resolved.bridge.subscription(),
        url = %resolved.bridge.url(),
        "Starting Pub/Sub push bridge"
    );

    let bridge = Bridge::connect(
        resolved.bridge,
        resolved.provider,
        resolved.receive,
        PushClientConfig::default(),
    )?;

    bridge.run(token).await.map_err(CliError::from)
}

/// Default filter directives for the given level
pub fn default_directives(level: LevelFilter) -> String {
    [
        "pubsub_push_bridge",
        "push_bridge_cli",
        "push_bridge_core",
        "pubsub_runtime",
    ]
    .iter()
    .map(|target| format!("{}={}", target, level))
    .collect::<Vec<_>>()
    .join(",")
}

/// Build the log filter: `RUST_LOG` if set, otherwise `--log-level`
pub fn build_filter(log_level: &str) -> Result<EnvFilter, CliError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let level: LevelFilter = log_level.parse().map_err(|_| CliError::Logging {
        message: format!("invalid log level '{}'", log_level),
    })?;

    EnvFilter::try_new(default_directives(level)).map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}

/// Initialize logging to stderr based on CLI arguments
pub fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = build_filter(&cli.log_level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if cli.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}
