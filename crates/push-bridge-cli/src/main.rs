use push_bridge_cli::{run_cli, CliError};
use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        match &e {
            // No subscriber is installed when logging itself failed
            CliError::Logging { .. } => eprintln!("Error: {}", e),
            _ => error!(error = %e, "Bridge exited with an error"),
        }

        std::process::exit(e.exit_code());
    }
}
