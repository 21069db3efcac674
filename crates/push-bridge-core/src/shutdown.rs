//! Shutdown coordination.
//!
//! One [`CancellationToken`] is shared between the coordinator and the
//! consumption loop. The coordinator cancels it when SIGINT (or SIGTERM on
//! Unix) arrives; the loop observes it and winds down. The coordinator never
//! waits for the loop.

use std::io;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[cfg(test)]
#[path = "shutdown_tests.rs"]
mod tests;

/// Signal that triggered shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Installed SIGINT and SIGTERM handlers
///
/// Handlers are registered when the listener is created, so signals that
/// arrive before anyone awaits [`recv`](Self::recv) are not lost.
#[derive(Debug)]
pub struct SignalListener {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl SignalListener {
    /// Register the handlers; must be called within a Tokio runtime
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next shutdown signal
    pub async fn recv(&mut self) -> io::Result<ShutdownSignal> {
        #[cfg(unix)]
        {
            let received = tokio::select! {
                received = self.interrupt.recv() => received.map(|()| ShutdownSignal::Interrupt),
                received = self.terminate.recv() => received.map(|()| ShutdownSignal::Terminate),
            };
            received.ok_or_else(|| io::Error::new(io::ErrorKind::Other, "signal stream closed"))
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            Ok(ShutdownSignal::Interrupt)
        }
    }
}

/// Owns the cancellation token shared with the consumption loop
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to hand to the consumption loop
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the shared token; calling this more than once has no further effect
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Install signal handlers now and cancel the token from a background task
    ///
    /// The task ends after the first signal or once the token is cancelled
    /// elsewhere.
    pub fn listen(&self) -> io::Result<JoinHandle<()>> {
        let signals = SignalListener::install()?;
        let coordinator = self.clone();
        Ok(tokio::spawn(async move {
            coordinator.wait_for_signal(signals).await
        }))
    }

    /// Wait for SIGINT or SIGTERM on `signals`, then cancel the token
    ///
    /// A failing signal stream is logged and leaves the token alone.
    pub async fn wait_for_signal(&self, mut signals: SignalListener) {
        let result = tokio::select! {
            result = signals.recv() => result,
            _ = self.token.cancelled() => return,
        };

        match result {
            Ok(signal) => {
                info!(signal = %signal, "Shutdown signal received");
                self.trigger();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for shutdown signals");
            }
        }
    }
}
