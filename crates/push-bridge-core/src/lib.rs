//! # Push Bridge Core
//!
//! Delivery loop that turns a pull subscription into HTTP push requests.
//!
//! Each received message is transformed into the push envelope JSON, POSTed to
//! the configured endpoint, and then acknowledged on a 2xx response or
//! negatively acknowledged otherwise, so the subscription redelivers it.
//!
//! ## Components
//!
//! - [`envelope`] - Message transformer producing the push envelope
//! - [`delivery`] - HTTP push client with a fixed timeout
//! - [`consumer`] - Consumption loop resolving every message exactly once
//! - [`shutdown`] - Signal handling and cancellation
//! - [`bridge`] - Setup, run and client cleanup
//!
//! ## Usage
//!
//! ```no_run
//! use push_bridge_core::{Bridge, BridgeConfig, PushClientConfig, ShutdownCoordinator};
//! use pubsub_runtime::{ProviderConfig, PubSubConfig, ReceiveSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let shutdown = ShutdownCoordinator::new();
//! let signals = shutdown.listen()?;
//!
//! let config = BridgeConfig::new("my-project", "my-sub", None)?;
//! let bridge = Bridge::connect(
//!     config,
//!     ProviderConfig::PubSub(PubSubConfig::default()),
//!     ReceiveSettings::default(),
//!     PushClientConfig::default(),
//! )?;
//!
//! bridge.run(shutdown.token()).await?;
//! signals.abort();
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod consumer;
pub mod delivery;
pub mod envelope;
pub mod error;
pub mod shutdown;

pub use bridge::Bridge;
pub use config::{BridgeConfig, DEFAULT_PUSH_URL};
pub use consumer::{ConsumerState, ConsumerStats, MessageConsumer, StatsSnapshot};
pub use delivery::{PushClient, PushClientConfig, PushDelivery, DEFAULT_PUSH_TIMEOUT};
pub use envelope::{PushEnvelope, PushMessage};
pub use error::{BridgeError, ConfigError, ConsumerError, DeliveryError, SetupError};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal, SignalListener};
