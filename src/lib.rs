#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Rowrelay 🚣
//!
//! Relays live stroke telemetry from a rowing machine to a race server.
//!
//! The relay checks in with the server under a display name, waits for a
//! `session-start` message (or starts on its own with `--auto-start`), then
//! forwards every datapoint update from the rower as a `strokedata` message.
//!
//! ## Architecture
//!
//! - **[`device`]**: the [`RowerDevice`] capability and a [`SimulatedRower`]
//!   that generates synthetic strokes
//! - **[`transport`]**: the [`Transport`] capability and a
//!   [`WebSocketTransport`] that reconnects on its own
//! - **[`relay`]**: the [`Relay`] event loop tying the two together
//! - **[`settings`]**: command line and config file resolution
//!
//! ## Wire Format
//!
//! Messages are JSON objects tagged by a `message` field:
//!
//! | Direction | `message` | Fields |
//! |---|---|---|
//! | out | `rower-checkin` | `name` |
//! | out | `strokedata` | `name`, `ms_distance`, `m_s_total`, `m_s_average`, `total_kcal` |
//! | in | `session-start` | `distance` |
//!
//! Speeds are reported in m/s (the rower counts cm/s) and energy in calories
//! (the rower counts thousandths).
//!
//! ## Quick Start
//!
//! ```no_run
//! use rowrelay::{Relay, Settings, SimulatedRower, WebSocketTransport, TRACKED_DATAPOINTS};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings {
//!         simulation_mode: true,
//!         auto_start: true,
//!         ..Settings::default()
//!     };
//!
//!     let (transport, events) = WebSocketTransport::connect(&settings.socket_server_url)?;
//!     let rower = SimulatedRower::new(&TRACKED_DATAPOINTS);
//!
//!     Relay::new(settings, rower, transport).run(events).await?;
//!     Ok(())
//! }
//! ```

/// Rowing machine capability and simulator
pub mod device;
/// Error types and handling
pub mod error;
/// Console logging setup
pub mod logging;
/// Wire message structures and unit conversion
pub mod protocol;
/// Relay orchestration loop
pub mod relay;
/// Command line and config file settings
pub mod settings;
/// Server connection capability and WebSocket client
pub mod transport;
/// Type definitions and data structures
pub mod types;

pub use device::{RowerDevice, SimulatedRower};
pub use error::{RelayError, Result};
pub use protocol::{InboundMessage, OutboundMessage, StrokeMessage, TRACKED_DATAPOINTS};
pub use relay::{BoostFactor, Relay};
pub use settings::{Cli, FileSettings, Settings};
pub use transport::{Transport, TransportEvent, WebSocketTransport};
pub use types::{Datapoint, DatapointEvent, DatapointValues, LogLevel};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
