use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::Duration;
use tokio::{
    sync::{broadcast, mpsc},
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use crate::{
    device::RowerDevice,
    error::{RelayError, Result},
    protocol::{InboundMessage, OutboundMessage, StrokeMessage, TRACKED_DATAPOINTS},
    settings::Settings,
    transport::{Transport, TransportEvent},
    types::DatapointEvent,
};

/// How often the boost factor gets a chance to grow
pub const BOOST_INTERVAL: Duration = Duration::from_secs(1);

/// A boost happens when a uniform draw exceeds this value
pub const BOOST_THRESHOLD: f64 = 0.97;

/// Growth of the boost factor per boost
pub const BOOST_MULTIPLIER: f64 = 1.4;

/// Upper bound (exclusive) of the initial boost factor
pub const BOOST_INITIAL_MAX: f64 = 2.0;

/// Random multiplier applied to the reported distance in boost mode
#[derive(Debug, Clone)]
pub struct BoostFactor {
    k: f64,
    rng: StdRng,
}

impl BoostFactor {
    /// Draw an initial factor in `[0, 2)` from `rng`
    pub fn new(mut rng: StdRng) -> Self {
        let k = rng.random_range(0.0..BOOST_INITIAL_MAX);
        Self { k, rng }
    }

    /// Current factor
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.k
    }

    /// Give the factor its once-per-interval chance to grow
    ///
    /// Returns true if it grew.
    pub fn tick(&mut self) -> bool {
        if self.rng.random::<f64>() > BOOST_THRESHOLD {
            self.k *= BOOST_MULTIPLIER;
            true
        } else {
            false
        }
    }
}

/// Bridges a rower device and a race server
///
/// The relay checks in whenever the transport connects, starts a workout
/// when the server asks for one, and forwards every datapoint update as a
/// stroke message. All handlers run on the caller's task, one event at a time.
pub struct Relay<D, T> {
    settings: Settings,
    device: D,
    transport: T,
    datapoints: broadcast::Receiver<DatapointEvent>,
    boost: Option<BoostFactor>,
    started: bool,
}

impl<D: RowerDevice, T: Transport> Relay<D, T> {
    /// Create a relay and subscribe to the device's datapoints
    ///
    /// Boost is seeded from the thread RNG when enabled in `settings`.
    pub fn new(settings: Settings, device: D, transport: T) -> Self {
        let boost = settings
            .boost
            .then(|| BoostFactor::new(StdRng::from_rng(&mut rand::rng())));
        Self::with_boost(settings, device, transport, boost)
    }

    /// Create a relay with an explicit boost factor, ignoring `settings.boost`
    pub fn with_boost(
        settings: Settings,
        device: D,
        transport: T,
        boost: Option<BoostFactor>,
    ) -> Self {
        let datapoints = device.subscribe();
        Self {
            settings,
            device,
            transport,
            datapoints,
            boost,
            started: false,
        }
    }

    /// The rower device
    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Whether a workout has been started
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Factor currently applied to the reported distance
    #[must_use]
    pub fn distance_factor(&self) -> f64 {
        self.boost.as_ref().map_or(1.0, BoostFactor::value)
    }

    /// Announce this rower to the server
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::TransportClosed`] if the transport is gone.
    pub async fn on_connect(&self) -> Result<()> {
        info!("sending rower-checkin message");
        self.transport
            .send(&OutboundMessage::checkin(self.settings.name.as_str()))
            .await
    }

    /// React to a server message; only `session-start` is acted upon
    ///
    /// # Errors
    ///
    /// Propagates device errors from [`Relay::start`].
    pub async fn on_message(&mut self, message: InboundMessage) -> Result<()> {
        match message {
            InboundMessage::SessionStart { distance } => self.start(distance).await,
            InboundMessage::Other => Ok(()),
        }
    }

    /// Reset the rower and start a distance workout
    ///
    /// The datapoint subscription is replaced so updates queued before the
    /// reset are not relayed. The simulation only starts in simulation mode.
    ///
    /// # Errors
    ///
    /// Propagates any device error.
    pub async fn start(&mut self, distance: u32) -> Result<()> {
        info!("Starting {distance} m workout");
        self.device.reset().await?;
        self.device.define_distance_workout(distance).await?;
        self.datapoints = self.device.subscribe();
        if self.settings.simulation_mode {
            self.device.start_simulation().await?;
        }
        self.started = true;
        Ok(())
    }

    /// Forward the device's current values as a stroke message
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MissingDatapoint`] if the device lacks a tracked
    /// value, or a transport error if sending fails.
    pub async fn on_datapoint(&self, event: &DatapointEvent) -> Result<StrokeMessage> {
        let values = self.device.read_datapoints(&TRACKED_DATAPOINTS).await?;
        let stroke =
            StrokeMessage::from_values(self.settings.name.as_str(), &values, self.distance_factor())?;
        let message = OutboundMessage::StrokeData(stroke.clone());

        self.transport.send(&message).await?;
        trace!("{} changed to {}", event.name, event.value);
        debug!("Sent {}", message.to_json()?);
        Ok(stroke)
    }

    /// Give the boost factor its chance to grow
    pub fn on_boost_tick(&mut self) {
        if let Some(boost) = self.boost.as_mut() {
            if boost.tick() {
                info!("BOOST! (k={})", boost.value());
            }
        }
    }

    /// Process transport and device events until the transport goes away
    ///
    /// Auto-start runs first when enabled.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a handler, or
    /// [`RelayError::DatapointStreamClosed`] if the device stops publishing.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<TransportEvent>) -> Result<()> {
        if self.settings.auto_start {
            self.start(self.settings.auto_start_distance).await?;
        }

        let mut boost_ticker = interval(BOOST_INTERVAL);
        boost_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(TransportEvent::Connected) => self.on_connect().await?,
                    Some(TransportEvent::Message(message)) => self.on_message(message).await?,
                    Some(TransportEvent::Disconnected) => info!("Disconnected from server"),
                    None => {
                        info!("Transport closed, stopping relay");
                        return Ok(());
                    }
                },
                datapoint = self.datapoints.recv() => match datapoint {
                    Ok(event) => {
                        self.on_datapoint(&event).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Relay fell behind, skipped {skipped} datapoint update(s)");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(RelayError::DatapointStreamClosed);
                    }
                },
                _ = boost_ticker.tick(), if self.boost.is_some() => self.on_boost_tick(),
            }
        }
    }
}
