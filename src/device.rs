use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, Mutex, RwLock},
    task::JoinHandle,
    time::interval,
};
use tracing::{debug, info};

use crate::{
    error::{RelayError, Result},
    types::{Datapoint, DatapointEvent, DatapointValues},
};

/// Interval between simulated memory updates
pub const SIMULATION_TICK: Duration = Duration::from_millis(500);

/// Capacity of the datapoint broadcast channel
pub const DATAPOINT_CHANNEL_CAPACITY: usize = 256;

/// Slowest simulated pace in cm/s
const SIMULATED_SPEED_MIN: f64 = 380.0;
/// Fastest simulated pace in cm/s
const SIMULATED_SPEED_MAX: f64 = 460.0;
/// Energy units spent per centimeter rowed
const ENERGY_UNITS_PER_CENTIMETER: f64 = 0.6;

/// Capabilities the relay needs from a rowing machine
///
/// Implementations are expected to publish a [`DatapointEvent`] whenever a
/// tracked value changes, and to keep the latest values readable through
/// [`RowerDevice::read_datapoints`].
#[async_trait]
pub trait RowerDevice: Send + Sync {
    /// Clear the rower's memory and stop any running workout
    async fn reset(&self) -> Result<()>;

    /// Program a workout that ends after `meters`
    async fn define_distance_workout(&self, meters: u32) -> Result<()>;

    /// Start generating synthetic strokes
    async fn start_simulation(&self) -> Result<()>;

    /// Latest values of the requested datapoints
    ///
    /// Datapoints the device does not track are left out of the snapshot.
    async fn read_datapoints(&self, names: &[Datapoint]) -> Result<DatapointValues>;

    /// Subscribe to live datapoint updates
    fn subscribe(&self) -> broadcast::Receiver<DatapointEvent>;
}

#[derive(Debug, Default)]
struct RowerMemory {
    distance_m: f64,
    speed_cm_s: f64,
    average_cm_s: f64,
    energy: f64,
    elapsed: Duration,
    target_distance: Option<u32>,
}

impl RowerMemory {
    fn value(&self, datapoint: Datapoint) -> f64 {
        match datapoint {
            Datapoint::MsDistance => self.distance_m,
            Datapoint::MsTotal => self.speed_cm_s,
            Datapoint::MsAverage => self.average_cm_s,
            Datapoint::TotalKcal => self.energy,
        }
    }

    /// Advance by one tick at `speed_cm_s`; returns true once the target is reached
    fn advance(&mut self, speed_cm_s: f64, dt: Duration) -> bool {
        let centimeters = speed_cm_s * dt.as_secs_f64();
        self.elapsed += dt;
        self.speed_cm_s = speed_cm_s;
        self.distance_m += centimeters / 100.0;
        self.energy += centimeters * ENERGY_UNITS_PER_CENTIMETER;

        let finished = self
            .target_distance
            .is_some_and(|target| self.distance_m >= f64::from(target));
        if let Some(target) = self.target_distance.filter(|_| finished) {
            self.distance_m = f64::from(target);
        }
        self.average_cm_s = self.distance_m * 100.0 / self.elapsed.as_secs_f64();
        finished
    }
}

/// A rower that produces synthetic strokes instead of reading hardware
///
/// Memory stays at zero until [`RowerDevice::start_simulation`] is called,
/// after which a background task rows at a steady, slightly jittered pace
/// until the defined workout distance is reached.
pub struct SimulatedRower {
    tracked: Vec<Datapoint>,
    memory: Arc<RwLock<RowerMemory>>,
    events: broadcast::Sender<DatapointEvent>,
    simulation: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedRower {
    /// Create a simulated rower exposing the given datapoints
    #[must_use]
    pub fn new(tracked: &[Datapoint]) -> Self {
        let (events, _) = broadcast::channel(DATAPOINT_CHANNEL_CAPACITY);
        Self {
            tracked: tracked.to_vec(),
            memory: Arc::new(RwLock::new(RowerMemory::default())),
            events,
            simulation: Mutex::new(None),
        }
    }

    /// Whether the simulation task is still rowing
    pub async fn is_simulating(&self) -> bool {
        self.simulation
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    async fn stop_simulation(&self) {
        if let Some(task) = self.simulation.lock().await.take() {
            task.abort();
            debug!("Simulation stopped");
        }
    }
}

#[async_trait]
impl RowerDevice for SimulatedRower {
    async fn reset(&self) -> Result<()> {
        self.stop_simulation().await;
        *self.memory.write().await = RowerMemory::default();
        info!("Rower reset");
        Ok(())
    }

    async fn define_distance_workout(&self, meters: u32) -> Result<()> {
        if meters == 0 {
            return Err(RelayError::Device(
                "workout distance must be greater than zero".to_string(),
            ));
        }
        self.memory.write().await.target_distance = Some(meters);
        info!("Distance workout defined: {meters} m");
        Ok(())
    }

    async fn start_simulation(&self) -> Result<()> {
        self.stop_simulation().await;

        let memory = Arc::clone(&self.memory);
        let events = self.events.clone();
        let mut rng = StdRng::from_rng(&mut rand::rng());

        let task = tokio::spawn(async move {
            let mut ticker = interval(SIMULATION_TICK);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let speed = rng.random_range(SIMULATED_SPEED_MIN..=SIMULATED_SPEED_MAX);
                let (finished, distance) = {
                    let mut memory = memory.write().await;
                    let finished = memory.advance(speed, SIMULATION_TICK);
                    (finished, memory.distance_m)
                };

                // No subscribers is fine; values stay readable.
                let _ = events.send(DatapointEvent::now(Datapoint::MsDistance, distance));

                if finished {
                    info!("Simulated workout complete at {distance:.0} m");
                    break;
                }
            }
        });

        *self.simulation.lock().await = Some(task);
        info!("Simulation started");
        Ok(())
    }

    async fn read_datapoints(&self, names: &[Datapoint]) -> Result<DatapointValues> {
        let memory = self.memory.read().await;
        Ok(names
            .iter()
            .filter(|name| self.tracked.contains(name))
            .map(|&name| (name, memory.value(name)))
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<DatapointEvent> {
        self.events.subscribe()
    }
}

impl Drop for SimulatedRower {
    fn drop(&mut self) {
        if let Some(task) = self.simulation.get_mut().take() {
            task.abort();
        }
    }
}
