use crate::core::{calculate, Calibration, CalculatedMeasurement, InvalidAddress, SensorAddress};
use crate::relay::{actuate, needs_irrigation, RelayOutput};
use crate::session::{SensorSession, TransactionError};
use crate::{CancelToken, Transport, VolumetricWaterContent};

use std::{
    collections::BTreeMap,
    convert::TryFrom,
    io, thread,
    time::{Duration, Instant},
};

use chrono::{Local, Utc};
use thiserror::Error;

/// Configuration consumed by the measurement/irrigation loop.
///
/// Supplied by the setup layer once at startup; read-only during the run.
#[derive(Clone, Debug)]
pub struct CycleConfig {
    /// Number of data points to acquire before the run ends.
    pub total_data_points: u32,
    /// Interval between cycle starts; also the settling delay after a
    /// failed read.
    pub delay_between_points: Duration,
    /// Irrigation triggers strictly below this water content.
    pub vwc_threshold: VolumetricWaterContent,
    /// How long a triggered relay stays energized.
    pub irrigation_hold: Duration,
    /// Raw-to-VWC transform for all sensors of the run.
    pub calibration: Calibration,
    /// Stamp data points with UTC instead of local time.
    pub utc_timestamps: bool,
}

impl CycleConfig {
    pub const DEFAULT_IRRIGATION_HOLD: Duration = Duration::from_secs(10);
}

/// One relay per configured sensor address, iterated in ascending address
/// order regardless of binding order.
#[derive(Debug, Default)]
pub struct RelayBindings<R: RelayOutput> {
    bindings: BTreeMap<SensorAddress, R>,
}

impl<R: RelayOutput> RelayBindings<R> {
    pub fn new() -> Self {
        Self {
            bindings: BTreeMap::new(),
        }
    }

    /// Bind `address` to `relay`, driving the relay LOW.
    ///
    /// Rebinding an address replaces its relay, keeping exactly one binding
    /// per address.
    pub fn bind(&mut self, address: char, mut relay: R) -> Result<SensorAddress, InvalidAddress> {
        let address = SensorAddress::try_from(address)?;
        if let Err(err) = relay.set_low() {
            log::warn!("Failed to preset relay for sensor {}: {}", address, err);
        }
        self.bindings.insert(address, relay);
        Ok(address)
    }

    /// Bind a batch of `(address, relay)` pairs. Invalid addresses are
    /// reported and excluded from the run, never retried.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (char, R)>,
    {
        let mut bindings = Self::new();
        for (address, relay) in pairs {
            if let Err(err) = bindings.bind(address, relay) {
                log::warn!("{}; excluded from the run", err);
            }
        }
        bindings
    }

    pub fn addresses(&self) -> impl Iterator<Item = SensorAddress> + '_ {
        self.bindings.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn relay(&self, address: SensorAddress) -> Option<&R> {
        self.bindings.get(&address)
    }

    pub fn relay_mut(&mut self, address: SensorAddress) -> Option<&mut R> {
        self.bindings.get_mut(&address)
    }

    /// Force every relay LOW, best effort. Failures are logged and must not
    /// prevent shutdown.
    pub fn release_all(&mut self) {
        for (address, relay) in &mut self.bindings {
            if let Err(err) = relay.set_low() {
                log::error!("Failed to release relay for sensor {}: {}", address, err);
            }
        }
    }
}

/// One completed cycle's readings, handed to the caller's sink and not
/// retained by the core.
#[derive(Clone, Debug, PartialEq)]
pub struct DataPoint {
    /// Integer epoch seconds.
    pub timestamp: i64,
    /// Whether `timestamp` was taken against UTC or local time.
    pub utc: bool,
    /// Per-address readings in ascending address order.
    pub readings: Vec<(SensorAddress, CalculatedMeasurement)>,
}

/// Result of one cycle iteration.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Every address delivered a full reading.
    Complete(DataPoint),
    /// A transaction aborted; the whole cycle's data point was discarded.
    Skipped { address: SensorAddress },
    /// Shutdown was requested mid-cycle.
    Cancelled,
}

/// Failure that ends the run, as opposed to per-address transaction errors
/// which only skip a cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("relay actuation failed for sensor {address}")]
    Relay {
        address: SensorAddress,
        #[source]
        source: io::Error,
    },
}

const SLEEP_SLICE: Duration = Duration::from_millis(100);

fn sleep_with_cancel(duration: Duration, cancel: &CancelToken) {
    let started = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let elapsed = started.elapsed();
        if elapsed >= duration {
            return;
        }
        thread::sleep((duration - elapsed).min(SLEEP_SLICE));
    }
}

/// The outer measurement/irrigation loop.
///
/// Owns the transport and the relay table for the duration of the run; both
/// are handed back (and the relays released) when it returns.
pub struct Runner<'a, T, R>
where
    T: Transport + ?Sized,
    R: RelayOutput,
{
    transport: &'a mut T,
    relays: &'a mut RelayBindings<R>,
    config: CycleConfig,
    cancel: CancelToken,
}

impl<'a, T, R> Runner<'a, T, R>
where
    T: Transport + ?Sized,
    R: RelayOutput,
{
    pub fn new(
        transport: &'a mut T,
        relays: &'a mut RelayBindings<R>,
        config: CycleConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            transport,
            relays,
            config,
            cancel,
        }
    }

    /// Identify every bound sensor before the first cycle.
    ///
    /// Any failure here is a setup failure and ends the run before it
    /// starts, per the setup-time error policy.
    pub fn identify_all(&mut self) -> Result<Vec<(SensorAddress, String)>, TransactionError> {
        let addresses: Vec<_> = self.relays.addresses().collect();
        let mut identifications = Vec::with_capacity(addresses.len());
        for address in addresses {
            let info = SensorSession::new(&mut *self.transport, address).identify()?;
            log::info!("Sensor address: {} Sensor info: {}", address, info);
            identifications.push((address, info));
        }
        Ok(identifications)
    }

    /// Run one cycle over all addresses in ascending order.
    ///
    /// Any aborted transaction discards the whole cycle's data point; the
    /// readings of addresses that already succeeded are not logged
    /// partially.
    pub fn run_once(&mut self) -> Result<CycleOutcome, CycleError> {
        let timestamp = if self.config.utc_timestamps {
            Utc::now().timestamp()
        } else {
            Local::now().timestamp()
        };
        let addresses: Vec<_> = self.relays.addresses().collect();
        let mut readings = Vec::with_capacity(addresses.len());
        for address in addresses {
            if self.cancel.is_cancelled() {
                return Ok(CycleOutcome::Cancelled);
            }
            let raw = match SensorSession::new(&mut *self.transport, address).measure() {
                Ok(raw) => raw,
                Err(err) => {
                    log::warn!("Discarding this cycle: {}", err);
                    if err.wants_settling() {
                        self.settle();
                    }
                    return Ok(CycleOutcome::Skipped { address });
                }
            };
            let measurement = match calculate(raw.values(), self.config.calibration) {
                Some(measurement) => measurement,
                None => {
                    log::warn!(
                        "Sensor {} returned too few values for conversion; discarding this cycle",
                        address
                    );
                    self.settle();
                    return Ok(CycleOutcome::Skipped { address });
                }
            };
            // Irrigation is interleaved per sensor, before the next address
            // is polled.
            self.irrigate(address, measurement.water_content)?;
            readings.push((address, measurement));
        }
        Ok(CycleOutcome::Complete(DataPoint {
            timestamp,
            utc: self.config.utc_timestamps,
            readings,
        }))
    }

    fn irrigate(
        &mut self,
        address: SensorAddress,
        vwc: VolumetricWaterContent,
    ) -> Result<(), CycleError> {
        let relay = match self.relays.relay_mut(address) {
            Some(relay) => relay,
            None => return Ok(()),
        };
        let result = if needs_irrigation(vwc, self.config.vwc_threshold) {
            log::info!(
                "Too dry, irrigation started for sensor {} (VWC {:.1}%)",
                address,
                vwc.as_percent()
            );
            actuate(relay, self.config.irrigation_hold, &self.cancel)
        } else {
            log::info!(
                "No irrigation needed for sensor {} (VWC {:.1}%)",
                address,
                vwc.as_percent()
            );
            relay.set_low()
        };
        result.map_err(|source| CycleError::Relay { address, source })
    }

    fn settle(&self) {
        // Hardware that is still acquiring (e.g. a satellite fix) gets the
        // full inter-point delay before the retry on the next cycle.
        sleep_with_cancel(self.config.delay_between_points, &self.cancel);
    }

    /// Acquire `total_data_points` cycles, feeding each completed data point
    /// to `sink`.
    ///
    /// Cycle starts are spaced `delay_between_points` apart, measured from
    /// the start of the previous cycle; when processing overruns the
    /// interval the sleep clamps to zero. All relays are released before
    /// returning, on every path.
    pub fn run<F>(&mut self, sink: F) -> Result<(), CycleError>
    where
        F: FnMut(DataPoint),
    {
        let result = self.run_inner(sink);
        self.relays.release_all();
        result
    }

    fn run_inner<F>(&mut self, mut sink: F) -> Result<(), CycleError>
    where
        F: FnMut(DataPoint),
    {
        for _ in 0..self.config.total_data_points {
            if self.cancel.is_cancelled() {
                break;
            }
            let started = Instant::now();
            match self.run_once()? {
                CycleOutcome::Complete(data_point) => {
                    sink(data_point);
                    let remaining = self
                        .config
                        .delay_between_points
                        .checked_sub(started.elapsed())
                        .unwrap_or_default();
                    sleep_with_cancel(remaining, &self.cancel);
                }
                // The settling delay was already applied; the next cycle
                // starts immediately.
                CycleOutcome::Skipped { .. } => {}
                CycleOutcome::Cancelled => break,
            }
        }
        Ok(())
    }
}
