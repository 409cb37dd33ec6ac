//! Fixed-tick orientation estimation loop.
//!
//! [`OrientationEstimator`] owns the filter and is driven one
//! [`SensorSample`] at a time. Each tick integrates the *previous* tick's
//! angular rate, corrects against the current gravity and magnetic field, and
//! offers the resulting [`OrientationRecord`] to a [`Transport`]. The filter
//! runs whether or not a peer is connected; only emission is gated.

use tracing::{debug, info, warn};

use crate::config::EkfConfig;
use crate::error::{FilterError, TransportError};
use crate::matrix::Matrix;
use crate::orientation_ekf::OrientationEKF;
use crate::record::OrientationRecord;

/// One tick of sensor data, captured as a consistent snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Body angular rate, rad/s
    pub angular_rate: [f64; 3],
    /// Gravity direction in the body frame, unit-scaled to 1 g
    pub gravity: [f64; 3],
    /// Magnetic field in the body frame, device units
    pub magnetic_field: [f64; 3],
    /// Seconds since the previous sample
    pub dt: f64,
}

impl SensorSample {
    pub fn new(
        angular_rate: [f64; 3],
        gravity: [f64; 3],
        magnetic_field: [f64; 3],
        dt: f64,
    ) -> Self {
        Self {
            angular_rate,
            gravity,
            magnetic_field,
            dt,
        }
    }
}

/// Outbound side of the loop: a peer link the records are sent over.
pub trait Transport {
    /// Whether a peer is currently connected.
    fn is_connected(&self) -> bool;

    /// Delivers one record to the connected peer.
    fn send(&mut self, record: &OrientationRecord) -> Result<(), TransportError>;
}

/// Transport with no peer; records are never emitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn is_connected(&self) -> bool {
        false
    }

    fn send(&mut self, _record: &OrientationRecord) -> Result<(), TransportError> {
        Err(TransportError::Disconnected)
    }
}

/// In-memory transport that JSON-encodes and keeps everything it is sent.
#[derive(Debug, Default, Clone)]
pub struct RecordingTransport {
    connected: bool,
    payloads: Vec<String>,
}

impl RecordingTransport {
    pub fn new(connected: bool) -> Self {
        Self {
            connected,
            payloads: Vec::new(),
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Encoded records in send order.
    pub fn payloads(&self) -> &[String] {
        &self.payloads
    }

    /// Decodes every payload back into a record.
    pub fn records(&self) -> Result<Vec<OrientationRecord>, TransportError> {
        self.payloads
            .iter()
            .map(|p| OrientationRecord::from_json(p))
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send(&mut self, record: &OrientationRecord) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        self.payloads.push(record.to_json()?);
        Ok(())
    }
}

/// Result of a single [`OrientationEstimator::tick`].
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// First sample: the angular rate was cached, nothing estimated.
    WarmingUp,
    Estimated {
        record: OrientationRecord,
        /// `false` when the measurement update was skipped and the prediction stands
        corrected: bool,
        /// `true` when the record reached the transport
        emitted: bool,
    },
}

/// Drives an [`OrientationEKF`] from a stream of sensor samples.
pub struct OrientationEstimator<T: Transport> {
    engine: OrientationEKF,
    transport: T,
    previous_rate: Option<[f64; 3]>,
    tick_interval: f64,
    ticks: u64,
    emitted: u64,
}

impl<T: Transport> OrientationEstimator<T> {
    /// Validates `config` and builds a fresh filter around it.
    pub fn new(config: &EkfConfig, transport: T) -> Result<Self, FilterError> {
        config.validate()?;
        info!(
            process_noise = config.process_noise,
            measurement_noise = config.measurement_noise,
            tick_interval_secs = config.tick_interval_secs,
            "orientation estimator created"
        );
        Ok(Self {
            engine: OrientationEKF::with_config(config),
            transport,
            previous_rate: None,
            tick_interval: config.tick_interval_secs,
            ticks: 0,
            emitted: 0,
        })
    }

    /// Wraps an already-built filter, with the default nominal interval.
    pub fn from_engine(engine: OrientationEKF, transport: T) -> Self {
        Self {
            engine,
            transport,
            previous_rate: None,
            tick_interval: EkfConfig::default().tick_interval_secs,
            ticks: 0,
            emitted: 0,
        }
    }

    /// Runs one filter cycle.
    ///
    /// The first call only caches the angular rate. Later calls predict with the
    /// cached rate, update with the sample's gravity and magnetic field, and
    /// cache the new rate. A non-finite rate is not cached; the last good one is
    /// reused next tick. A recoverable update failure, such as a non-finite
    /// gravity or magnetic reading, is logged and the prediction is kept as the
    /// estimate. Other filter errors are fatal for the session and returned.
    pub fn tick(&mut self, sample: SensorSample) -> Result<TickOutcome, FilterError> {
        self.ticks += 1;
        let cached = self.previous_rate;
        if sample.angular_rate.iter().all(|v| v.is_finite()) {
            self.previous_rate = Some(sample.angular_rate);
        } else {
            warn!(
                tick = self.ticks,
                "non-finite angular rate dropped, keeping last good rate"
            );
        }
        let Some(previous) = cached else {
            debug!("first sample cached, estimation starts next tick");
            return Ok(TickOutcome::WarmingUp);
        };

        let dt = if sample.dt.is_finite() && sample.dt > 0.0 {
            sample.dt
        } else {
            warn!(dt = sample.dt, "unusable sample interval, using nominal");
            self.tick_interval
        };

        self.engine.predict(&Matrix::column(&previous), dt)?;
        let corrected = match self.engine.update(
            &Matrix::column(&sample.gravity),
            &Matrix::column(&sample.magnetic_field),
        ) {
            Ok(()) => true,
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, tick = self.ticks, "measurement update skipped");
                false
            }
            Err(e) => return Err(e),
        };

        let record = OrientationRecord::from_quaternion(self.engine.quaternion());
        debug!(
            yaw = record.yaw,
            pitch = record.pitch,
            roll = record.roll,
            corrected,
            "orientation estimated"
        );
        let emitted = self.emit(&record);

        Ok(TickOutcome::Estimated {
            record,
            corrected,
            emitted,
        })
    }

    /// Ticks over every sample, e.g. from an `mpsc::Receiver` fed by an
    /// acquisition thread.
    ///
    /// # Returns
    /// The number of records emitted, or the first fatal filter error
    ///
    pub fn run<I>(&mut self, samples: I) -> Result<u64, FilterError>
    where
        I: IntoIterator<Item = SensorSample>,
    {
        let start = self.emitted;
        for sample in samples {
            self.tick(sample)?;
        }
        Ok(self.emitted - start)
    }

    fn emit(&mut self, record: &OrientationRecord) -> bool {
        if !self.transport.is_connected() {
            return false;
        }
        match self.transport.send(record) {
            Ok(()) => {
                self.emitted += 1;
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to send orientation record");
                false
            }
        }
    }

    pub fn engine(&self) -> &OrientationEKF {
        &self.engine
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Samples consumed so far, including the warm-up one.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Records delivered to the transport so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    const DOWN: [f64; 3] = [0.0, 0.0, -1.0];
    const NORTH: [f64; 3] = [1.0, 0.0, 0.0];

    fn still(dt: f64) -> SensorSample {
        SensorSample::new([0.0; 3], DOWN, NORTH, dt)
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn is_connected(&self) -> bool {
            true
        }

        fn send(&mut self, _record: &OrientationRecord) -> Result<(), TransportError> {
            Err(TransportError::Send("link dropped".into()))
        }
    }

    #[test]
    fn first_tick_only_warms_up() {
        let mut est =
            OrientationEstimator::new(&EkfConfig::default(), RecordingTransport::new(true)).unwrap();
        let first = est
            .tick(SensorSample::new([0.0, 0.0, 1.0], DOWN, NORTH, 0.1))
            .unwrap();
        assert_eq!(first, TickOutcome::WarmingUp);
        assert!(est.transport().payloads().is_empty());
        assert_eq!(est.engine().measurement_jacobian(), &Matrix::zeros(6, 4));

        let second = est.tick(still(0.1)).unwrap();
        assert!(matches!(
            second,
            TickOutcome::Estimated {
                corrected: true,
                emitted: true,
                ..
            }
        ));
        assert_eq!(est.ticks(), 2);
        assert_eq!(est.emitted(), 1);
    }

    #[test]
    fn uses_previous_tick_rate() {
        let mut est = OrientationEstimator::from_engine(OrientationEKF::new(), NullTransport);
        est.tick(SensorSample::new([0.0, 0.0, 1.0], DOWN, NORTH, 0.1))
            .unwrap();
        // The second tick integrates the cached rate, not its own zero rate.
        est.tick(still(0.1)).unwrap();
        let mut reference = OrientationEKF::new();
        reference
            .predict(&Matrix::column(&[0.0, 0.0, 1.0]), 0.1)
            .unwrap();
        assert_eq!(
            est.engine().priori_quaternion(),
            reference.priori_quaternion()
        );
    }

    #[test]
    fn filter_runs_while_disconnected() {
        let mut est =
            OrientationEstimator::new(&EkfConfig::default(), RecordingTransport::new(false)).unwrap();
        for _ in 0..5 {
            est.tick(SensorSample::new([0.0, 0.0, 0.3], DOWN, NORTH, 0.1))
                .unwrap();
        }
        assert!(est.transport().payloads().is_empty());
        assert_ne!(est.engine().kalman_gain(), &Matrix::zeros(4, 6));

        est.transport_mut().set_connected(true);
        let outcome = est.tick(still(0.1)).unwrap();
        assert!(matches!(outcome, TickOutcome::Estimated { emitted: true, .. }));
        assert_eq!(est.transport().records().unwrap().len(), 1);
    }

    #[test]
    fn singular_update_keeps_prediction() {
        let config = EkfConfig {
            measurement_noise: 0.0,
            gravity_reference: [0.0; 3],
            magnetic_reference: [0.0; 3],
            ..Default::default()
        };
        let mut est = OrientationEstimator::from_engine(
            OrientationEKF::with_config(&config),
            RecordingTransport::new(true),
        );
        est.tick(SensorSample::new([0.0, 0.0, 0.5], DOWN, NORTH, 0.1))
            .unwrap();
        let outcome = est.tick(still(0.1)).unwrap();
        let TickOutcome::Estimated {
            record,
            corrected,
            emitted,
        } = outcome
        else {
            panic!("expected an estimate");
        };
        assert!(!corrected);
        assert!(emitted);
        assert!(record.yaw > 2.0 && record.yaw < 3.5, "yaw = {}", record.yaw);
        assert_eq!(
            est.engine().quaternion(),
            est.engine().priori_quaternion()
        );
    }

    #[test]
    fn corrupt_gravity_sample_skips_update_only() {
        let mut est =
            OrientationEstimator::new(&EkfConfig::default(), RecordingTransport::new(true)).unwrap();
        est.tick(still(0.1)).unwrap();

        let outcome = est
            .tick(SensorSample::new([0.0; 3], [f64::NAN, 0.0, -1.0], NORTH, 0.1))
            .unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Estimated {
                corrected: false,
                emitted: true,
                ..
            }
        ));
        assert!(est.engine().quaternion().is_finite());

        let samples = (0..3).map(|_| still(0.1));
        assert_eq!(est.run(samples).unwrap(), 3);
        assert_eq!(est.transport().payloads().len(), 4);
    }

    #[test]
    fn corrupt_rate_sample_is_dropped() {
        let mut est = OrientationEstimator::from_engine(OrientationEKF::new(), NullTransport);
        est.tick(SensorSample::new([0.0, 0.0, 1.0], DOWN, NORTH, 0.1))
            .unwrap();
        let outcome = est
            .tick(SensorSample::new([f64::NAN, 0.0, 0.0], DOWN, NORTH, 0.1))
            .unwrap();
        assert!(matches!(outcome, TickOutcome::Estimated { corrected: true, .. }));

        // The third tick integrates the last good rate again.
        est.tick(still(0.1)).unwrap();
        assert!(est.engine().priori_quaternion()[(3, 0)] > 0.0);
        assert!(est.engine().quaternion().is_finite());
    }

    #[test]
    fn send_failure_does_not_stop_filter() {
        let mut est = OrientationEstimator::from_engine(OrientationEKF::new(), FailingTransport);
        let emitted = est.run((0..4).map(|_| still(0.1))).unwrap();
        assert_eq!(emitted, 0);
        assert_eq!(est.ticks(), 4);
    }

    #[test]
    fn bad_interval_falls_back_to_nominal() {
        let mut est = OrientationEstimator::from_engine(OrientationEKF::new(), NullTransport);
        est.tick(SensorSample::new([0.0, 0.0, 1.0], DOWN, NORTH, 0.1))
            .unwrap();
        est.tick(SensorSample::new([0.0; 3], DOWN, NORTH, f64::NAN))
            .unwrap();
        assert!(est.engine().quaternion().norm().is_finite());
        assert!(est.engine().priori_quaternion()[(3, 0)] > 0.0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EkfConfig {
            process_noise: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            OrientationEstimator::new(&config, NullTransport),
            Err(FilterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn drains_samples_from_acquisition_thread() {
        let (tx, rx) = mpsc::sync_channel::<SensorSample>(4);
        let producer = thread::spawn(move || {
            for _ in 0..10 {
                tx.send(still(0.1)).unwrap();
            }
        });

        let mut est =
            OrientationEstimator::new(&EkfConfig::default(), RecordingTransport::new(true)).unwrap();
        let emitted = est.run(rx).unwrap();
        producer.join().unwrap();

        assert_eq!(emitted, 9);
        assert_eq!(est.transport().payloads().len(), 9);
    }
}
