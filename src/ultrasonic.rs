//! # Ultrasonic Module
//!
//! Request/response ranging over a USB sampling interface. Unlike the
//! streaming devices, nothing runs in the background: every
//! [`UltrasonicSensor::measure`] call triggers one hardware sampling cycle
//! and decodes its reply.
//!
//! The reply holds three little-endian `u16` echo times, in timer counts,
//! for the X, Y and Z transducers. A count is converted to the one-way
//! distance with `counts / 2 × (1 / clock_hz) × speed_of_sound × 1000`.

use log::{debug, trace, warn};

use crate::error::{Result, SensorError};

/// Timer clock of the sampling microcontroller, in Hz.
pub const DEFAULT_CLOCK_HZ: f64 = 8_000_000.0;

/// Speed of sound used for the conversion, in m/s.
pub const DEFAULT_SPEED_OF_SOUND: f64 = 340.0;

/// Bytes in a complete sampling reply.
pub const REPLY_LEN: usize = 6;

/// Vendor interface driving the transducers.
#[cfg_attr(test, mockall::automock)]
pub trait SamplingInterface {
    /// Switches the activity indicator.
    fn set_indicator(&mut self, on: bool) -> Result<()>;

    /// Runs one sampling cycle and returns the raw reply. An empty reply
    /// means the device produced no data this cycle.
    fn start_sampling(&mut self) -> Result<Vec<u8>>;

    /// Releases the interface.
    fn close(&mut self) -> Result<()>;
}

/// Distances from each transducer to the surface, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Distances {
    pub x_mm: f64,
    pub y_mm: f64,
    pub z_mm: f64,
}

/// Converts an echo time in timer counts into a one-way distance in mm.
///
/// ```
/// use serial_sensors::ultrasonic::counts_to_mm;
///
/// // 8 MHz clock, 340 m/s: 47059 counts is about 1 m out and back.
/// let mm = counts_to_mm(47_059, 8_000_000.0, 340.0);
/// assert!((mm - 1000.0).abs() < 0.1);
/// ```
#[must_use]
pub fn counts_to_mm(counts: u16, clock_hz: f64, speed_of_sound: f64) -> f64 {
    f64::from(counts) / 2.0 * (1.0 / clock_hz) * speed_of_sound * 1000.0
}

/// Three-axis ultrasonic ranging device.
pub struct UltrasonicSensor<I: SamplingInterface> {
    interface: I,
    clock_hz: f64,
    speed_of_sound: f64,
}

impl<I: SamplingInterface> UltrasonicSensor<I> {
    /// Uses the default clock and speed of sound.
    pub fn new(interface: I) -> Self {
        Self::with_constants(interface, DEFAULT_CLOCK_HZ, DEFAULT_SPEED_OF_SOUND)
    }

    /// Uses a different timer clock or speed of sound.
    pub fn with_constants(interface: I, clock_hz: f64, speed_of_sound: f64) -> Self {
        Self {
            interface,
            clock_hz,
            speed_of_sound,
        }
    }

    /// Samples the three transducers once.
    ///
    /// The indicator is on for the duration of the sampling cycle and is
    /// switched off again even if sampling fails. A sampling failure takes
    /// precedence over a failure to switch the indicator off. An empty reply
    /// yields zero distances.
    pub fn measure(&mut self) -> Result<Distances> {
        self.interface.set_indicator(true)?;
        let sampled = self.interface.start_sampling();
        let switched_off = self.interface.set_indicator(false);
        let data = match (sampled, switched_off) {
            (Ok(data), Ok(())) => data,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), Ok(())) => return Err(e),
            (Err(e), Err(indicator)) => {
                warn!("could not switch ultrasonic indicator off: {indicator}");
                return Err(e);
            }
        };
        trace!("ultrasonic reply: {}", hex::encode(&data));

        if data.is_empty() {
            debug!("ultrasonic device returned no data");
            return Ok(Distances::default());
        }
        if data.len() < REPLY_LEN {
            return Err(SensorError::ShortReply {
                expected: REPLY_LEN,
                found: data.len(),
            });
        }

        let count = |offset: usize| u16::from_le_bytes([data[offset], data[offset + 1]]);
        Ok(Distances {
            x_mm: counts_to_mm(count(0), self.clock_hz, self.speed_of_sound),
            y_mm: counts_to_mm(count(2), self.clock_hz, self.speed_of_sound),
            z_mm: counts_to_mm(count(4), self.clock_hz, self.speed_of_sound),
        })
    }

    /// Releases the interface. Failures are logged and otherwise ignored.
    pub fn close(mut self) {
        if let Err(e) = self.interface.close() {
            debug!("ignoring error while closing ultrasonic interface: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;
    use mockall::predicate::eq;

    fn expect_indicator_cycle(mock: &mut MockSamplingInterface, seq: &mut Sequence) {
        mock.expect_set_indicator()
            .with(eq(true))
            .times(1)
            .in_sequence(seq)
            .returning(|_| Ok(()));
    }

    fn expect_indicator_off(mock: &mut MockSamplingInterface, seq: &mut Sequence) {
        mock.expect_set_indicator()
            .with(eq(false))
            .times(1)
            .in_sequence(seq)
            .returning(|_| Ok(()));
    }

    #[test]
    fn test_measure_decodes_little_endian_counts() {
        let mut mock = MockSamplingInterface::new();
        let mut seq = Sequence::new();
        expect_indicator_cycle(&mut mock, &mut seq);
        mock.expect_start_sampling()
            .times(1)
            .in_sequence(&mut seq)
            // 1000, 2000, 0 counts
            .returning(|| Ok(vec![0xE8, 0x03, 0xD0, 0x07, 0x00, 0x00]));
        expect_indicator_off(&mut mock, &mut seq);

        let mut sensor = UltrasonicSensor::new(mock);
        let d = sensor.measure().unwrap();
        assert!((d.x_mm - 21.25).abs() < 1e-9);
        assert!((d.y_mm - 42.5).abs() < 1e-9);
        assert_eq!(d.z_mm, 0.0);
    }

    #[test]
    fn test_empty_reply_gives_zero() {
        let mut mock = MockSamplingInterface::new();
        let mut seq = Sequence::new();
        expect_indicator_cycle(&mut mock, &mut seq);
        mock.expect_start_sampling()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Vec::new()));
        expect_indicator_off(&mut mock, &mut seq);

        let mut sensor = UltrasonicSensor::new(mock);
        assert_eq!(sensor.measure().unwrap(), Distances::default());
    }

    #[test]
    fn test_short_reply_is_an_error() {
        let mut mock = MockSamplingInterface::new();
        mock.expect_set_indicator().times(2).returning(|_| Ok(()));
        mock.expect_start_sampling()
            .returning(|| Ok(vec![0x01, 0x02, 0x03]));

        let mut sensor = UltrasonicSensor::new(mock);
        assert!(matches!(
            sensor.measure(),
            Err(SensorError::ShortReply {
                expected: 6,
                found: 3
            })
        ));
    }

    #[test]
    fn test_indicator_switched_off_when_sampling_fails() {
        let mut mock = MockSamplingInterface::new();
        let mut seq = Sequence::new();
        expect_indicator_cycle(&mut mock, &mut seq);
        mock.expect_start_sampling()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(SensorError::runtime("usb stalled")));
        expect_indicator_off(&mut mock, &mut seq);

        let mut sensor = UltrasonicSensor::new(mock);
        assert!(sensor.measure().is_err());
    }

    #[test]
    fn test_sampling_error_wins_over_indicator_error() {
        let mut mock = MockSamplingInterface::new();
        let mut seq = Sequence::new();
        expect_indicator_cycle(&mut mock, &mut seq);
        mock.expect_start_sampling()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(SensorError::runtime("usb stalled")));
        mock.expect_set_indicator()
            .with(eq(false))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(SensorError::runtime("indicator stuck")));

        let mut sensor = UltrasonicSensor::new(mock);
        let err = sensor.measure().unwrap_err();
        assert!(err.to_string().contains("usb stalled"), "{err}");
    }

    #[test]
    fn test_indicator_error_after_good_sample_is_reported() {
        let mut mock = MockSamplingInterface::new();
        mock.expect_set_indicator()
            .with(eq(true))
            .returning(|_| Ok(()));
        mock.expect_start_sampling()
            .returning(|| Ok(vec![0x00; REPLY_LEN]));
        mock.expect_set_indicator()
            .with(eq(false))
            .returning(|_| Err(SensorError::runtime("indicator stuck")));

        let mut sensor = UltrasonicSensor::new(mock);
        let err = sensor.measure().unwrap_err();
        assert!(err.to_string().contains("indicator stuck"), "{err}");
    }

    #[test]
    fn test_custom_constants() {
        let mut mock = MockSamplingInterface::new();
        mock.expect_set_indicator().returning(|_| Ok(()));
        mock.expect_start_sampling()
            .returning(|| Ok(vec![0x02, 0x00, 0x02, 0x00, 0x02, 0x00]));

        // 2 counts at 1 Hz and 1 m/s is 1 s one way, 1000 mm.
        let mut sensor = UltrasonicSensor::with_constants(mock, 1.0, 1.0);
        let d = sensor.measure().unwrap();
        assert_eq!(d.x_mm, 1000.0);
        assert_eq!(d.z_mm, 1000.0);
    }

    #[test]
    fn test_close_ignores_errors() {
        let mut mock = MockSamplingInterface::new();
        mock.expect_close()
            .times(1)
            .returning(|| Err(SensorError::runtime("already gone")));
        UltrasonicSensor::new(mock).close();
    }
}
