use log::{error, info};
use tokio::time::Duration;
use tokio_serial::SerialPortBuilderExt;
pub use tokio_serial::{DataBits, FlowControl, Parity, SerialStream, StopBits};

use super::channel::LineReader;
use crate::error::{Result, SensorError};

/// serial line channel backed by a tokio-serial stream
pub type SerialLineChannel = LineReader<SerialStream>;

/// serial port settings
#[derive(Clone, Debug, PartialEq)]
pub struct PortSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    pub timeout: Duration,
}

/// serial port settings implementation
impl PortSettings {
    /// 8N1 settings without flow control, the way the sensor boards are wired
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        PortSettings {
            port_name: port_name.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            timeout: Duration::from_millis(500),
        }
    }

    /// set parity
    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// set flow control
    pub fn with_flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }

    /// get serial port data bits name
    pub fn data_bits_name(&self) -> String {
        format!("{}", self.data_bits)
    }

    /// get serial port stop bits name
    pub fn stop_bits_name(&self) -> String {
        format!("{}", self.stop_bits)
    }

    /// get serial port parity name
    pub fn parity_name(&self) -> String {
        format!("{}", self.parity)
    }
}

/// open serial port
///
/// Must be called from inside a tokio runtime.
pub fn open_port(settings: &PortSettings) -> Result<SerialStream> {
    match tokio_serial::new(settings.port_name.as_str(), settings.baud_rate)
        .data_bits(settings.data_bits)
        .parity(settings.parity)
        .stop_bits(settings.stop_bits)
        .flow_control(settings.flow_control)
        .timeout(settings.timeout)
        .open_native_async()
    {
        #[allow(unused_mut)]
        Ok(mut stream) => {
            #[cfg(unix)]
            {
                if let Err(e) = stream.set_exclusive(false) {
                    log::warn!("could not clear exclusive mode on {}: {}", settings.port_name, e);
                }
            }
            info!(
                "opened serial port {} at {} baud ({}-{}-{})",
                settings.port_name,
                settings.baud_rate,
                settings.data_bits_name(),
                settings.parity_name(),
                settings.stop_bits_name()
            );
            Ok(stream)
        }
        Err(e) => {
            error!("failed to open serial port {}: {}", settings.port_name, e);
            Err(SensorError::port_open(&settings.port_name, e.to_string()))
        }
    }
}

/// serial line channel constructor
impl LineReader<SerialStream> {
    /// open a serial device as a line channel
    pub fn open(settings: &PortSettings) -> Result<Self> {
        let stream = open_port(settings)?;
        Ok(LineReader::new(settings.port_name.clone(), stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_8n1() {
        let settings = PortSettings::new("/dev/ttyUSB0", 115200);
        assert_eq!(settings.baud_rate, 115200);
        assert_eq!(settings.data_bits, DataBits::Eight);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.stop_bits, StopBits::One);
        assert_eq!(settings.flow_control, FlowControl::None);
    }

    #[test]
    fn test_builder_setters() {
        let settings = PortSettings::new("COM3", 9600)
            .with_parity(Parity::Even)
            .with_flow_control(FlowControl::Hardware);
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.flow_control, FlowControl::Hardware);
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let settings = PortSettings::new("/dev/does-not-exist-serial-sensors", 9600);
        match SerialLineChannel::open(&settings) {
            Err(SensorError::PortOpen { port_name, .. }) => {
                assert_eq!(port_name, "/dev/does-not-exist-serial-sensors");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opening a missing port must fail"),
        }
    }
}
