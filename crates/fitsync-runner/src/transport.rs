//! Opening the base station transport.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};
use tracing::{debug, info};

use crate::config::TransportConfig;
use crate::error::{Result, RunnerError};

/// USB vendor id of the CP210x bridge in the base station.
pub const BASE_STATION_VID: u16 = 0x10c4;
/// USB product id of the base station.
pub const BASE_STATION_PID: u16 = 0x84c4;

/// A serial port or TCP bridge to the base station.
pub enum AnyTransport {
    /// Local serial device.
    Serial(Box<dyn SerialPort>),
    /// Network serial bridge.
    Tcp(TcpStream),
}

impl std::fmt::Debug for AnyTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnyTransport::Serial(port) => f
                .debug_tuple("Serial")
                .field(&port.name().unwrap_or_default())
                .finish(),
            AnyTransport::Tcp(stream) => f.debug_tuple("Tcp").field(&stream.peer_addr().ok()).finish(),
        }
    }
}

impl Read for AnyTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            AnyTransport::Serial(port) => port.read(buf),
            AnyTransport::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for AnyTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            AnyTransport::Serial(port) => port.write(buf),
            AnyTransport::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            AnyTransport::Serial(port) => port.flush(),
            AnyTransport::Tcp(stream) => stream.flush(),
        }
    }
}

/// Find the device path of the first attached base station.
pub fn find_base_station() -> Result<String> {
    let ports = serialport::available_ports()?;
    ports
        .into_iter()
        .find(|port| {
            matches!(
                &port.port_type,
                SerialPortType::UsbPort(usb) if usb.vid == BASE_STATION_VID && usb.pid == BASE_STATION_PID
            )
        })
        .map(|port| port.port_name)
        .ok_or(RunnerError::NoBaseStation {
            vid: BASE_STATION_VID,
            pid: BASE_STATION_PID,
        })
}

/// Open the transport described by `config`.
pub fn open(config: &TransportConfig) -> Result<AnyTransport> {
    match config {
        TransportConfig::Serial {
            path,
            baud_rate,
            read_timeout_ms,
        } => {
            let path = match path {
                Some(path) => path.clone(),
                None => find_base_station()?,
            };
            info!("Opening base station at {} ({} baud)", path, baud_rate);
            let port = serialport::new(&path, *baud_rate)
                .timeout(Duration::from_millis(*read_timeout_ms))
                .open()?;
            Ok(AnyTransport::Serial(port))
        }
        TransportConfig::Tcp {
            address,
            read_timeout_ms,
        } => {
            info!("Connecting to serial bridge at {}", address);
            let stream = TcpStream::connect(address)?;
            stream.set_read_timeout(Some(Duration::from_millis(*read_timeout_ms)))?;
            stream.set_nodelay(true)?;
            debug!("Connected to {:?}", stream.peer_addr());
            Ok(AnyTransport::Tcp(stream))
        }
    }
}
