//! Serial transport implementation

use super::Transport;
use crate::error::{Error, Result};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Default baud rate of the RPLIDAR C1
pub const DEFAULT_BAUD: u32 = 460_800;

/// Serial transport for the LIDAR UART
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Baud rate (460800 for the C1)
    /// * `timeout` - Read timeout; an expired read is reported as zero bytes
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let mut port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()?;

        // DTR is the motor enable on the C1 USB adapter (active low)
        if let Err(e) = port.write_data_terminal_ready(false) {
            log::warn!("Could not drive DTR low on {}: {}", path, e);
        }
        if let Err(e) = port.write_request_to_send(false) {
            log::warn!("Could not drive RTS low on {}: {}", path, e);
        }

        log::info!("Opened serial port: {} at {} baud", path, baud_rate);
        Ok(SerialTransport { port })
    }
}

fn map_io(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof => {
            Error::Disconnected
        }
        _ => Error::Io(e),
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(map_io(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.port.write(data).map_err(map_io)
    }

    fn flush(&mut self) -> Result<()> {
        self.port.flush().map_err(map_io)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
